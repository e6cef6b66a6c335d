//! Recurring trigger for running the pipeline.
//!
//! A trigger is either a fixed cadence or a six-field cron expression in the
//! NCRONTAB layout (`second minute hour day month day-of-week`), evaluated in
//! UTC. Runs are awaited to completion before the next fire time is
//! considered, so two runs never overlap; fire times missed while a run was in
//! progress are skipped.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// When runs happen.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fixed cadence; the first run starts immediately.
    Every(Duration),
    /// Cron schedule; the first run waits for the next fire time.
    Cron(Box<Schedule>),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(every) => write!(f, "every {}s", every.as_secs()),
            Self::Cron(schedule) => write!(f, "cron {schedule}"),
        }
    }
}

/// Parse a `ScheduleTriggerTime` value.
///
/// Accepted forms:
/// - a six-field cron expression, e.g. `0 0 */6 * * *`; numeric days of the
///   week count from `0` = Sunday (`7` is also Sunday)
/// - `hh:mm:ss` or `d.hh:mm:ss` (a .NET `TimeSpan`)
/// - a bare number of seconds, e.g. `3600`
/// - a number with a unit suffix: `30s`, `15m`, `6h`, `1d`
///
/// # Errors
///
/// [`ConfigError::Invalid`] for anything else, and for a zero cadence.
pub fn parse_schedule(value: &str) -> Result<Trigger, ConfigError> {
    let value = value.trim();
    let invalid = |message: String| ConfigError::Invalid {
        key: "ScheduleTriggerTime",
        message,
    };

    let fields: Vec<&str> = value.split_whitespace().collect();
    match fields.len() {
        6 => return parse_cron(&fields).map(|s| Trigger::Cron(Box::new(s))).map_err(invalid),
        0 | 1 => {}
        n => {
            return Err(invalid(format!(
                "{value:?} has {n} fields; cron expressions need six \
                 (second minute hour day month day-of-week)"
            )));
        }
    }

    let secs = if value.contains(':') {
        parse_timespan(value)
    } else {
        parse_with_unit(value)
    }
    .ok_or_else(|| invalid(format!("{value:?} is not an interval or cron expression")))?;

    if secs == 0 {
        return Err(invalid("interval must be greater than zero".to_string()));
    }
    Ok(Trigger::Every(Duration::from_secs(secs)))
}

fn parse_cron(fields: &[&str]) -> Result<Schedule, String> {
    let day_of_week = normalize_day_of_week(fields[5])
        .ok_or_else(|| format!("bad day-of-week field {:?}", fields[5]))?;
    let expression = format!("{} {day_of_week}", fields[..5].join(" "));
    Schedule::from_str(&expression).map_err(|e| format!("bad cron expression {:?}: {e}", fields.join(" ")))
}

/// Rewrite numeric days of the week as names, so `0`/`7` mean Sunday and
/// `1-5` means Monday to Friday.
fn normalize_day_of_week(field: &str) -> Option<String> {
    let items = field.split(',').map(|item| {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        let base = match base.split_once('-') {
            Some((from, "7")) if from != "0" && from != "7" => {
                format!("{}-SAT,SUN", day_name(from)?)
            }
            Some((from, to)) => format!("{}-{}", day_name(from)?, day_name(to)?),
            None => day_name(base)?,
        };
        Some(match step {
            Some(step) => format!("{base}/{step}"),
            None => base,
        })
    });
    items.collect::<Option<Vec<_>>>().map(|items| items.join(","))
}

fn day_name(token: &str) -> Option<String> {
    match token.parse::<usize>() {
        Ok(n) if n <= 7 => Some(DAY_NAMES[n % 7].to_string()),
        Ok(_) => None,
        Err(_) => Some(token.to_string()),
    }
}

fn parse_timespan(value: &str) -> Option<u64> {
    let (days, clock) = match value.split_once('.') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, value),
    };
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    days.checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)
}

fn parse_with_unit(value: &str) -> Option<u64> {
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number.parse().ok()?;
    let factor = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };
    number.checked_mul(factor)
}

/// Time from `now` to the schedule's next fire, or `None` if it never fires again.
fn delay_until_next(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    (next - now).to_std().ok()
}

/// Call `run` whenever `trigger` fires, until `shutdown` resolves.
pub async fn run_on<F, Fut, S>(trigger: &Trigger, run: F, shutdown: S)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    match trigger {
        Trigger::Every(every) => run_every(*every, run, shutdown).await,
        Trigger::Cron(schedule) => run_cron(schedule, run, shutdown).await,
    }
}

/// Call `run` on every tick of `every`, starting immediately, until `shutdown`
/// resolves.
pub async fn run_every<F, Fut, S>(every: Duration, mut run: F, shutdown: S)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                tokio::select! {
                    _ = run() => {}
                    _ = &mut shutdown => {
                        info!("Shutdown requested during run");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}

/// Call `run` at each fire time of `schedule` until `shutdown` resolves.
pub async fn run_cron<F, Fut, S>(schedule: &Schedule, mut run: F, shutdown: S)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let Some(delay) = delay_until_next(schedule, Utc::now()) else {
            warn!(%schedule, "Cron schedule has no future fire times");
            break;
        };
        debug!(?delay, "Waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                tokio::select! {
                    _ = run() => {}
                    _ = &mut shutdown => {
                        info!("Shutdown requested during run");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}
