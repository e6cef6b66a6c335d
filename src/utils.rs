//! Date helpers, log truncation, and file system checks.
//!
//! Dates in the changelog are written in the en-US form `MM/DD/YYYY` and carry
//! no time or zone; they are read as midnight UTC. The short form used for
//! feed titles and the freshness marker is the en-US short date `M/D/YYYY`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// en-US numeric date, the format used on changelog item lines.
const US_DATE_FORMAT: &str = "%m/%d/%Y";

/// en-US short date as rendered for the freshness marker (`1/15/2023`).
const SHORT_DATE_FORMAT: &str = "%-m/%-d/%Y";

/// Parse a date written in the en-US culture.
///
/// Accepts `MM/DD/YYYY` with one- or two-digit month and day, and falls back
/// to ISO `YYYY-MM-DD`. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns the `chrono` error of the en-US attempt when neither form parses,
/// including out-of-range values such as `13/45/2023`.
pub fn parse_us_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, US_DATE_FORMAT)
        .or_else(|us_err| NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| us_err))
}

/// Render a date as an en-US short date string.
///
/// # Examples
///
/// ```ignore
/// let d = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
/// assert_eq!(short_date(d), "1/5/2023");
/// ```
pub fn short_date(date: NaiveDate) -> String {
    date.format(SHORT_DATE_FORMAT).to_string()
}

/// The instant a date-only value stands for: midnight UTC on that day.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to roughly `max` bytes (never splitting a
/// character) with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure the parent directory of `path` exists.
///
/// # Errors
///
/// Returns the underlying I/O error if the directory cannot be created.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "Ensured output directory exists");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_us_date_two_digit() {
        let date = parse_us_date("01/15/2023").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_us_date_single_digit_and_whitespace() {
        let date = parse_us_date("  1/5/2023 ").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
    }

    #[test]
    fn test_parse_us_date_iso_fallback() {
        let date = parse_us_date("2023-01-15").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_us_date_rejects_out_of_range() {
        assert!(parse_us_date("13/45/2023").is_err());
        assert!(parse_us_date("02/30/2023").is_err());
        assert!(parse_us_date("not a date").is_err());
    }

    #[test]
    fn test_parse_us_date_is_month_first() {
        // 03/04 is the fourth of March, not the third of April
        let date = parse_us_date("03/04/2023").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 3, 4).unwrap());
    }

    #[test]
    fn test_short_date_drops_leading_zeros() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(short_date(date), "1/15/2023");
        let date = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
        assert_eq!(short_date(date), "11/5/2023");
    }

    #[test]
    fn test_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 10).unwrap();
        assert_eq!(midnight_utc(date).to_rfc3339(), "2023-01-10T00:00:00+00:00");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 5);
        assert!(result.starts_with("éé…"));
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("feeds/nested/marketplace.xml");
        ensure_parent_dir(&target).await.unwrap();
        assert!(dir.path().join("feeds/nested").is_dir());
    }
}
