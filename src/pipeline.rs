//! One end-to-end run: fetch, check freshness, parse, build, publish.
//!
//! ```text
//! Start → FetchingSource → Unchanged (exit)
//!                        → ParsingLines → ParseError (exit)
//!                                       → BuildingFeed → Empty (exit)
//!                                                      → Publishing → Done
//! ```
//!
//! Every failure ends the run with a [`RunError`] and nothing published.
//! The early exits that are not failures are reported as [`RunOutcome`]s.

use crate::error::RunError;
use crate::freshness::FreshnessChecker;
use crate::models::{FreshnessMarker, UpdateRecord};
use crate::outputs::feed::build_feed;
use crate::parser::{ChangelogParser, ParsedLine};
use crate::publish::publish_feed;
use crate::scrapers::changelog;
use crate::storage::BlobStore;
use chrono::Local;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Everything one invocation needs, created fresh for every run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub client: Client,
    pub source_url: Url,
}

impl RunContext {
    pub fn new(source_url: Url) -> Self {
        Self {
            client: Client::new(),
            source_url,
        }
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The published feed already reflects this changelog date.
    Unchanged { marker: FreshnessMarker },
    /// The changelog held no marketplace items.
    Empty,
    /// A new feed was written.
    Published {
        marker: FreshnessMarker,
        records: usize,
        entries: usize,
        bytes: usize,
    },
}

/// Execute one run against `store`.
///
/// # Errors
///
/// - [`RunError::Fetch`] when the changelog cannot be read
/// - [`RunError::Parse`] on the first malformed date
/// - [`RunError::Storage`] when blob properties cannot be read or the upload fails
/// - [`RunError::Serialize`] when the feed cannot be rendered
#[instrument(level = "info", skip_all, fields(url = %ctx.source_url))]
pub async fn run_once<S: BlobStore>(ctx: &RunContext, store: &S) -> Result<RunOutcome, RunError> {
    info!(started_at = %Local::now(), "Marketplace RSS generator launched");

    let mut lines = changelog::open(&ctx.client, &ctx.source_url).await?;
    let mut parser = ChangelogParser::new();
    let mut checker = FreshnessChecker::new(store);
    let mut marker: Option<FreshnessMarker> = None;
    let mut records: Vec<UpdateRecord> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        match parser.parse_line(&line)? {
            ParsedLine::Marker(found) => {
                info!(marker = %found.short_date(), "Changelog was last updated");
                if checker.is_current(&found).await? {
                    info!("RSS feed is already up to date; nothing to do");
                    return Ok(RunOutcome::Unchanged { marker: found });
                }
                marker = Some(found);
            }
            ParsedLine::Record(record) => records.push(record),
            ParsedLine::Section(section) => {
                debug!(line = parser.line_number(), %section, "Entered section");
            }
            ParsedLine::Ignored => {}
        }
    }

    info!(
        lines = parser.line_number(),
        bytes = lines.bytes_read(),
        records = records.len(),
        last_section = parser.section(),
        "Parsed changelog"
    );

    let marker = match marker {
        Some(marker) => marker,
        None => {
            let Some(newest) = records.iter().map(|r| r.release_date).max() else {
                info!("No marketplace items found; nothing to publish");
                return Ok(RunOutcome::Empty);
            };
            let fallback = FreshnessMarker::new(newest);
            warn!(
                marker = %fallback.short_date(),
                "Changelog has no last-updated date; using newest release date"
            );
            if checker.is_current(&fallback).await? {
                info!("RSS feed is already up to date; nothing to do");
                return Ok(RunOutcome::Unchanged { marker: fallback });
            }
            fallback
        }
    };

    let Some(feed) = build_feed(&records, &marker, &ctx.source_url) else {
        info!("No marketplace items found; nothing to publish");
        return Ok(RunOutcome::Empty);
    };

    checker.existing_properties().await?;
    let bytes = publish_feed(store, &feed, &marker, checker.into_existing()).await?;

    Ok(RunOutcome::Published {
        marker,
        records: records.len(),
        entries: feed.entries.len(),
        bytes,
    })
}
