//! Incremental-update detection.
//!
//! The changelog carries its own "last updated" date in a front-matter line
//! such as `ms.date: 01/15/2023`. The short form of that date is stored as
//! metadata on the published feed, so a run can stop as soon as it sees a
//! date that was already published.

use crate::error::{RunError, StorageError};
use crate::models::{BlobProperties, FreshnessMarker, LAST_UPDATED_METADATA_KEY};
use crate::storage::BlobStore;
use crate::utils::parse_us_date;
use tracing::{debug, info, instrument};

/// Label introducing the changelog's last-modified date.
pub const MARKER_LABEL: &str = "ms.date:";

/// Parse the freshness marker out of a line, if the line carries one.
///
/// Only the first whitespace-separated token after the label is read, so a
/// trailing time or comment does not break the date.
///
/// # Errors
///
/// [`RunError::Parse`] when the label is present but its value is not a date.
pub fn parse_marker_line(line: &str, line_number: usize) -> Result<Option<FreshnessMarker>, RunError> {
    let Some(idx) = line.find(MARKER_LABEL) else {
        return Ok(None);
    };
    let value = line[idx + MARKER_LABEL.len()..]
        .split_whitespace()
        .next()
        .unwrap_or_default();

    let date = parse_us_date(value).map_err(|source| RunError::Parse {
        line: line_number,
        value: value.to_string(),
        source,
    })?;
    Ok(Some(FreshnessMarker::new(date)))
}

/// Whether a previously published feed already reflects `marker`.
///
/// A missing blob, or one without the metadata key, is never up to date.
pub fn is_up_to_date(existing: Option<&BlobProperties>, marker: &FreshnessMarker) -> bool {
    existing
        .and_then(|props| props.metadata_value(LAST_UPDATED_METADATA_KEY))
        .is_some_and(|stored| stored == marker.short_date())
}

/// Compares markers against the published feed, reading its properties once.
#[derive(Debug)]
pub struct FreshnessChecker<'a, S> {
    store: &'a S,
    existing: Option<Option<BlobProperties>>,
}

impl<'a, S: BlobStore> FreshnessChecker<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            existing: None,
        }
    }

    /// Returns `true` when the published feed already carries `marker`.
    #[instrument(level = "info", skip_all, fields(marker = %marker.short_date()))]
    pub async fn is_current(&mut self, marker: &FreshnessMarker) -> Result<bool, StorageError> {
        let existing = self.existing_properties().await?;
        let current = is_up_to_date(existing, marker);
        debug!(
            stored = ?existing.and_then(|p| p.metadata_value(LAST_UPDATED_METADATA_KEY)),
            current, "Compared freshness marker"
        );
        Ok(current)
    }

    /// Properties of the published feed, fetched on first use.
    pub async fn existing_properties(&mut self) -> Result<Option<&BlobProperties>, StorageError> {
        if self.existing.is_none() {
            let props = self.store.properties().await?;
            info!(exists = props.is_some(), "Read published feed properties");
            self.existing = Some(props);
        }
        Ok(self.existing.as_ref().and_then(Option::as_ref))
    }

    /// Hand back whatever properties were read, for the publisher to merge into.
    pub fn into_existing(self) -> Option<BlobProperties> {
        self.existing.flatten()
    }
}
