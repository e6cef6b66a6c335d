//! Feed publishing.
//!
//! Serializes the feed and commits it to blob storage together with the
//! freshness marker. This is the only externally visible mutation of a run.
//!
//! Metadata already on the blob is carried over; only the
//! `GitHubPageUpdate` key is replaced.

use crate::error::RunError;
use crate::models::{
    BlobProperties, FeedDocument, FreshnessMarker, LAST_UPDATED_METADATA_KEY, RSS_CONTENT_TYPE,
};
use crate::outputs::rss::render_rss;
use crate::storage::BlobStore;
use tracing::{error, info, instrument};

/// Render `feed` and write it with `marker` as the new freshness metadata.
///
/// # Arguments
///
/// * `store` - the blob the feed is published to
/// * `feed` - the document to serialize
/// * `marker` - freshness marker to record on the blob
/// * `existing` - properties read earlier in the run, if the blob existed
///
/// # Returns
///
/// The number of bytes written.
///
/// # Errors
///
/// [`RunError::Serialize`] if rendering fails (nothing is written), or
/// [`RunError::Storage`] if the upload fails.
#[instrument(level = "info", skip_all, fields(entries = feed.entries.len(), marker = %marker.short_date()))]
pub async fn publish_feed<S: BlobStore>(
    store: &S,
    feed: &FeedDocument,
    marker: &FreshnessMarker,
    existing: Option<BlobProperties>,
) -> Result<usize, RunError> {
    let body = render_rss(feed)?;
    let len = body.len();

    let mut props = existing.unwrap_or_default();
    props.set_metadata(LAST_UPDATED_METADATA_KEY, marker.short_date());

    if let Err(e) = store.upload(body, RSS_CONTENT_TYPE, &props.metadata).await {
        error!(error = %e, "Failed to publish RSS feed");
        return Err(e.into());
    }

    info!(bytes = len, "Published RSS feed");
    Ok(len)
}
