//! Feed assembly from parsed update records.
//!
//! Records released on the same day collapse into one feed entry. Entries are
//! ordered newest first; inside an entry, lines keep the order in which they
//! appear in the changelog.

use crate::models::{FeedDocument, FeedEntry, FeedLink, FreshnessMarker, UpdateRecord};
use crate::utils::{midnight_utc, short_date};
use itertools::Itertools;
use tracing::{debug, instrument};
use url::Url;

pub const FEED_TITLE: &str = "Azure Stack Hub Market Place Updates";
pub const FEED_DESCRIPTION: &str = "Provide latest updates about Azure Stack Hub marketplace";
pub const LINK_TITLE: &str = "Azure Stack Hub Market Place Changelog";
pub const LINK_MEDIA_TYPE: &str = "text/html";
pub const LINK_LENGTH: u64 = 1000;
const ENTRY_TITLE_PREFIX: &str = "Market Place Item Update on ";

/// Build the feed document, or `None` when there is nothing to publish.
///
/// # Arguments
///
/// * `records` - every record of the run, in changelog order
/// * `marker` - the changelog's last-updated date, used as the feed's own
/// * `source_url` - the changelog page the feed links back to
#[instrument(level = "info", skip_all, fields(records = records.len(), marker = %marker.short_date()))]
pub fn build_feed(
    records: &[UpdateRecord],
    marker: &FreshnessMarker,
    source_url: &Url,
) -> Option<FeedDocument> {
    if records.is_empty() {
        return None;
    }

    let entries: Vec<FeedEntry> = records
        .iter()
        .into_group_map_by(|r| r.release_date)
        .into_iter()
        .sorted_by(|(a, _), (b, _)| b.cmp(a))
        .map(|(release_date, group)| FeedEntry {
            title: format!("{ENTRY_TITLE_PREFIX}{}", short_date(release_date)),
            published: midnight_utc(release_date),
            body: group.iter().map(|r| r.render()).join("\n"),
        })
        .collect();

    debug!(entries = entries.len(), "Grouped records by release date");

    Some(FeedDocument {
        title: FEED_TITLE.to_string(),
        description: FEED_DESCRIPTION.to_string(),
        link: FeedLink {
            href: source_url.clone(),
            relationship: "alternate".to_string(),
            title: LINK_TITLE.to_string(),
            media_type: LINK_MEDIA_TYPE.to_string(),
            length: LINK_LENGTH,
        },
        last_updated: marker.to_utc(),
        entries,
    })
}
