//! Data models for changelog records and the feed built from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`UpdateRecord`]: one dated marketplace item parsed from the changelog
//! - [`FreshnessMarker`]: the changelog's own "last updated" date
//! - [`FeedDocument`], [`FeedEntry`], [`FeedLink`]: the RSS feed before serialization
//! - [`BlobProperties`]: what blob storage knows about the published feed

use crate::utils::{midnight_utc, short_date};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Blob metadata key holding the short date of the last processed changelog.
pub const LAST_UPDATED_METADATA_KEY: &str = "GitHubPageUpdate";

/// Content type written on the published feed blob.
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// A single marketplace item release parsed from one changelog line.
///
/// Records are created in document order and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    /// Day the item was published to the marketplace.
    pub release_date: NaiveDate,
    /// Item description as written after the date.
    pub name: String,
    /// Marketplace category from the closest header above the item.
    pub section: String,
}

impl UpdateRecord {
    /// The line this record contributes to its feed entry body.
    pub fn render(&self) -> String {
        format!("{} - {}", self.section, self.name)
    }
}

/// The changelog's "last updated" date.
///
/// Its short-date form is stored as blob metadata and compared on every run
/// to decide whether the feed must be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FreshnessMarker {
    pub date: NaiveDate,
}

impl FreshnessMarker {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// en-US short date, e.g. `1/15/2023`.
    pub fn short_date(&self) -> String {
        short_date(self.date)
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        midnight_utc(self.date)
    }
}

/// Link from the feed back to the human-readable changelog.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedLink {
    pub href: Url,
    pub relationship: String,
    pub title: String,
    pub media_type: String,
    pub length: u64,
}

/// One RSS item: every update released on the same day.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub published: DateTime<Utc>,
    /// `"{section} - {name}"` lines joined by `\n`, in changelog order.
    pub body: String,
}

/// A complete feed, ready to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    pub link: FeedLink,
    pub last_updated: DateTime<Utc>,
    /// Ordered by publish date, most recent first.
    pub entries: Vec<FeedEntry>,
}

/// Properties of an existing blob: its content type and user metadata.
///
/// Metadata names are matched case-insensitively because HTTP-based stores
/// hand them back as lowercased header names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl BlobProperties {
    /// Look up a metadata value by name, ignoring ASCII case.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set a metadata value, replacing any entry whose name differs only in case.
    pub fn set_metadata(&mut self, key: &str, value: String) {
        self.metadata.retain(|k, _| !k.eq_ignore_ascii_case(key));
        self.metadata.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_record_render() {
        let record = UpdateRecord {
            release_date: NaiveDate::from_ymd_opt(2023, 1, 10).unwrap(),
            name: "Widget A".to_string(),
            section: "Compute".to_string(),
        };
        assert_eq!(record.render(), "Compute - Widget A");
    }

    #[test]
    fn test_update_record_render_without_section() {
        let record = UpdateRecord {
            release_date: NaiveDate::from_ymd_opt(2023, 1, 10).unwrap(),
            name: "Widget A".to_string(),
            section: String::new(),
        };
        assert_eq!(record.render(), " - Widget A");
    }

    #[test]
    fn test_freshness_marker_forms() {
        let marker = FreshnessMarker::new(NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(marker.short_date(), "1/15/2023");
        assert_eq!(marker.to_utc().to_rfc3339(), "2023-01-15T00:00:00+00:00");
    }

    #[test]
    fn test_metadata_lookup_ignores_case() {
        let mut props = BlobProperties::default();
        props
            .metadata
            .insert("githubpageupdate".to_string(), "1/15/2023".to_string());
        assert_eq!(props.metadata_value(LAST_UPDATED_METADATA_KEY), Some("1/15/2023"));
        assert_eq!(props.metadata_value("other"), None);
    }

    #[test]
    fn test_set_metadata_replaces_case_variants() {
        let mut props = BlobProperties::default();
        props
            .metadata
            .insert("githubpageupdate".to_string(), "1/1/2023".to_string());
        props.metadata.insert("owner".to_string(), "ops".to_string());

        props.set_metadata(LAST_UPDATED_METADATA_KEY, "1/15/2023".to_string());

        assert_eq!(props.metadata.len(), 2);
        assert_eq!(
            props.metadata.get(LAST_UPDATED_METADATA_KEY).map(String::as_str),
            Some("1/15/2023")
        );
        assert_eq!(props.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[test]
    fn test_blob_properties_deserialize_defaults() {
        let props: BlobProperties = serde_json::from_str("{}").unwrap();
        assert_eq!(props, BlobProperties::default());
    }
}
