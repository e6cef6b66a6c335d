//! Changelog line parser.
//!
//! The marketplace changelog is a Markdown page. The parser only looks at
//! three kinds of lines:
//!
//! ```text
//! ms.date: 01/15/2023                  <- freshness marker (front matter)
//! ## Compute marketplace items         <- section header
//! - 01/10/2023: Widget A               <- item
//! ```
//!
//! Everything else is ignored. The section label carries over from one item
//! to the next until another header replaces it.

use crate::error::RunError;
use crate::freshness::parse_marker_line;
use crate::models::{FreshnessMarker, UpdateRecord};
use crate::utils::{parse_us_date, truncate_for_log};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{trace, warn};

static SECTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"## (\w+) marketplace items")
        .case_insensitive(true)
        .build()
        .expect("section pattern is valid")
});

static ITEM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"- (?<date>\d{2}/\d{2}/\d{4}): (?<product>.+)")
        .case_insensitive(true)
        .build()
        .expect("item pattern is valid")
});

/// What a single changelog line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Marker(FreshnessMarker),
    Section(String),
    Record(UpdateRecord),
    Ignored,
}

/// Streaming parser state: the current section and the line count.
#[derive(Debug, Default)]
pub struct ChangelogParser {
    section: String,
    line_number: usize,
}

impl ChangelogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Section label applied to the next item.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Classify one line and update the section state.
    ///
    /// # Errors
    ///
    /// [`RunError::Parse`] when a marker or item line carries a date that
    /// does not exist, e.g. `13/45/2023`. The whole run is expected to stop.
    pub fn parse_line(&mut self, line: &str) -> Result<ParsedLine, RunError> {
        self.line_number += 1;

        if let Some(marker) = parse_marker_line(line, self.line_number)? {
            return Ok(ParsedLine::Marker(marker));
        }

        if let Some(caps) = SECTION_PATTERN.captures(line) {
            self.section = caps[1].to_string();
            trace!(line = self.line_number, section = %self.section, "Section header");
            return Ok(ParsedLine::Section(self.section.clone()));
        }

        if let Some(caps) = ITEM_PATTERN.captures(line) {
            let date = &caps["date"];
            let release_date = parse_us_date(date).map_err(|source| {
                warn!(
                    line = self.line_number,
                    text = %truncate_for_log(line, 120),
                    "Item line has an invalid date"
                );
                RunError::Parse {
                    line: self.line_number,
                    value: date.to_string(),
                    source,
                }
            })?;
            return Ok(ParsedLine::Record(UpdateRecord {
                release_date,
                name: caps["product"].to_string(),
                section: self.section.clone(),
            }));
        }

        Ok(ParsedLine::Ignored)
    }
}
