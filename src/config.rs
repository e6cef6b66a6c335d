//! Settings resolution.
//!
//! Values come from three places, highest precedence first:
//!
//! 1. command-line flags
//! 2. environment variables (handled by clap's `env` attribute)
//! 3. the YAML file passed with `--settings`
//!
//! The YAML keys match the environment variable names:
//!
//! ```yaml
//! MarketPlaceUpdatesURL: https://example.com/azure-stack-marketplace-changes.md
//! RSSPath: feeds/marketplace.xml
//! ScheduleTriggerTime: "0 0 */6 * * *"
//! StorageConnection: /var/www
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::schedule::{Trigger, parse_schedule};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Fully resolved, validated settings for the process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_url: Url,
    pub rss_path: String,
    /// `None` means run once and exit.
    pub schedule: Option<Trigger>,
    pub storage_connection: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    #[serde(rename = "MarketPlaceUpdatesURL")]
    updates_url: Option<String>,
    #[serde(rename = "RSSPath")]
    rss_path: Option<String>,
    #[serde(rename = "ScheduleTriggerTime")]
    schedule: Option<String>,
    #[serde(rename = "StorageConnection")]
    storage_connection: Option<String>,
}

impl Settings {
    /// Merge the command line, environment and optional settings file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Read`] / [`ConfigError::Yaml`] when the settings file is unusable
    /// - [`ConfigError::Missing`] when a required value is absent everywhere
    /// - [`ConfigError::Invalid`] for a non-http(s) URL, an empty path, or a bad schedule
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.settings {
            Some(path) => load_file(path)?,
            None => FileSettings::default(),
        };

        let updates_url = pick(cli.updates_url.as_deref(), file.updates_url)
            .ok_or(ConfigError::Missing("MarketPlaceUpdatesURL"))?;
        let rss_path = pick(cli.rss_path.as_deref(), file.rss_path)
            .ok_or(ConfigError::Missing("RSSPath"))?;
        let storage_connection = pick(cli.storage_connection.as_deref(), file.storage_connection)
            .ok_or(ConfigError::Missing("StorageConnection"))?;
        let schedule = pick(cli.schedule.as_deref(), file.schedule)
            .map(|s| parse_schedule(&s))
            .transpose()?;

        let source_url = parse_source_url(&updates_url)?;
        if rss_path.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid {
                key: "RSSPath",
                message: "path must name a blob".to_string(),
            });
        }

        let settings = Self {
            source_url,
            rss_path,
            schedule,
            storage_connection,
        };
        info!(
            url = %settings.source_url,
            rss_path = %settings.rss_path,
            schedule = ?settings.schedule.as_ref().map(Trigger::to_string),
            "Resolved settings"
        );
        Ok(settings)
    }
}

fn load_file(path: &Path) -> Result<FileSettings, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Loaded settings file");
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// First non-blank value, command line/environment before file.
fn pick(primary: Option<&str>, fallback: Option<String>) -> Option<String> {
    primary
        .map(str::to_string)
        .into_iter()
        .chain(fallback)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn parse_source_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "MarketPlaceUpdatesURL",
        message,
    };
    let url = Url::parse(value).map_err(|e| invalid(format!("{value:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}
