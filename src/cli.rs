//! Command-line interface definitions for the marketplace feed generator.
//!
//! Every option can also come from the environment, under the same names the
//! hosted job used (`MarketPlaceUpdatesURL`, `RSSPath`, `ScheduleTriggerTime`,
//! `StorageConnection`), or from a YAML settings file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Run once and write the feed to a local directory
/// marketplace_feed --updates-url https://example.com/changes.md \
///     --rss-path feeds/marketplace.xml --storage-connection /var/www
///
/// # Keep running, regenerating every six hours
/// ScheduleTriggerTime='0 0 */6 * * *' marketplace_feed --settings settings.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of the marketplace changelog document
    #[arg(long, env = "MarketPlaceUpdatesURL")]
    pub updates_url: Option<String>,

    /// Blob path of the published feed (first segment is the container on Azure)
    #[arg(long, env = "RSSPath")]
    pub rss_path: Option<String>,

    /// Six-field cron expression or interval (`hh:mm:ss`, seconds, `6h`); runs once when absent
    #[arg(long, env = "ScheduleTriggerTime")]
    pub schedule: Option<String>,

    /// Local directory, Azure SAS URL, or Azure storage connection string
    #[arg(long, env = "StorageConnection", hide_env_values = true)]
    pub storage_connection: Option<String>,

    /// Optional YAML file providing the settings above
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
}
