//! # Marketplace Feed
//!
//! Republishes the Azure Stack Hub marketplace changelog as an RSS 2.0 feed
//! stored in a single blob.
//!
//! ## Features
//!
//! - Streams the changelog over HTTP and stops early when the published feed
//!   already carries the changelog's `ms.date:` value
//! - Groups marketplace items by release date, one feed entry per day
//! - Publishes to a local directory or to Azure Blob Storage (SAS or account key)
//! - Runs once, or keeps running on a fixed cadence or a cron schedule
//!
//! ## Usage
//!
//! ```sh
//! marketplace_feed --updates-url https://example.com/changes.md \
//!     --rss-path feeds/marketplace.xml --storage-connection /var/www
//! ```
//!
//! ## Architecture
//!
//! Each run follows the same pipeline:
//! 1. **Fetching**: Read the changelog line by line
//! 2. **Freshness**: Compare its last-updated date with the blob metadata
//! 3. **Parsing**: Collect dated items under their section headers
//! 4. **Output**: Build the feed, render RSS, upload body and metadata together

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod error;
mod freshness;
mod models;
mod outputs;
mod parser;
mod pipeline;
mod publish;
mod schedule;
mod scrapers;
mod storage;
mod utils;

use cli::Cli;
use config::Settings;
use error::RunError;
use pipeline::{run_once, RunContext, RunOutcome};
use storage::Storage;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("marketplace_feed starting up");

    let args = Cli::parse();
    debug!(?args.settings, "Parsed CLI arguments");

    let settings = Settings::resolve(&args)?;
    let store = Storage::connect(&settings.storage_connection, &settings.rss_path)?;
    info!(destination = %store.location(), "Storage ready");

    match &settings.schedule {
        Some(trigger) => {
            info!(%trigger, "Running on schedule; Ctrl-C to stop");
            let source_url = &settings.source_url;
            let store = &store;
            schedule::run_on(
                trigger,
                move || async move {
                    let ctx = RunContext::new(source_url.clone());
                    report(&run_once(&ctx, store).await);
                },
                async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to listen for shutdown signal");
                        std::future::pending::<()>().await;
                    }
                },
            )
            .await;
        }
        None => {
            let ctx = RunContext::new(settings.source_url.clone());
            let result = run_once(&ctx, &store).await;
            report(&result);
            result?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

fn report(result: &Result<RunOutcome, RunError>) {
    match result {
        Ok(RunOutcome::Unchanged { marker }) => {
            info!(marker = %marker.short_date(), "Run finished; feed unchanged");
        }
        Ok(RunOutcome::Empty) => info!("Run finished; no items to publish"),
        Ok(RunOutcome::Published {
            marker,
            records,
            entries,
            bytes,
        }) => {
            info!(
                marker = %marker.short_date(),
                records,
                entries,
                bytes,
                "Run finished; feed published"
            );
        }
        Err(e) => error!(error = %e, "Run failed"),
    }
}
