//! Error types for configuration, storage and pipeline runs.
//!
//! Every failure is fatal to the run it happens in. Nothing here is retried;
//! the next trigger tick is the only recovery mechanism.

use std::path::PathBuf;

/// Failure that ends a pipeline run without publishing.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The changelog could not be retrieved, or the stream broke mid-read.
    #[error("failed to fetch marketplace changelog from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A date in a metadata or item line could not be parsed.
    #[error("malformed date {value:?} on line {line}: {source}")]
    Parse {
        line: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Reading properties from, or writing the feed to, blob storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The feed document could not be rendered as XML.
    #[error("failed to serialize RSS feed: {0}")]
    Serialize(String),
}

/// Failure reported by a [`crate::storage::BlobStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("blob request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob service returned {status} for {operation}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("invalid blob properties: {0}")]
    InvalidProperties(String),

    #[error("failed to sign blob request: {0}")]
    Signing(String),
}

/// Settings could not be resolved into a runnable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
