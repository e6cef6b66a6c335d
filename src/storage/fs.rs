//! Local directory backend.
//!
//! The feed is written to `{root}/{rss_path}`. Its content type and metadata
//! live next to it in `{root}/{rss_path}.properties.json`.
//!
//! Both files are staged as `*.tmp` and renamed into place, body first. If the
//! sidecar rename fails the old marker stays behind, so the next run simply
//! regenerates the feed.

use super::BlobStore;
use crate::error::StorageError;
use crate::models::BlobProperties;
use crate::utils::ensure_parent_dir;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

const PROPERTIES_SUFFIX: &str = ".properties.json";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    blob_path: PathBuf,
    properties_path: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, rss_path: &str) -> Self {
        let blob_path = root.into().join(rss_path.trim_start_matches('/'));
        let mut properties_path = blob_path.clone().into_os_string();
        properties_path.push(PROPERTIES_SUFFIX);
        Self {
            blob_path,
            properties_path: PathBuf::from(properties_path),
        }
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    #[cfg(test)]
    pub fn properties_path(&self) -> &Path {
        &self.properties_path
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".tmp");
    PathBuf::from(staged)
}

impl BlobStore for FsBlobStore {
    #[instrument(level = "debug", skip_all, fields(path = %self.blob_path.display()))]
    async fn properties(&self) -> Result<Option<BlobProperties>, StorageError> {
        match fs::try_exists(&self.blob_path).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => return Err(io_err(&self.blob_path)(e)),
        }

        match fs::read(&self.properties_path).await {
            Ok(raw) => {
                let props = serde_json::from_slice(&raw).map_err(|e| {
                    StorageError::InvalidProperties(format!(
                        "{}: {e}",
                        self.properties_path.display()
                    ))
                })?;
                Ok(Some(props))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Feed exists without a properties sidecar");
                Ok(Some(BlobProperties::default()))
            }
            Err(e) => Err(io_err(&self.properties_path)(e)),
        }
    }

    #[instrument(level = "info", skip_all, fields(path = %self.blob_path.display(), bytes = body.len()))]
    async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        ensure_parent_dir(&self.blob_path)
            .await
            .map_err(io_err(&self.blob_path))?;

        let props = BlobProperties {
            content_type: Some(content_type.to_string()),
            metadata: metadata.clone(),
        };
        let props_json = serde_json::to_vec_pretty(&props)
            .map_err(|e| StorageError::InvalidProperties(e.to_string()))?;

        let staged_blob = staging_path(&self.blob_path);
        let staged_props = staging_path(&self.properties_path);
        fs::write(&staged_blob, &body)
            .await
            .map_err(io_err(&staged_blob))?;
        fs::write(&staged_props, &props_json)
            .await
            .map_err(io_err(&staged_props))?;

        fs::rename(&staged_blob, &self.blob_path)
            .await
            .map_err(io_err(&self.blob_path))?;
        fs::rename(&staged_props, &self.properties_path)
            .await
            .map_err(io_err(&self.properties_path))?;

        info!("Wrote feed to local storage");
        Ok(())
    }
}
