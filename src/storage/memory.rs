//! In-memory blob used by tests to observe what a run reads and writes.

use super::BlobStore;
use crate::error::StorageError;
use crate::models::BlobProperties;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blob: Mutex<Option<(Vec<u8>, BlobProperties)>>,
    properties_calls: Mutex<usize>,
    uploads: Mutex<usize>,
    fail_uploads: bool,
}

impl MemoryBlobStore {
    pub fn with_blob(body: Vec<u8>, properties: BlobProperties) -> Self {
        Self {
            blob: Mutex::new(Some((body, properties))),
            ..Self::default()
        }
    }

    /// A store whose uploads always fail, as a full disk or revoked SAS would.
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn body(&self) -> Option<Vec<u8>> {
        self.blob.lock().unwrap().as_ref().map(|(body, _)| body.clone())
    }

    pub fn stored_properties(&self) -> Option<BlobProperties> {
        self.blob.lock().unwrap().as_ref().map(|(_, props)| props.clone())
    }

    pub fn properties_calls(&self) -> usize {
        *self.properties_calls.lock().unwrap()
    }

    pub fn uploads(&self) -> usize {
        *self.uploads.lock().unwrap()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn properties(&self) -> Result<Option<BlobProperties>, StorageError> {
        *self.properties_calls.lock().unwrap() += 1;
        Ok(self.stored_properties())
    }

    async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        *self.uploads.lock().unwrap() += 1;
        if self.fail_uploads {
            return Err(StorageError::InvalidProperties(
                "upload rejected by test store".to_string(),
            ));
        }
        let properties = BlobProperties {
            content_type: Some(content_type.to_string()),
            metadata: metadata.clone(),
        };
        *self.blob.lock().unwrap() = Some((body, properties));
        Ok(())
    }
}
