//! Blob storage backends for the published feed.
//!
//! The feed lives in exactly one blob. A backend is bound to that blob when
//! it is created and exposes the two operations a run needs:
//!
//! - [`BlobStore::properties`]: content type and metadata of the current blob
//! - [`BlobStore::upload`]: replace body, content type and metadata in one commit
//!
//! # Backends
//!
//! | Backend | Module | Connection |
//! |---------|--------|------------|
//! | Local directory | [`fs`] | `file:///var/feeds` or a plain path |
//! | Azure Blob (SAS) | [`azure`] | SAS URL or `BlobEndpoint=…;SharedAccessSignature=…` |
//! | Azure Blob (account key) | [`azure`] + [`shared_key`] | `AccountName=…;AccountKey=…[;EndpointSuffix=…]` |
//!
//! [`Storage`] dispatches to whichever backend the `StorageConnection`
//! setting selects.

pub mod azure;
pub mod fs;
#[cfg(test)]
pub mod memory;
pub mod shared_key;

use crate::error::{ConfigError, StorageError};
use crate::models::BlobProperties;
use std::collections::BTreeMap;
use std::path::PathBuf;
use url::Url;

pub use azure::AzureBlobStore;
pub use fs::FsBlobStore;
pub use shared_key::SharedKeyCredential;

/// A single blob that the feed is read from and written to.
#[allow(async_fn_in_trait)]
pub trait BlobStore {
    /// Properties of the blob, or `None` if it does not exist yet.
    async fn properties(&self) -> Result<Option<BlobProperties>, StorageError>;

    /// Replace the blob's body, content type and full metadata map.
    ///
    /// Either everything is committed or an error is returned.
    async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError>;
}

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum Storage {
    Fs(FsBlobStore),
    Azure(AzureBlobStore),
}

impl Storage {
    /// Bind a backend to `rss_path` according to the storage connection setting.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for unusable connection strings, URLs with an
    /// unsupported scheme, or an Azure blob path without a container.
    pub fn connect(connection: &str, rss_path: &str) -> Result<Self, ConfigError> {
        let connection = connection.trim();
        if connection.is_empty() {
            return Err(ConfigError::Missing("StorageConnection"));
        }

        if is_connection_string(connection) {
            let store = match parse_connection_string(connection)? {
                (endpoint, Some(credential)) => {
                    AzureBlobStore::with_shared_key(endpoint, rss_path, credential)?
                }
                (endpoint, None) => AzureBlobStore::new(endpoint, rss_path)?,
            };
            return Ok(Self::Azure(store));
        }

        match Url::parse(connection) {
            Ok(url) if url.scheme() == "file" => {
                let root = url.to_file_path().map_err(|_| ConfigError::Invalid {
                    key: "StorageConnection",
                    message: format!("{url} is not a local directory"),
                })?;
                Ok(Self::Fs(FsBlobStore::new(root, rss_path)))
            }
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Ok(Self::Azure(AzureBlobStore::new(url, rss_path)?))
            }
            Ok(url) => Err(ConfigError::Invalid {
                key: "StorageConnection",
                message: format!("unsupported scheme {:?}", url.scheme()),
            }),
            Err(_) => Ok(Self::Fs(FsBlobStore::new(PathBuf::from(connection), rss_path))),
        }
    }

    /// Where the feed ends up, for logging.
    pub fn location(&self) -> String {
        match self {
            Self::Fs(store) => store.blob_path().display().to_string(),
            Self::Azure(store) => store.redacted_url(),
        }
    }
}

impl BlobStore for Storage {
    async fn properties(&self) -> Result<Option<BlobProperties>, StorageError> {
        match self {
            Self::Fs(store) => store.properties().await,
            Self::Azure(store) => store.properties().await,
        }
    }

    async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        match self {
            Self::Fs(store) => store.upload(body, content_type, metadata).await,
            Self::Azure(store) => store.upload(body, content_type, metadata).await,
        }
    }
}

/// `Key=value;…` pairs, as opposed to a URL or a path.
fn is_connection_string(connection: &str) -> bool {
    connection
        .split_once('=')
        .is_some_and(|(key, _)| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Well-known account of the local storage emulator.
const EMULATOR_ACCOUNT: &str = "devstoreaccount1";
const EMULATOR_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const EMULATOR_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Turn an Azure storage connection string into a blob endpoint and, for
/// account-key strings, the credential that signs requests.
///
/// A `SharedAccessSignature` wins over an `AccountKey` when both are given.
/// `UseDevelopmentStorage=true` selects the local emulator.
fn parse_connection_string(
    connection: &str,
) -> Result<(Url, Option<SharedKeyCredential>), ConfigError> {
    let pairs: BTreeMap<String, &str> = connection
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim()))
        .collect();
    let get = |key: &str| pairs.get(key).copied().filter(|v| !v.is_empty());

    let invalid = |message: String| ConfigError::Invalid {
        key: "StorageConnection",
        message,
    };
    let parse_endpoint =
        |endpoint: &str| Url::parse(endpoint).map_err(|e| invalid(format!("bad BlobEndpoint: {e}")));

    if get("usedevelopmentstorage").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        let credential = SharedKeyCredential::new(EMULATOR_ACCOUNT, EMULATOR_KEY)?;
        return Ok((parse_endpoint(EMULATOR_ENDPOINT)?, Some(credential)));
    }

    if let Some(sas) = get("sharedaccesssignature") {
        let endpoint = get("blobendpoint")
            .ok_or_else(|| invalid("connection string has no BlobEndpoint".to_string()))?;
        let mut url = parse_endpoint(endpoint)?;
        url.set_query(Some(sas.trim_start_matches('?')));
        return Ok((url, None));
    }

    let Some(key) = get("accountkey") else {
        return Err(invalid(
            "connection string has neither SharedAccessSignature nor AccountKey".to_string(),
        ));
    };
    let account = get("accountname").unwrap_or_default();
    let credential = SharedKeyCredential::new(account, key)?;

    let endpoint = match get("blobendpoint") {
        Some(endpoint) => parse_endpoint(endpoint)?,
        None => {
            let protocol = get("defaultendpointsprotocol").unwrap_or("https");
            let suffix = get("endpointsuffix").unwrap_or("core.windows.net");
            parse_endpoint(&format!("{protocol}://{}.blob.{suffix}/", credential.account()))?
        }
    };
    Ok((endpoint, Some(credential)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_plain_path() {
        let storage = Storage::connect("/var/feeds", "rss/marketplace.xml").unwrap();
        match storage {
            Storage::Fs(store) => {
                assert_eq!(store.blob_path(), PathBuf::from("/var/feeds/rss/marketplace.xml"))
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_connect_file_url() {
        let storage = Storage::connect("file:///var/feeds", "marketplace.xml").unwrap();
        assert!(matches!(storage, Storage::Fs(_)));
        assert_eq!(storage.location(), "/var/feeds/marketplace.xml");
    }

    #[test]
    fn test_connect_sas_url() {
        let storage = Storage::connect(
            "https://acct.blob.core.windows.net/?sv=2022-11-02&sig=abc",
            "feeds/marketplace.xml",
        )
        .unwrap();
        assert!(matches!(storage, Storage::Azure(_)));
        assert_eq!(
            storage.location(),
            "https://acct.blob.core.windows.net/feeds/marketplace.xml"
        );
    }

    #[test]
    fn test_connect_sas_connection_string() {
        let storage = Storage::connect(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=2022-11-02&sig=abc",
            "feeds/marketplace.xml",
        )
        .unwrap();
        match storage {
            Storage::Azure(store) => {
                let url = store.blob_url();
                assert_eq!(url.path(), "/feeds/marketplace.xml");
                assert_eq!(url.query(), Some("sv=2022-11-02&sig=abc"));
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_connect_account_key_connection_string() {
        let storage = Storage::connect(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=c2VjcmV0;EndpointSuffix=core.windows.net",
            "feeds/marketplace.xml",
        )
        .unwrap();
        match storage {
            Storage::Azure(store) => {
                assert_eq!(
                    store.blob_url().as_str(),
                    "https://acct.blob.core.windows.net/feeds/marketplace.xml"
                );
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_account_key_with_explicit_endpoint() {
        let (endpoint, credential) = parse_connection_string(
            "AccountName=acct;AccountKey=c2VjcmV0;BlobEndpoint=http://127.0.0.1:10000/acct",
        )
        .unwrap();
        assert_eq!(endpoint.as_str(), "http://127.0.0.1:10000/acct");
        assert_eq!(credential.unwrap().account(), "acct");
    }

    #[test]
    fn test_development_storage() {
        let (endpoint, credential) =
            parse_connection_string("UseDevelopmentStorage=true").unwrap();
        assert_eq!(endpoint.as_str(), EMULATOR_ENDPOINT);
        assert_eq!(credential.unwrap().account(), EMULATOR_ACCOUNT);
    }

    #[test]
    fn test_connection_string_needs_a_credential() {
        let err = Storage::connect("AccountName=acct;EndpointSuffix=core.windows.net", "a/b.xml")
            .unwrap_err();
        assert!(err.to_string().contains("AccountKey"));
        assert!(Storage::connect("AccountName=acct;AccountKey=%%%", "a/b.xml").is_err());
    }

    #[test]
    fn test_connect_rejects_unknown_scheme() {
        assert!(Storage::connect("ftp://example.com/feeds", "a.xml").is_err());
    }

    #[test]
    fn test_connect_empty() {
        assert!(matches!(
            Storage::connect("  ", "a.xml"),
            Err(ConfigError::Missing("StorageConnection"))
        ));
    }
}
