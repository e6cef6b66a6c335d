//! Azure Blob Storage backend over the REST API.
//!
//! Requests are authorized either by a shared access signature carried in the
//! endpoint's query string, or by signing each request with the account key
//! (see [`super::shared_key`]).
//!
//! The blob URL is the configured endpoint followed by the `RSSPath` segments.
//! With an account-level
//! endpoint the first `RSSPath` segment is the container; with a container
//! SAS URL the whole `RSSPath` is the blob name.
//!
//! # Requests
//!
//! | Operation | Request | Notes |
//! |-----------|---------|-------|
//! | properties | `HEAD {blob}` | `404` means no blob; metadata from `x-ms-meta-*` |
//! | upload | `PUT {blob}` | `x-ms-blob-type: BlockBlob`; body, type and metadata in one call |

use super::BlobStore;
use super::shared_key::SharedKeyCredential;
use crate::error::{ConfigError, StorageError};
use crate::models::BlobProperties;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// REST API version sent with every request.
const API_VERSION: &str = "2021-08-06";

const META_PREFIX: &str = "x-ms-meta-";

#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    client: Client,
    blob_url: Url,
    credential: Option<SharedKeyCredential>,
}

impl AzureBlobStore {
    /// Bind to `rss_path` under a SAS-signed endpoint.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the resulting path does not name both a
    /// container and a blob.
    pub fn new(endpoint: Url, rss_path: &str) -> Result<Self, ConfigError> {
        let mut segments: Vec<String> = endpoint
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        segments.extend(
            rss_path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| urlencoding::encode(s).into_owned()),
        );

        if segments.len() < 2 {
            return Err(ConfigError::Invalid {
                key: "RSSPath",
                message: format!("{rss_path:?} must name a container and a blob"),
            });
        }

        let mut blob_url = endpoint;
        blob_url.set_path(&format!("/{}", segments.join("/")));
        Ok(Self {
            client: Client::new(),
            blob_url,
            credential: None,
        })
    }

    /// Bind to `rss_path` under `endpoint`, signing requests with the account key.
    ///
    /// # Errors
    ///
    /// Same as [`AzureBlobStore::new`].
    pub fn with_shared_key(
        endpoint: Url,
        rss_path: &str,
        credential: SharedKeyCredential,
    ) -> Result<Self, ConfigError> {
        let mut store = Self::new(endpoint, rss_path)?;
        store.credential = Some(credential);
        Ok(store)
    }

    #[cfg(test)]
    pub fn blob_url(&self) -> &Url {
        &self.blob_url
    }

    /// The blob URL without its signature.
    pub fn redacted_url(&self) -> String {
        let mut url = self.blob_url.clone();
        url.set_query(None);
        url.to_string()
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        let mut request = builder.header("x-ms-version", API_VERSION).build()?;
        if let Some(credential) = &self.credential {
            credential.authorize(&mut request)?;
        }
        Ok(self.client.execute(request).await?)
    }
}

fn header_text(name: &str, value: &reqwest::header::HeaderValue) -> Result<String, StorageError> {
    value
        .to_str()
        .map(str::to_string)
        .map_err(|_| StorageError::InvalidProperties(format!("header {name} is not valid text")))
}

impl BlobStore for AzureBlobStore {
    #[instrument(level = "debug", skip_all, fields(url = %self.redacted_url()))]
    async fn properties(&self) -> Result<Option<BlobProperties>, StorageError> {
        let resp = self.send(self.client.head(self.blob_url.clone())).await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Feed blob does not exist yet");
            return Ok(None);
        }
        if !status.is_success() {
            warn!(%status, "Reading blob properties failed");
            return Err(StorageError::Status {
                operation: "get blob properties",
                status,
            });
        }

        let mut props = BlobProperties::default();
        for (name, value) in resp.headers() {
            if name == CONTENT_TYPE {
                props.content_type = Some(header_text(name.as_str(), value)?);
            } else if let Some(key) = name.as_str().strip_prefix(META_PREFIX) {
                props
                    .metadata
                    .insert(key.to_string(), header_text(name.as_str(), value)?);
            }
        }
        Ok(Some(props))
    }

    #[instrument(level = "info", skip_all, fields(url = %self.redacted_url(), bytes = body.len()))]
    async fn upload(
        &self,
        body: Vec<u8>,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StorageError> {
        let mut req = self
            .client
            .put(self.blob_url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header(CONTENT_TYPE, content_type);
        for (key, value) in metadata {
            req = req.header(format!("{META_PREFIX}{key}"), value.as_str());
        }

        let resp = self.send(req.body(body)).await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%status, "Blob upload rejected");
            return Err(StorageError::Status {
                operation: "put blob",
                status,
            });
        }

        info!(%status, "Uploaded feed blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LAST_UPDATED_METADATA_KEY, RSS_CONTENT_TYPE};
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{
        body_string, header, header_exists, header_regex, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> AzureBlobStore {
        let endpoint = Url::parse(&format!("{}/?sv=2021-08-06&sig=secret", server.uri())).unwrap();
        AzureBlobStore::new(endpoint, "feeds/marketplace.xml").unwrap()
    }

    #[test]
    fn test_blob_url_from_account_endpoint() {
        let endpoint = Url::parse("https://acct.blob.core.windows.net/?sig=abc").unwrap();
        let store = AzureBlobStore::new(endpoint, "feeds/azure stack/marketplace.xml").unwrap();
        assert_eq!(
            store.blob_url().as_str(),
            "https://acct.blob.core.windows.net/feeds/azure%20stack/marketplace.xml?sig=abc"
        );
        assert_eq!(
            store.redacted_url(),
            "https://acct.blob.core.windows.net/feeds/azure%20stack/marketplace.xml"
        );
    }

    #[test]
    fn test_blob_url_from_container_sas() {
        let endpoint = Url::parse("https://acct.blob.core.windows.net/feeds?sig=abc").unwrap();
        let store = AzureBlobStore::new(endpoint, "marketplace.xml").unwrap();
        assert_eq!(store.blob_url().path(), "/feeds/marketplace.xml");
    }

    #[test]
    fn test_blob_path_needs_container() {
        let endpoint = Url::parse("https://acct.blob.core.windows.net/?sig=abc").unwrap();
        assert!(AzureBlobStore::new(endpoint, "marketplace.xml").is_err());
    }

    #[tokio::test]
    async fn test_properties_missing_blob() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/feeds/marketplace.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(store_for(&server).properties().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_properties_reads_metadata_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/feeds/marketplace.xml"))
            .and(query_param("sig", "secret"))
            .and(header("x-ms-version", API_VERSION))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", RSS_CONTENT_TYPE)
                    .insert_header("x-ms-meta-GitHubPageUpdate", "1/15/2023"),
            )
            .mount(&server)
            .await;

        let props = store_for(&server).properties().await.unwrap().unwrap();
        assert_eq!(props.content_type.as_deref(), Some(RSS_CONTENT_TYPE));
        assert_eq!(props.metadata_value(LAST_UPDATED_METADATA_KEY), Some("1/15/2023"));
    }

    #[tokio::test]
    async fn test_properties_ignores_unrelated_binary_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/feeds/marketplace.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-proxy-note", HeaderValue::from_bytes(b"caf\xe9").unwrap())
                    .insert_header("x-ms-meta-GitHubPageUpdate", "1/15/2023"),
            )
            .mount(&server)
            .await;

        let props = store_for(&server).properties().await.unwrap().unwrap();
        assert_eq!(props.metadata_value(LAST_UPDATED_METADATA_KEY), Some("1/15/2023"));
    }

    #[tokio::test]
    async fn test_properties_rejects_binary_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-meta-owner", HeaderValue::from_bytes(b"caf\xe9").unwrap()),
            )
            .mount(&server)
            .await;

        let err = store_for(&server).properties().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidProperties(_)));
    }

    #[tokio::test]
    async fn test_shared_key_requests_are_signed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/feeds/marketplace.xml"))
            .and(header_exists("x-ms-date"))
            .and(header("x-ms-version", API_VERSION))
            .and(header_regex("authorization", r"^SharedKey acct:[A-Za-z0-9+/]+=*$"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let credential = SharedKeyCredential::new("acct", "c2VjcmV0").unwrap();
        let store = AzureBlobStore::with_shared_key(
            Url::parse(&server.uri()).unwrap(),
            "feeds/marketplace.xml",
            credential,
        )
        .unwrap();
        assert_eq!(store.blob_url().query(), None);
        store
            .upload(b"<rss/>".to_vec(), RSS_CONTENT_TYPE, &BTreeMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_properties_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = store_for(&server).properties().await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Status {
                status: StatusCode::FORBIDDEN,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upload_sends_body_type_and_metadata_in_one_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/feeds/marketplace.xml"))
            .and(query_param("sig", "secret"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("content-type", RSS_CONTENT_TYPE))
            .and(header("x-ms-meta-GitHubPageUpdate", "1/15/2023"))
            .and(body_string("<rss/>"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let metadata =
            BTreeMap::from([(LAST_UPDATED_METADATA_KEY.to_string(), "1/15/2023".to_string())]);
        store_for(&server)
            .upload(b"<rss/>".to_vec(), RSS_CONTENT_TYPE, &metadata)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .upload(b"<rss/>".to_vec(), RSS_CONTENT_TYPE, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Status { operation: "put blob", .. }));
    }
}
