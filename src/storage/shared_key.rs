//! Shared Key authorization for Blob service requests.
//!
//! Used when `StorageConnection` is an account-key connection string. Each
//! request gets an `x-ms-date` header and an
//! `Authorization: SharedKey <account>:<signature>` header, where the
//! signature is a base64 HMAC-SHA256 over the canonical request.

use crate::error::{ConfigError, StorageError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use itertools::Itertools;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, Request};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// RFC 1123 date, the only form the service accepts in `x-ms-date`.
const MS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Standard headers that take part in the signature, in signing order.
const SIGNED_HEADERS: [&str; 10] = [
    "content-encoding",
    "content-language",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    mac: HmacSha256,
}

impl fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the account name is empty or the key is
    /// not base64.
    pub fn new(account: &str, key: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            key: "StorageConnection",
            message,
        };
        let account = account.trim();
        if account.is_empty() {
            return Err(invalid("connection string has no AccountName".to_string()));
        }
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| invalid(format!("AccountKey is not base64: {e}")))?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| invalid(format!("AccountKey rejected: {e}")))?;
        Ok(Self {
            account: account.to_string(),
            mac,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Stamp `x-ms-date` on a built request and sign it.
    ///
    /// # Errors
    ///
    /// [`StorageError::Signing`] if a header value cannot be encoded.
    pub fn authorize(&self, request: &mut Request) -> Result<(), StorageError> {
        let date = Utc::now().format(MS_DATE_FORMAT).to_string();
        request
            .headers_mut()
            .insert("x-ms-date", header_value(&date)?);

        let content_length = request
            .body()
            .and_then(|body| body.as_bytes())
            .map_or(0, <[u8]>::len);
        let to_sign = self.string_to_sign(
            request.method(),
            request.url(),
            request.headers(),
            content_length,
        );
        let authorization = format!("SharedKey {}:{}", self.account, self.signature(&to_sign));
        request
            .headers_mut()
            .insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }

    fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> String {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let mut lines = vec![method.as_str().to_string()];
        for name in SIGNED_HEADERS {
            if name == "content-md5" {
                // a zero length is signed as empty
                lines.push(if content_length == 0 {
                    String::new()
                } else {
                    content_length.to_string()
                });
            }
            lines.push(value(name));
        }
        let mut out = lines.join("\n");
        out.push('\n');

        let ms_headers: BTreeMap<&str, String> = headers
            .iter()
            .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?.split_whitespace().join(" ");
                Some((name.as_str(), value))
            })
            .collect();
        for (name, value) in ms_headers {
            out.push_str(&format!("{name}:{value}\n"));
        }

        out.push('/');
        out.push_str(&self.account);
        out.push_str(url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.to_lowercase())
                .or_default()
                .push(value.into_owned());
        }
        for (name, mut values) in params {
            values.sort();
            out.push_str(&format!("\n{name}:{}", values.join(",")));
        }
        out
    }

    fn signature(&self, to_sign: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(to_sign.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|e| StorageError::Signing(e.to_string()))
}
