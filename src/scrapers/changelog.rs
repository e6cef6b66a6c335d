//! Marketplace changelog fetcher.
//!
//! Opens the changelog with a single `GET` and hands it out one line at a
//! time as response chunks arrive. Non-success statuses and broken streams
//! are [`RunError::Fetch`]; nothing is retried.

use crate::error::RunError;
use reqwest::{Client, Response};
use tracing::{debug, info, instrument};
use url::Url;

/// Lines of the changelog, decoded as UTF-8 with lossy replacement.
#[derive(Debug)]
pub struct ChangelogLines {
    url: String,
    response: Response,
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    finished: bool,
    bytes_read: usize,
}

/// Start fetching the changelog.
///
/// # Errors
///
/// [`RunError::Fetch`] if the request fails or the server answers with a
/// non-success status.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn open(client: &Client, url: &Url) -> Result<ChangelogLines, RunError> {
    let fetch_err = |source| RunError::Fetch {
        url: url.to_string(),
        source,
    };

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(Response::error_for_status)
        .map_err(fetch_err)?;

    info!(status = %response.status(), "Changelog response received");
    Ok(ChangelogLines {
        url: url.to_string(),
        response,
        buf: Vec::new(),
        scanned: 0,
        finished: false,
        bytes_read: 0,
    })
}

impl ChangelogLines {
    /// Next line without its terminator, or `None` at end of document.
    ///
    /// A final line that is not newline-terminated is still returned.
    ///
    /// # Errors
    ///
    /// [`RunError::Fetch`] if the body stream breaks mid-read.
    pub async fn next_line(&mut self) -> Result<Option<String>, RunError> {
        loop {
            if let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buf.drain(..=self.scanned + offset).collect();
                self.scanned = 0;
                return Ok(Some(decode_line(&raw)));
            }
            self.scanned = self.buf.len();

            if self.finished {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let raw = std::mem::take(&mut self.buf);
                self.scanned = 0;
                return Ok(Some(decode_line(&raw)));
            }

            match self.response.chunk().await {
                Ok(Some(chunk)) => {
                    self.bytes_read += chunk.len();
                    self.buf.extend_from_slice(&chunk);
                }
                Ok(None) => {
                    debug!(bytes = self.bytes_read, "Changelog stream finished");
                    self.finished = true;
                }
                Err(source) => {
                    return Err(RunError::Fetch {
                        url: self.url.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Bytes received so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// A source that promises more body than it sends, then hangs up.
#[cfg(test)]
pub(crate) async fn truncated_source(body: &'static str) -> Url {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/markdown\r\nContent-Length: 5000\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    Url::parse(&format!("http://{addr}/marketplace-changes.md")).unwrap()
}
