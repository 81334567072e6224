//! Transfer executor: streams the bytes of a chosen media candidate.
//!
//! The whole body is buffered in memory and only handed back once complete,
//! so a transfer that fails midway never surfaces partial bytes.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, REFERER};
use tracing::{debug, instrument};
use url::Url;

use super::DownloadError;
use super::client::{BROWSER_USER_AGENT, build_http_client};
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Upper bound on the up-front buffer reservation taken from `Content-Length`.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Progress callback: `(bytes_downloaded, bytes_total)`, total is 0 while unknown.
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Fetches the bytes behind a transfer URL.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Downloads `url` completely, reporting progress along the way.
    ///
    /// `progress` is called at least once, after the last byte arrived.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on invalid URLs, network failures, error
    /// statuses, or a body shorter than its declared length.
    async fn transfer(&self, url: &str, progress: &ProgressFn<'_>)
    -> Result<Vec<u8>, DownloadError>;
}

/// Transfer executor over HTTP(S).
///
/// Every request carries a browser User-Agent and, when configured, a
/// `Referer` pointing at the catalog site; media origins commonly answer
/// 403 without them.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
    referer: Option<String>,
}

impl HttpTransfer {
    /// Creates a transfer executor with default timeouts (30s connect, 5min read).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Internal`] if the HTTP client cannot be built.
    pub fn new(referer: Option<String>) -> Result<Self, DownloadError> {
        Self::with_timeouts(referer, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transfer executor with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Internal`] if the HTTP client cannot be built.
    pub fn with_timeouts(
        referer: Option<String>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = build_http_client(connect_timeout_secs, read_timeout_secs, BROWSER_USER_AGENT)?;
        Ok(Self {
            client,
            referer: referer.filter(|r| !r.trim().is_empty()),
        })
    }

    /// Returns the configured referer, if any.
    #[must_use]
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    #[instrument(skip(self, progress), fields(url = %url))]
    async fn transfer(
        &self,
        url: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<Vec<u8>, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let mut request = self.client.get(parsed).header(ACCEPT, "*/*");
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let total = response.content_length().unwrap_or(0);
        debug!(total, "transfer started");

        let capacity = usize::try_from(total.min(MAX_PREALLOCATION)).unwrap_or(0);
        let mut buffer = Vec::with_capacity(capacity);
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
            buffer.extend_from_slice(&chunk);
            downloaded += chunk.len() as u64;
            progress(downloaded, total);
        }

        if total > 0 && downloaded != total {
            return Err(DownloadError::incomplete_transfer(url, total, downloaded));
        }

        // Completion report; also supplies the total when the server sent none.
        progress(downloaded, downloaded);
        debug!(bytes = downloaded, "transfer complete");
        Ok(buffer)
    }
}
