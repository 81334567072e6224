//! Extraction client: resolves a source reference into candidate media streams.
//!
//! The [`Extractor`] trait is the seam the orchestrator consumes; the
//! [`HttpExtractor`] implementation talks to a signed JSON endpoint.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument};
use url::Url;

use super::DownloadError;
use super::client::build_http_client;
use super::constants::{EXTRACT_CONNECT_TIMEOUT_SECS, EXTRACT_READ_TIMEOUT_SECS};
use crate::user_agent;

/// Header carrying the request timestamp (Unix milliseconds).
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

/// Header carrying the hex HMAC-SHA256 signature over body + timestamp.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// One fetchable stream option returned by extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCandidate {
    /// Free-form type string, e.g. a container format such as `mp4`.
    pub format_tag: String,
    /// URL the bytes are fetched from.
    pub transfer_url: String,
    /// URL of a preview image or clip.
    pub preview_url: String,
}

impl MediaCandidate {
    /// Creates a candidate.
    pub fn new(
        format_tag: impl Into<String>,
        transfer_url: impl Into<String>,
        preview_url: impl Into<String>,
    ) -> Self {
        Self {
            format_tag: format_tag.into(),
            transfer_url: transfer_url.into(),
            preview_url: preview_url.into(),
        }
    }
}

/// Result of a successful extraction. `candidates` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Title reported by the extraction service.
    pub title: String,
    /// Candidate streams in service order.
    pub candidates: Vec<MediaCandidate>,
    /// Overseas availability flag, passed through untouched.
    pub overseas: bool,
}

/// Resolves an opaque source reference into candidate media streams.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts candidates for `source_reference`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure, malformed responses, an
    /// upstream error answer, or an empty candidate list.
    async fn extract(&self, source_reference: &str) -> Result<Extraction, DownloadError>;
}

/// Extraction client for the signed JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: Client,
    endpoint: String,
    secret: Vec<u8>,
}

#[derive(Serialize)]
struct ExtractRequestBody<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponseBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    medias: Option<Vec<WireMedia>>,
    #[serde(default)]
    overseas: Option<OverseasFlag>,
}

#[derive(Deserialize)]
struct WireMedia {
    #[serde(alias = "format")]
    media_type: String,
    resource_url: String,
    #[serde(default)]
    preview_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OverseasFlag {
    Bool(bool),
    Int(i64),
}

impl OverseasFlag {
    fn as_bool(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
        }
    }
}

impl HttpExtractor {
    /// Creates an extractor for `endpoint` signing requests with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the endpoint is not an
    /// absolute http(s) URL, or [`DownloadError::Internal`] if the HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, secret: impl Into<Vec<u8>>) -> Result<Self, DownloadError> {
        Self::with_timeouts(
            endpoint,
            secret,
            EXTRACT_CONNECT_TIMEOUT_SECS,
            EXTRACT_READ_TIMEOUT_SECS,
        )
    }

    /// Creates an extractor with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Same as [`HttpExtractor::new`].
    pub fn with_timeouts(
        endpoint: &str,
        secret: impl Into<Vec<u8>>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let parsed = Url::parse(endpoint).map_err(|_| DownloadError::invalid_url(endpoint))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(endpoint));
        }
        let client = build_http_client(
            connect_timeout_secs,
            read_timeout_secs,
            &user_agent::default_extract_user_agent(),
        )?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            secret: secret.into(),
        })
    }

    /// Returns the configured endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn extract(&self, source_reference: &str) -> Result<Extraction, DownloadError> {
        let body = serde_json::to_string(&ExtractRequestBody {
            url: source_reference,
        })
        .map_err(|e| DownloadError::internal(format!("failed to encode request: {e}")))?;
        let timestamp = unix_millis().to_string();
        let signature = sign_request(&self.secret, &body, &timestamp);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(TIMESTAMP_HEADER, &timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| DownloadError::network(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(&self.endpoint, status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DownloadError::network(&self.endpoint, e))?;
        let extraction = parse_extract_response(&self.endpoint, source_reference, &text)?;
        debug!(
            title = %extraction.title,
            candidates = extraction.candidates.len(),
            "extraction succeeded"
        );
        Ok(extraction)
    }
}

/// Computes the lowercase hex HMAC-SHA256 of `body` followed by `timestamp`.
#[must_use]
pub fn sign_request(secret: &[u8], body: &str, timestamp: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(body.as_bytes());
    mac.update(timestamp.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn parse_extract_response(
    endpoint: &str,
    source_reference: &str,
    body: &str,
) -> Result<Extraction, DownloadError> {
    let parsed: ExtractResponseBody = serde_json::from_str(body)
        .map_err(|e| DownloadError::malformed(endpoint, format!("invalid JSON body: {e}")))?;

    if let Some(message) = parsed.error.filter(|m| !m.trim().is_empty()) {
        return Err(DownloadError::api(source_reference, message));
    }

    let title = parsed
        .title
        .ok_or_else(|| DownloadError::malformed(endpoint, "missing `title` field"))?;
    let medias = parsed
        .medias
        .ok_or_else(|| DownloadError::malformed(endpoint, "missing `medias` field"))?;

    let candidates: Vec<MediaCandidate> = medias
        .into_iter()
        .map(|media| MediaCandidate {
            format_tag: media.media_type,
            transfer_url: media.resource_url,
            preview_url: media.preview_url,
        })
        .collect();

    if candidates.is_empty() {
        return Err(DownloadError::no_candidates(source_reference));
    }
    if candidates.iter().any(|c| c.transfer_url.trim().is_empty()) {
        return Err(DownloadError::malformed(endpoint, "media entry with empty `resource_url`"));
    }

    Ok(Extraction {
        title,
        candidates,
        overseas: parsed.overseas.is_some_and(|flag| flag.as_bool()),
    })
}
