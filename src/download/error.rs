//! Error types for the download module.
//!
//! This module defines structured errors for every pipeline stage,
//! providing context-rich error messages for debugging and user feedback.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while extracting, transferring or persisting a video.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The body ended before the declared `Content-Length` was received.
    #[error("incomplete transfer from {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    IncompleteTransfer {
        /// The media URL.
        url: String,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// The extraction endpoint answered with a body we could not interpret.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// The endpoint URL.
        url: String,
        /// What was wrong with the body.
        reason: String,
    },

    /// The extraction endpoint reported an error of its own.
    #[error("extraction service rejected {source_reference}: {message}")]
    Api {
        /// The source reference sent to the endpoint.
        source_reference: String,
        /// The message returned by the endpoint.
        message: String,
    },

    /// Extraction succeeded but returned no media streams.
    #[error("no media candidates available for {source_reference}")]
    NoCandidates {
        /// The source reference sent to the endpoint.
        source_reference: String,
    },

    /// Not enough free space in the output directory.
    #[error(
        "insufficient disk space in {path}: {available_bytes} bytes available, {required_bytes} required"
    )]
    InsufficientSpace {
        /// Directory that was checked.
        path: PathBuf,
        /// Free bytes reported by the filesystem.
        available_bytes: u64,
        /// Bytes needed.
        required_bytes: u64,
    },

    /// File system error while writing or verifying.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Written file size does not match the transferred byte count.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The pipeline ended abnormally (panic or closed slot pool).
    #[error("internal error: {reason}")]
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

/// User-facing failure taxonomy.
///
/// Classification only shapes the failure message; it never changes
/// control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Upstream unreachable: timeouts, DNS, refused connections, cut-off bodies.
    Network,
    /// Error or malformed answers from the extraction/media endpoints.
    Upstream,
    /// Disk space, permissions, write/verify mismatch.
    Filesystem,
    /// Anything uncategorized.
    Unknown,
}

impl ErrorCategory {
    /// Returns the stable label used in failure reasons.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Upstream => "upstream",
            Self::Filesystem => "filesystem",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an incomplete transfer error.
    pub fn incomplete_transfer(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::IncompleteTransfer {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a malformed response error.
    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an upstream API error.
    pub fn api(source_reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            source_reference: source_reference.into(),
            message: message.into(),
        }
    }

    /// Creates an empty candidate list error.
    pub fn no_candidates(source_reference: impl Into<String>) -> Self {
        Self::NoCandidates {
            source_reference: source_reference.into(),
        }
    }

    /// Creates an insufficient disk space error.
    pub fn insufficient_space(
        path: impl Into<PathBuf>,
        available_bytes: u64,
        required_bytes: u64,
    ) -> Self {
        Self::InsufficientSpace {
            path: path.into(),
            available_bytes,
            required_bytes,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs a
// url or path the source error does not carry.
