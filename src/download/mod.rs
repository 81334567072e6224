//! Download pipeline for fetching catalog videos to local storage.
//!
//! This module turns a [`DownloadRequest`] into a verified file on disk:
//! extraction of candidate streams, format selection, byte transfer,
//! collision-safe naming and a verified write, all sequenced by the
//! [`DownloadOrchestrator`].
//!
//! # Features
//!
//! - One in-flight pipeline per request id (late callers join it)
//! - Global concurrency bound over simultaneous downloads (default 3)
//! - Retry with exponential backoff around extraction and transfer
//! - Windows-safe filenames with `name(1).ext` collision suffixes
//! - Write-then-verify persistence through a temporary `.part` file
//! - State-change events for observers (progress bars, UIs)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vidgrab_core::download::{
//!     DownloadOrchestrator, DownloadRequest, HttpExtractor, HttpTransfer, LocalStorage,
//!     OrchestratorSettings,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = HttpExtractor::new("https://extract.example.com/api/parse", b"secret".to_vec())?;
//! let transfer = HttpTransfer::new(Some("https://videos.example.com/".to_string()))?;
//! let orchestrator = DownloadOrchestrator::new(
//!     OrchestratorSettings::default(),
//!     Arc::new(extractor),
//!     Arc::new(transfer),
//!     Arc::new(LocalStorage::new()),
//! )?;
//!
//! let request = DownloadRequest::new("v1", "https://videos.example.com/video/v1", "My video");
//! let outcome = orchestrator.request(request).await;
//! println!("success: {}", outcome.success);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod extractor;
pub mod filename;
mod format;
mod orchestrator;
mod persistence;
mod retry;
mod storage;
mod transfer;

pub use client::BROWSER_USER_AGENT;
pub use constants::DEFAULT_MIN_FREE_SPACE;
pub use error::{DownloadError, ErrorCategory};
pub use extractor::{Extraction, Extractor, HttpExtractor, MediaCandidate, sign_request};
pub use format::{DEFAULT_PREFERRED_FORMAT, extension_for_format, select_format};
pub use orchestrator::{
    DEFAULT_CONCURRENCY, DownloadEvent, DownloadEventKind, DownloadListener, DownloadOrchestrator,
    DownloadOutcome, DownloadRecord, DownloadRequest, DownloadState, ListenerId, MAX_CONCURRENCY,
    OrchestratorError, OrchestratorSettings,
};
pub use persistence::PersistenceWriter;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy, run_with_retry};
pub use storage::{LocalStorage, Storage, resolve_default_directory};
pub use transfer::{HttpTransfer, ProgressFn, Transfer};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
