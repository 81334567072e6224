//! Vidgrab Core Library
//!
//! This library provides the download orchestration core for the vidgrab
//! tool, which fetches videos from a catalog into local storage with
//! deduplicated, concurrency-bounded and verified downloads.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Catalog item stubs and canonical video page URLs
//! - [`download`] - Extraction, transfer, naming, persistence and the orchestrator

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod download;
mod user_agent;

// Re-export commonly used types
pub use catalog::{CatalogItem, SearchPage, site_url, video_page_url};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DownloadError, DownloadEvent, DownloadEventKind,
    DownloadOrchestrator, DownloadOutcome, DownloadRecord, DownloadRequest, DownloadState,
    ErrorCategory, Extraction, Extractor, HttpExtractor, HttpTransfer, LocalStorage,
    MediaCandidate, OrchestratorError, OrchestratorSettings, RetryPolicy, Storage, Transfer,
    run_with_retry,
};
