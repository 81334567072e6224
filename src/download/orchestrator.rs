//! Download orchestrator: per-id state machine over the download pipeline.
//!
//! The orchestrator owns every [`DownloadRecord`] and is the only component
//! that mutates them. It guarantees:
//!
//! - at most one pipeline per id; callers arriving while one is in flight
//!   receive the same [`DownloadOutcome`]
//! - at most `concurrency` records in `Downloading` at any instant
//! - failures are classified into an [`ErrorCategory`](crate::download::ErrorCategory)
//!   and recorded as `"[category] message"`
//! - listeners observe every state change, and a panicking listener never
//!   affects the pipeline
//!
//! Each pipeline runs on its own tokio task, so a caller dropping its
//! `request` future does not cancel work other callers may be waiting on.

mod error_mapping;
mod events;
mod record;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, instrument, warn};

use super::filename::{file_name_for, resolve_unique};
use super::{
    DEFAULT_MIN_FREE_SPACE, DEFAULT_PREFERRED_FORMAT, DownloadError, Extractor, PersistenceWriter,
    RetryPolicy, Storage, Transfer, resolve_default_directory, run_with_retry, select_format,
};
use error_mapping::{classify_error, failure_reason};
use events::{ListenerRegistry, panic_message};

pub use events::{DownloadEvent, DownloadEventKind, DownloadListener, ListenerId};
pub use record::{DownloadOutcome, DownloadRecord, DownloadRequest, DownloadState};

/// Default number of simultaneous downloads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Minimum allowed concurrency.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 16;

/// Errors returned by orchestrator management operations.
///
/// Pipeline failures are never reported through this type; they end up in
/// the record and in the [`DownloadOutcome`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Concurrency outside `1..=16`.
    #[error("invalid concurrency {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// No record exists for the id.
    #[error("no download tracked for id '{id}'")]
    UnknownDownload {
        /// The unknown id.
        id: String,
    },

    /// `retry` called on a record that has not failed.
    #[error("download '{id}' is {state}; only failed downloads can be retried")]
    NotRetryable {
        /// The record id.
        id: String,
        /// Its current state.
        state: DownloadState,
    },

    /// `clear` called while a pipeline for the id is still running.
    #[error("download '{id}' is still in flight")]
    InFlight {
        /// The record id.
        id: String,
    },
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Directory finished files are written to; created on demand.
    pub output_dir: PathBuf,
    /// Maximum simultaneous downloads, `1..=16`.
    pub concurrency: usize,
    /// Retry policy applied separately to extraction and to transfer.
    pub retry_policy: RetryPolicy,
    /// Preferred format tag, matched case-insensitively as a substring.
    pub preferred_format: String,
    /// Free space required in `output_dir` before a transfer starts.
    pub min_free_space: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            output_dir: resolve_default_directory(),
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            preferred_format: DEFAULT_PREFERRED_FORMAT.to_string(),
            min_free_space: DEFAULT_MIN_FREE_SPACE,
        }
    }
}

type OutcomeReceiver = watch::Receiver<Option<DownloadOutcome>>;
type OutcomeSender = watch::Sender<Option<DownloadOutcome>>;

struct Entry {
    request: DownloadRequest,
    record: DownloadRecord,
    /// Present while a pipeline for this id is running.
    pending: Option<OutcomeReceiver>,
}

enum Admission {
    Settled(DownloadOutcome),
    Pending(OutcomeReceiver),
}

/// Sequences extraction, format selection, transfer, naming and persistence
/// for each request, and tracks every request's state.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: OrchestratorSettings,
    extractor: Arc<dyn Extractor>,
    transfer: Arc<dyn Transfer>,
    storage: Arc<dyn Storage>,
    writer: PersistenceWriter,
    slots: Arc<Semaphore>,
    /// Serializes collision resolution and the write that claims the name.
    naming_lock: tokio::sync::Mutex<()>,
    table: Mutex<HashMap<String, Entry>>,
    listeners: ListenerRegistry,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("settings", &self.inner.settings)
            .field("available_slots", &self.inner.slots.available_permits())
            .finish_non_exhaustive()
    }
}

impl DownloadOrchestrator {
    /// Creates an orchestrator over the given pipeline components.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConcurrency`] if
    /// `settings.concurrency` is outside `1..=16`.
    #[instrument(level = "debug", skip_all, fields(concurrency = settings.concurrency))]
    pub fn new(
        settings: OrchestratorSettings,
        extractor: Arc<dyn Extractor>,
        transfer: Arc<dyn Transfer>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, OrchestratorError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&settings.concurrency) {
            return Err(OrchestratorError::InvalidConcurrency {
                value: settings.concurrency,
            });
        }

        debug!(output_dir = %settings.output_dir.display(), "creating download orchestrator");

        Ok(Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(settings.concurrency)),
                writer: PersistenceWriter::new(Arc::clone(&storage)),
                settings,
                extractor,
                transfer,
                storage,
                naming_lock: tokio::sync::Mutex::new(()),
                table: Mutex::new(HashMap::new()),
                listeners: ListenerRegistry::default(),
            }),
        })
    }

    /// Returns the settings this orchestrator was built with.
    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Requests a download and waits for its outcome.
    ///
    /// - A new or idle id starts a pipeline.
    /// - An id with a pipeline in flight joins it; no new work starts.
    /// - A completed or failed id returns the stored outcome; use
    ///   [`retry`](Self::retry) to run a failed download again.
    ///
    /// Pipeline failures are reported in the outcome, never as a panic or
    /// error.
    #[instrument(skip(self, request), fields(id = %request.id))]
    pub async fn request(&self, request: DownloadRequest) -> DownloadOutcome {
        let id = request.id.clone();
        match self.inner.admit(request) {
            Admission::Settled(outcome) => outcome,
            Admission::Pending(receiver) => wait_for_outcome(&id, receiver).await,
        }
    }

    /// Runs a failed download again and waits for the new outcome.
    ///
    /// If a pipeline for `id` is already in flight, joins it instead.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDownload`] for untracked ids and
    /// [`OrchestratorError::NotRetryable`] for records that are idle or
    /// completed.
    #[instrument(skip(self))]
    pub async fn retry(&self, id: &str) -> Result<DownloadOutcome, OrchestratorError> {
        let receiver = {
            let mut table = self.inner.lock_table();
            let entry = table
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::UnknownDownload { id: id.to_string() })?;

            if let Some(pending) = &entry.pending {
                debug!("retry joins in-flight download");
                pending.clone()
            } else if entry.record.state == DownloadState::Failed {
                info!("retrying failed download");
                self.inner.launch(entry)
            } else {
                return Err(OrchestratorError::NotRetryable {
                    id: id.to_string(),
                    state: entry.record.state,
                });
            }
        };

        Ok(wait_for_outcome(id, receiver).await)
    }

    /// Returns the record to `Idle`, clearing progress, result and failure.
    ///
    /// Resetting does not interrupt a pipeline that is already running:
    /// it still writes its own terminal state when it finishes, and new
    /// requests for the id keep joining it until then.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDownload`] for untracked ids.
    #[instrument(skip(self))]
    pub fn reset(&self, id: &str) -> Result<(), OrchestratorError> {
        let event = {
            let mut table = self.inner.lock_table();
            let entry = table
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::UnknownDownload { id: id.to_string() })?;
            if entry.pending.is_some() {
                warn!("reset while a download is in flight; it will still record its own outcome");
            }
            entry.record.reset();
            DownloadEvent {
                kind: DownloadEventKind::Reset,
                record: entry.record.clone(),
            }
        };

        self.inner.listeners.notify(&event);
        Ok(())
    }

    /// Returns a snapshot of the record for `id`.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<DownloadRecord> {
        self.inner
            .lock_table()
            .get(id)
            .map(|entry| entry.record.clone())
    }

    /// Returns snapshots of every tracked record, ordered by id.
    #[must_use]
    pub fn records(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<DownloadRecord> = self
            .inner
            .lock_table()
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Number of records currently in `Downloading`.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .lock_table()
            .values()
            .filter(|entry| entry.record.state == DownloadState::Downloading)
            .count()
    }

    /// Stops tracking `id`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownDownload`] for untracked ids and
    /// [`OrchestratorError::InFlight`] while a pipeline for `id` is running.
    pub fn clear(&self, id: &str) -> Result<(), OrchestratorError> {
        let mut table = self.inner.lock_table();
        match table.get(id) {
            None => Err(OrchestratorError::UnknownDownload { id: id.to_string() }),
            Some(entry) if entry.pending.is_some() => {
                Err(OrchestratorError::InFlight { id: id.to_string() })
            }
            Some(_) => {
                table.remove(id);
                Ok(())
            }
        }
    }

    /// Drops every completed or failed record; returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut table = self.inner.lock_table();
        let before = table.len();
        table.retain(|_, entry| entry.pending.is_some() || !entry.record.state.is_terminal());
        before - table.len()
    }

    /// Registers a listener for state-change events.
    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: DownloadListener + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    /// Removes a listener; returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }
}

impl Inner {
    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(self: &Arc<Self>, request: DownloadRequest) -> Admission {
        let mut table = self.lock_table();

        if let Some(entry) = table.get(&request.id) {
            if let Some(pending) = &entry.pending {
                debug!("joining in-flight download");
                return Admission::Pending(pending.clone());
            }
            if let Some(outcome) = entry.record.outcome() {
                debug!(state = %entry.record.state, "returning stored outcome");
                return Admission::Settled(outcome);
            }
        }

        let entry = table
            .entry(request.id.clone())
            .or_insert_with(|| Entry {
                request: request.clone(),
                record: DownloadRecord::new(request.id.clone()),
                pending: None,
            });
        entry.request = request;
        Admission::Pending(self.launch(entry))
    }

    /// Spawns the pipeline task for `entry`; must be called under the table lock.
    fn launch(self: &Arc<Self>, entry: &mut Entry) -> OutcomeReceiver {
        let (sender, receiver) = watch::channel(None);
        entry.pending = Some(receiver.clone());

        let inner = Arc::clone(self);
        let request = entry.request.clone();
        tokio::spawn(async move { inner.drive(request, sender).await });

        receiver
    }

    async fn drive(self: Arc<Self>, request: DownloadRequest, sender: OutcomeSender) {
        let id = request.id.clone();
        let permit = Arc::clone(&self.slots).acquire_owned().await;

        let result = match &permit {
            Ok(_) => {
                self.mark_started(&id);
                match AssertUnwindSafe(self.execute(&request)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(DownloadError::internal(format!(
                        "download pipeline panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                }
            }
            Err(_) => Err(DownloadError::internal("download slots closed")),
        };

        // The terminal state is recorded while the slot is still held.
        let outcome = self.settle(&id, result);
        drop(permit);
        sender.send_replace(Some(outcome));
    }

    #[instrument(skip(self, request), fields(id = %request.id))]
    async fn execute(&self, request: &DownloadRequest) -> Result<(PathBuf, u64), DownloadError> {
        let policy = &self.settings.retry_policy;
        let source = request.source_reference.as_str();

        let extraction = run_with_retry(policy, || self.extractor.extract(source)).await?;
        let candidate = select_format(&extraction.candidates, &self.settings.preferred_format)
            .ok_or_else(|| DownloadError::no_candidates(source))?;
        debug!(format = %candidate.format_tag, candidates = extraction.candidates.len(), "selected candidate");

        let directory = self.settings.output_dir.as_path();
        self.storage
            .create_dir_all(directory)
            .await
            .map_err(|e| DownloadError::io(directory, e))?;
        self.ensure_space(directory, self.settings.min_free_space).await?;

        let id = request.id.as_str();
        let report = |downloaded: u64, total: u64| self.record_progress(id, downloaded, total);
        let bytes = run_with_retry(policy, || {
            self.transfer.transfer(&candidate.transfer_url, &report)
        })
        .await?;
        let length = bytes.len() as u64;
        self.ensure_space(directory, length).await?;

        let display_name = if request.display_name.trim().is_empty() {
            extraction.title.as_str()
        } else {
            request.display_name.as_str()
        };
        let file_name = file_name_for(display_name, &candidate.format_tag);

        let _naming = self.naming_lock.lock().await;
        let unique_name = resolve_unique(self.storage.as_ref(), directory, &file_name).await;
        let path = self.writer.write(&directory.join(unique_name), &bytes).await?;

        Ok((path, length))
    }

    async fn ensure_space(&self, directory: &Path, required: u64) -> Result<(), DownloadError> {
        if required == 0 {
            return Ok(());
        }
        match self.storage.available_space(directory).await {
            Ok(available) if available < required => Err(DownloadError::insufficient_space(
                directory, available, required,
            )),
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(path = %directory.display(), error = %error, "could not determine free space");
                Ok(())
            }
        }
    }

    fn mark_started(&self, id: &str) {
        let event = {
            let mut table = self.lock_table();
            let Some(entry) = table.get_mut(id) else {
                return;
            };
            entry.record.begin();
            DownloadEvent {
                kind: DownloadEventKind::Started,
                record: entry.record.clone(),
            }
        };
        info!(id, "download started");
        self.listeners.notify(&event);
    }

    fn record_progress(&self, id: &str, downloaded: u64, total: u64) {
        let event = {
            let mut table = self.lock_table();
            let Some(entry) = table.get_mut(id) else {
                return;
            };
            if !entry.record.apply_progress(downloaded, total) {
                return;
            }
            DownloadEvent {
                kind: DownloadEventKind::Progress,
                record: entry.record.clone(),
            }
        };
        self.listeners.notify(&event);
    }

    fn settle(&self, id: &str, result: Result<(PathBuf, u64), DownloadError>) -> DownloadOutcome {
        let (outcome, event) = {
            let mut table = self.lock_table();
            let entry = table.get_mut(id);

            match (result, entry) {
                (Ok((path, bytes)), Some(entry)) => {
                    info!(id, path = %path.display(), bytes, "download completed");
                    entry.pending = None;
                    entry.record.complete(path.clone(), bytes);
                    let event = DownloadEvent {
                        kind: DownloadEventKind::Completed,
                        record: entry.record.clone(),
                    };
                    (DownloadOutcome::succeeded(id, path), Some(event))
                }
                (Err(error), Some(entry)) => {
                    let category = classify_error(&error);
                    let reason = failure_reason(&error, category);
                    warn!(id, category = %category, error = %error, "download failed");
                    entry.pending = None;
                    entry.record.fail(reason.clone(), category);
                    let event = DownloadEvent {
                        kind: DownloadEventKind::Failed,
                        record: entry.record.clone(),
                    };
                    (DownloadOutcome::failed(id, reason), Some(event))
                }
                (Ok((path, _)), None) => {
                    warn!(id, "record vanished before completion was recorded");
                    (DownloadOutcome::succeeded(id, path), None)
                }
                (Err(error), None) => {
                    warn!(id, "record vanished before failure was recorded");
                    let reason = failure_reason(&error, classify_error(&error));
                    (DownloadOutcome::failed(id, reason), None)
                }
            }
        };

        if let Some(event) = event {
            self.listeners.notify(&event);
        }
        outcome
    }
}

async fn wait_for_outcome(id: &str, mut receiver: OutcomeReceiver) -> DownloadOutcome {
    let settled = match receiver.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    };
    settled.unwrap_or_else(|| {
        DownloadOutcome::failed(id, "[unknown] download task ended without an outcome")
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::download::{ErrorCategory, Extraction, LocalStorage, MediaCandidate, ProgressFn};

    // ==================== Fakes ====================

    struct StaticExtractor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for StaticExtractor {
        async fn extract(&self, source_reference: &str) -> Result<Extraction, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DownloadError::api(source_reference, "video removed"));
            }
            Ok(Extraction {
                title: "Fallback title".to_string(),
                candidates: vec![MediaCandidate::new("mp4", "https://cdn.test/a.mp4", "")],
                overseas: false,
            })
        }
    }

    struct StaticTransfer;

    #[async_trait]
    impl Transfer for StaticTransfer {
        async fn transfer(
            &self,
            _url: &str,
            progress: &ProgressFn<'_>,
        ) -> Result<Vec<u8>, DownloadError> {
            progress(4, 4);
            Ok(b"data".to_vec())
        }
    }

    struct FullDisk(LocalStorage);

    #[async_trait]
    impl Storage for FullDisk {
        async fn path_exists(&self, path: &Path) -> bool {
            self.0.path_exists(path).await
        }
        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            self.0.create_dir_all(path).await
        }
        async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
            self.0.write_file(path, bytes).await
        }
        async fn file_len(&self, path: &Path) -> io::Result<u64> {
            self.0.file_len(path).await
        }
        async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.0.rename(from, to).await
        }
        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.0.remove_file(path).await
        }
        async fn available_space(&self, _path: &Path) -> io::Result<u64> {
            Ok(0)
        }
    }

    fn settings(dir: &Path) -> OrchestratorSettings {
        OrchestratorSettings {
            output_dir: dir.to_path_buf(),
            concurrency: 2,
            retry_policy: RetryPolicy::new(
                2,
                Duration::from_millis(1),
                Duration::from_millis(2),
                2.0,
            ),
            preferred_format: "mp4".to_string(),
            min_free_space: 0,
        }
    }

    fn orchestrator(dir: &Path, fail: bool) -> (DownloadOrchestrator, Arc<StaticExtractor>) {
        let extractor = Arc::new(StaticExtractor {
            calls: AtomicUsize::new(0),
            fail,
        });
        let orchestrator = DownloadOrchestrator::new(
            settings(dir),
            extractor.clone(),
            Arc::new(StaticTransfer),
            Arc::new(LocalStorage::new()),
        )
        .unwrap();
        (orchestrator, extractor)
    }

    // ==================== Construction ====================

    #[test]
    fn test_new_rejects_out_of_range_concurrency() {
        let temp_dir = TempDir::new().unwrap();
        for value in [0, MAX_CONCURRENCY + 1] {
            let mut settings = settings(temp_dir.path());
            settings.concurrency = value;
            let result = DownloadOrchestrator::new(
                settings,
                Arc::new(StaticExtractor {
                    calls: AtomicUsize::new(0),
                    fail: false,
                }),
                Arc::new(StaticTransfer),
                Arc::new(LocalStorage::new()),
            );
            assert!(
                matches!(result, Err(OrchestratorError::InvalidConcurrency { value: v }) if v == value)
            );
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.preferred_format, "mp4");
        assert_eq!(settings.min_free_space, DEFAULT_MIN_FREE_SPACE);
        assert!(settings.output_dir.ends_with("vidgrab"));
    }

    // ==================== Lifecycle ====================

    #[tokio::test]
    async fn test_request_completes_and_records_result() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);

        let outcome = orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "Clip"))
            .await;

        assert!(outcome.success, "{outcome:?}");
        let path = outcome.path.unwrap();
        assert_eq!(path, temp_dir.path().join("Clip.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");

        let record = orchestrator.record("v1").unwrap();
        assert_eq!(record.state, DownloadState::Completed);
        assert_eq!(record.bytes_total, 4);
        assert_eq!(record.result_path, Some(path));
        assert_eq!(orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_display_name_falls_back_to_title() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);

        let outcome = orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "  "))
            .await;
        assert_eq!(
            outcome.path,
            Some(temp_dir.path().join("Fallback title.mp4"))
        );
    }

    #[tokio::test]
    async fn test_failure_is_classified_and_stored() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, extractor) = orchestrator(temp_dir.path(), true);

        let outcome = orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "Clip"))
            .await;

        assert!(!outcome.success);
        let reason = outcome.error.unwrap();
        assert!(reason.starts_with("[upstream]"), "got: {reason}");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);

        let record = orchestrator.record("v1").unwrap();
        assert_eq!(record.state, DownloadState::Failed);
        assert_eq!(record.error_category, Some(ErrorCategory::Upstream));
        assert!(record.result_path.is_none());
    }

    #[tokio::test]
    async fn test_settled_ids_return_stored_outcome_without_new_work() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, extractor) = orchestrator(temp_dir.path(), false);
        let request = DownloadRequest::new("v1", "ref-1", "Clip");

        let first = orchestrator.request(request.clone()).await;
        let second = orchestrator.request(request).await;

        assert_eq!(first, second);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(!temp_dir.path().join("Clip(1).mp4").exists());
    }

    #[tokio::test]
    async fn test_insufficient_space_fails_before_transfer() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings(temp_dir.path());
        settings.min_free_space = 1024;
        let orchestrator = DownloadOrchestrator::new(
            settings,
            Arc::new(StaticExtractor {
                calls: AtomicUsize::new(0),
                fail: false,
            }),
            Arc::new(StaticTransfer),
            Arc::new(FullDisk(LocalStorage::new())),
        )
        .unwrap();

        let outcome = orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "Clip"))
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("[filesystem]"));
        let record = orchestrator.record("v1").unwrap();
        assert_eq!(record.bytes_downloaded, 0);
        assert!(!temp_dir.path().join("Clip.mp4").exists());
    }

    // ==================== Management ====================

    #[tokio::test]
    async fn test_retry_rules() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);

        assert!(matches!(
            orchestrator.retry("missing").await,
            Err(OrchestratorError::UnknownDownload { .. })
        ));

        orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "Clip"))
            .await;
        assert!(matches!(
            orchestrator.retry("v1").await,
            Err(OrchestratorError::NotRetryable {
                state: DownloadState::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_record_to_idle_and_allows_new_run() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, extractor) = orchestrator(temp_dir.path(), false);
        let request = DownloadRequest::new("v1", "ref-1", "Clip");

        orchestrator.request(request.clone()).await;
        orchestrator.reset("v1").unwrap();

        let record = orchestrator.record("v1").unwrap();
        assert_eq!(record.state, DownloadState::Idle);
        assert_eq!(record.bytes_downloaded, 0);
        assert!(record.result_path.is_none());

        let outcome = orchestrator.request(request).await;
        assert!(outcome.success);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
        // The first file still exists, so the second run picks a suffix.
        assert_eq!(outcome.path, Some(temp_dir.path().join("Clip(1).mp4")));
    }

    #[tokio::test]
    async fn test_clear_and_clear_finished() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);

        assert!(matches!(
            orchestrator.clear("v1"),
            Err(OrchestratorError::UnknownDownload { .. })
        ));

        orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "One"))
            .await;
        orchestrator
            .request(DownloadRequest::new("v2", "ref-2", "Two"))
            .await;
        assert_eq!(orchestrator.records().len(), 2);

        orchestrator.clear("v1").unwrap();
        assert!(orchestrator.record("v1").is_none());
        assert_eq!(orchestrator.clear_finished(), 1);
        assert!(orchestrator.records().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_sorted_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);
        for id in ["c", "a", "b"] {
            orchestrator.request(DownloadRequest::new(id, id, id)).await;
        }
        let ids: Vec<String> = orchestrator.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_listener_sees_lifecycle_and_can_unsubscribe() {
        let temp_dir = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp_dir.path(), false);
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        let listener = orchestrator.subscribe(move |event: &DownloadEvent| {
            sink.lock().unwrap().push(event.kind);
        });

        orchestrator
            .request(DownloadRequest::new("v1", "ref-1", "Clip"))
            .await;
        orchestrator.reset("v1").unwrap();
        assert!(orchestrator.unsubscribe(listener));
        orchestrator.reset("v1").unwrap();

        assert_eq!(
            *kinds.lock().unwrap(),
            vec![
                DownloadEventKind::Started,
                DownloadEventKind::Progress,
                DownloadEventKind::Completed,
                DownloadEventKind::Reset,
            ]
        );
    }
}
