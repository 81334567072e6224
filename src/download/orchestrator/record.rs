use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::download::ErrorCategory;

/// Identifies one video to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Stable unique key; at most one pipeline runs per id.
    pub id: String,
    /// Opaque locator handed to the extraction client.
    pub source_reference: String,
    /// Human-readable name the output filename is derived from.
    pub display_name: String,
}

impl DownloadRequest {
    /// Creates a request.
    pub fn new(
        id: impl Into<String>,
        source_reference: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_reference: source_reference.into(),
            display_name: display_name.into(),
        }
    }
}

/// Lifecycle state of a tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadState {
    /// Accepted (or reset) but not holding a slot.
    Idle,
    /// Holding a slot and running the pipeline.
    Downloading,
    /// File written and verified.
    Completed,
    /// A stage failed after retries were exhausted.
    Failed,
}

impl DownloadState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the orchestrator's bookkeeping for one id.
///
/// Records are only ever mutated by the orchestrator; callers receive clones.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    /// Request id.
    pub id: String,
    /// Current state.
    pub state: DownloadState,
    /// Bytes received so far.
    pub bytes_downloaded: u64,
    /// Expected size; 0 until known.
    pub bytes_total: u64,
    /// Percentage in `0.0..=100.0`; never decreases while downloading.
    pub progress_percent: f64,
    /// Final file path, set only when completed.
    pub result_path: Option<PathBuf>,
    /// Human-readable failure, set only when failed.
    pub failure_reason: Option<String>,
    /// Failure classification, set only when failed.
    pub error_category: Option<ErrorCategory>,
    /// When the record last entered `Downloading`.
    pub started_at: Option<SystemTime>,
    /// When the record last reached a terminal state.
    pub ended_at: Option<SystemTime>,
}

impl DownloadRecord {
    pub(super) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: DownloadState::Idle,
            bytes_downloaded: 0,
            bytes_total: 0,
            progress_percent: 0.0,
            result_path: None,
            failure_reason: None,
            error_category: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub(super) fn begin(&mut self) {
        self.clear_fields();
        self.state = DownloadState::Downloading;
        self.started_at = Some(SystemTime::now());
    }

    /// Applies a progress report; returns whether anything observable changed.
    ///
    /// Reports are ignored outside `Downloading` and when they go backwards
    /// (a transfer restarted by a retry), so byte counts and percentage only
    /// ever grow.
    pub(super) fn apply_progress(&mut self, downloaded: u64, total: u64) -> bool {
        if self.state != DownloadState::Downloading || downloaded < self.bytes_downloaded {
            return false;
        }

        let before = (self.bytes_downloaded, self.bytes_total, self.progress_percent);
        self.bytes_downloaded = downloaded;
        if total > 0 {
            self.bytes_total = total;
        }
        if self.bytes_total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let percent = (downloaded as f64 / self.bytes_total as f64 * 100.0).min(100.0);
            self.progress_percent = self.progress_percent.max(percent);
        }

        before != (self.bytes_downloaded, self.bytes_total, self.progress_percent)
    }

    pub(super) fn complete(&mut self, path: PathBuf, bytes: u64) {
        self.state = DownloadState::Completed;
        self.bytes_downloaded = bytes;
        self.bytes_total = bytes;
        self.progress_percent = 100.0;
        self.result_path = Some(path);
        self.failure_reason = None;
        self.error_category = None;
        self.ended_at = Some(SystemTime::now());
    }

    pub(super) fn fail(&mut self, reason: String, category: ErrorCategory) {
        self.state = DownloadState::Failed;
        self.result_path = None;
        self.failure_reason = Some(reason);
        self.error_category = Some(category);
        self.ended_at = Some(SystemTime::now());
    }

    pub(super) fn reset(&mut self) {
        self.clear_fields();
        self.state = DownloadState::Idle;
    }

    fn clear_fields(&mut self) {
        self.bytes_downloaded = 0;
        self.bytes_total = 0;
        self.progress_percent = 0.0;
        self.result_path = None;
        self.failure_reason = None;
        self.error_category = None;
        self.started_at = None;
        self.ended_at = None;
    }

    /// Returns the settled outcome for terminal records.
    #[must_use]
    pub fn outcome(&self) -> Option<DownloadOutcome> {
        match self.state {
            DownloadState::Completed => Some(DownloadOutcome {
                id: self.id.clone(),
                success: true,
                path: self.result_path.clone(),
                error: None,
            }),
            DownloadState::Failed => Some(DownloadOutcome {
                id: self.id.clone(),
                success: false,
                path: None,
                error: self.failure_reason.clone(),
            }),
            DownloadState::Idle | DownloadState::Downloading => None,
        }
    }
}

/// Final result handed to every caller attached to a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Request id.
    pub id: String,
    /// Whether the file was written and verified.
    pub success: bool,
    /// Final path on success.
    pub path: Option<PathBuf>,
    /// Failure reason otherwise.
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub(super) fn succeeded(id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            success: true,
            path: Some(path),
            error: None,
        }
    }

    pub(super) fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            path: None,
            error: Some(reason.into()),
        }
    }
}
