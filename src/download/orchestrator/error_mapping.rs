use crate::download::{DownloadError, ErrorCategory};

pub(super) fn classify_error(error: &DownloadError) -> ErrorCategory {
    match error {
        DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::IncompleteTransfer { .. } => ErrorCategory::Network,
        DownloadError::HttpStatus { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::MalformedResponse { .. }
        | DownloadError::Api { .. }
        | DownloadError::NoCandidates { .. } => ErrorCategory::Upstream,
        DownloadError::InsufficientSpace { .. }
        | DownloadError::Io { .. }
        | DownloadError::Integrity { .. } => ErrorCategory::Filesystem,
        DownloadError::Internal { .. } => ErrorCategory::Unknown,
    }
}

pub(super) fn failure_reason(error: &DownloadError, category: ErrorCategory) -> String {
    format!("[{category}] {error}")
}
