//! Verified writes of transferred bytes to their final path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{DownloadError, Storage};

/// Suffix of the temporary file written before the final rename.
const PARTIAL_SUFFIX: &str = ".part";

/// Writes byte buffers to disk and verifies them before exposing the final path.
///
/// Bytes go to a sibling `<name>.part` file first; its size is read back and
/// compared with the input length, and only a verified file is renamed into
/// place. Any failure removes the temporary file, so a failed write leaves
/// nothing behind.
#[derive(Clone)]
pub struct PersistenceWriter {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter").finish_non_exhaustive()
    }
}

impl PersistenceWriter {
    /// Creates a writer over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Writes `bytes` to `path` and returns the path once verified.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] on any filesystem failure and
    /// [`DownloadError::Integrity`] when the written size differs from
    /// `bytes.len()`.
    #[instrument(skip(self, bytes), fields(path = %path.display(), bytes = bytes.len()))]
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        let partial = partial_path(path);
        let result = self.write_verified(&partial, path, bytes).await;
        if result.is_err() {
            debug!(path = %partial.display(), "cleaning up partial file after error");
            self.discard(&partial).await;
        }
        result
    }

    async fn write_verified(
        &self,
        partial: &Path,
        path: &Path,
        bytes: &[u8],
    ) -> Result<PathBuf, DownloadError> {
        let expected = bytes.len() as u64;

        self.storage
            .write_file(partial, bytes)
            .await
            .map_err(|e| DownloadError::io(partial, e))?;

        let written = self
            .storage
            .file_len(partial)
            .await
            .map_err(|e| DownloadError::io(partial, e))?;
        if written != expected {
            return Err(DownloadError::integrity(path, expected, written));
        }

        self.storage
            .rename(partial, path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        debug!(bytes = expected, "write verified");
        Ok(path.to_path_buf())
    }

    async fn discard(&self, partial: &Path) {
        if !self.storage.path_exists(partial).await {
            return;
        }
        if let Err(error) = self.storage.remove_file(partial).await {
            warn!(path = %partial.display(), error = %error, "failed to remove partial file");
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}
