//! Filesystem platform services used by naming and persistence.
//!
//! The [`Storage`] trait lets the same pipeline run against the local disk or
//! any mediated filesystem; [`LocalStorage`] is the direct implementation.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

/// Name of the folder created under the platform download directory.
const APP_DIR_NAME: &str = "vidgrab";

/// Filesystem operations the download pipeline needs.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns whether anything exists at `path`.
    async fn path_exists(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Writes `bytes` to `path`, replacing any existing file.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Returns the on-disk length of the file at `path`.
    async fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Renames `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes the file at `path`.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Returns the free bytes available to this process on the filesystem holding `path`.
    async fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// Direct access to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    /// Creates the local storage backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }

    async fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn available_space(&self, path: &Path) -> io::Result<u64> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || fs2::available_space(&path))
            .await
            .map_err(io::Error::other)?
    }
}

/// Resolves the default output directory.
///
/// Priority:
/// 1. `<platform download dir>/vidgrab`
/// 2. `<home>/Downloads/vidgrab`
/// 3. `./vidgrab`
#[must_use]
pub fn resolve_default_directory() -> PathBuf {
    let base = dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."));
    let resolved = base.join(APP_DIR_NAME);
    debug!(path = %resolved.display(), "resolved default output directory");
    resolved
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_local_storage_write_and_len() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new();
        let path = temp_dir.path().join("clip.mp4");

        assert!(!storage.path_exists(&path).await);
        storage.write_file(&path, b"0123456789").await.unwrap();
        assert!(storage.path_exists(&path).await);
        assert_eq!(storage.file_len(&path).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_local_storage_rename_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new();
        let from = temp_dir.path().join("a.part");
        let to = temp_dir.path().join("a.mp4");

        storage.write_file(&from, b"abc").await.unwrap();
        storage.rename(&from, &to).await.unwrap();
        assert!(!storage.path_exists(&from).await);
        assert!(storage.path_exists(&to).await);

        storage.remove_file(&to).await.unwrap();
        assert!(!storage.path_exists(&to).await);
    }

    #[tokio::test]
    async fn test_local_storage_create_dir_all_nested() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new();
        let nested = temp_dir.path().join("a").join("b");
        storage.create_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_local_storage_available_space_reports_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let space = LocalStorage::new()
            .available_space(temp_dir.path())
            .await
            .unwrap();
        assert!(space > 0);
    }

    #[tokio::test]
    async fn test_local_storage_file_len_missing_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalStorage::new()
            .file_len(&temp_dir.path().join("missing.mp4"))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_default_directory_ends_with_app_dir() {
        assert!(resolve_default_directory().ends_with(APP_DIR_NAME));
    }
}
