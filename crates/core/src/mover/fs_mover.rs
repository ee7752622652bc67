//! Filesystem-based mover implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::error::MoverError;
use super::traits::FileMover;

/// Renames where possible and copies across filesystems.
#[derive(Debug, Clone, Default)]
pub struct FsMover;

impl FsMover {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to move a file atomically (rename).
    ///
    /// Returns `Ok(false)` when source and destination are on different
    /// filesystems.
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // EXDEV is 18 on Linux
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Copies next to the destination, then renames over it so the library
    /// never sees a half-written file.
    async fn copy_then_replace(source: &Path, destination: &Path) -> Result<u64, MoverError> {
        let staging = staging_path(destination);
        let bytes = fs::copy(source, &staging).await.map_err(|e| {
            MoverError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        if let Err(e) = fs::rename(&staging, destination).await {
            let _ = fs::remove_file(&staging).await;
            return Err(MoverError::move_failed(
                staging,
                destination.to_path_buf(),
                e,
            ));
        }

        fs::remove_file(source)
            .await
            .map_err(|e| MoverError::remove_failed(source.to_path_buf(), e))?;
        Ok(bytes)
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".grinder-partial");
    destination.with_file_name(name)
}

#[async_trait]
impl FileMover for FsMover {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn move_file(&self, source: &Path, destination: &Path) -> Result<u64, MoverError> {
        let meta = fs::metadata(source).await.map_err(|_| MoverError::SourceNotFound {
            path: source.to_path_buf(),
        })?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MoverError::DirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let moved = Self::try_atomic_move(source, destination)
            .await
            .map_err(|e| {
                MoverError::move_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;

        if moved {
            debug!(source = %source.display(), destination = %destination.display(), "Renamed file");
            Ok(meta.len())
        } else {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "Cross-device move, copying"
            );
            Self::copy_then_replace(source, destination).await
        }
    }

    async fn remove_file(&self, path: &Path) -> Result<(), MoverError> {
        fs::remove_file(path)
            .await
            .map_err(|e| MoverError::remove_failed(path.to_path_buf(), e))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), MoverError> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| MoverError::remove_failed(path.to_path_buf(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("cache/1/out.mkv");
        let dest = temp.path().join("library/Movie (2001)/out.mkv");
        fs::create_dir_all(source.parent().unwrap()).await.unwrap();
        fs::write(&source, "encoded").await.unwrap();

        let moved = FsMover::new().move_file(&source, &dest).await.unwrap();

        assert_eq!(moved, 7);
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "encoded");
    }

    #[tokio::test]
    async fn test_move_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("new.mkv");
        let dest = temp.path().join("old.mkv");
        fs::write(&source, "new").await.unwrap();
        fs::write(&dest, "old contents").await.unwrap();

        FsMover::new().move_file(&source, &dest).await.unwrap();
        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_copy_then_replace() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.mkv");
        let dest = temp.path().join("b.mkv");
        fs::write(&source, "payload").await.unwrap();

        let bytes = FsMover::copy_then_replace(&source, &dest).await.unwrap();
        assert_eq!(bytes, 7);
        assert!(!source.exists());
        assert!(!staging_path(&dest).exists());
        assert_eq!(fs::read_to_string(&dest).await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_move_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = FsMover::new()
            .move_file(&temp.path().join("nope"), &temp.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, MoverError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("orphan");
        fs::create_dir_all(dir.join("nested")).await.unwrap();
        fs::write(dir.join("nested/x"), "x").await.unwrap();
        let file = temp.path().join("old.avi");
        fs::write(&file, "x").await.unwrap();

        let mover = FsMover::new();
        mover.remove_dir_all(&dir).await.unwrap();
        mover.remove_file(&file).await.unwrap();
        assert!(!dir.exists());
        assert!(!file.exists());
        assert!(mover.remove_file(&file).await.is_err());
    }
}
