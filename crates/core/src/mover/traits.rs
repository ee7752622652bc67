//! Trait definitions for the mover module.

use async_trait::async_trait;
use std::path::Path;

use super::error::MoverError;

/// Filesystem mutations performed by the organizer.
#[async_trait]
pub trait FileMover: Send + Sync {
    /// Returns the name of this mover implementation.
    fn name(&self) -> &str;

    /// Moves `source` to `destination`, replacing any existing file.
    ///
    /// Returns the number of bytes moved.
    async fn move_file(&self, source: &Path, destination: &Path) -> Result<u64, MoverError>;

    async fn remove_file(&self, path: &Path) -> Result<(), MoverError>;

    async fn remove_dir_all(&self, path: &Path) -> Result<(), MoverError>;
}
