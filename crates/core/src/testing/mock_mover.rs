//! Fault-injecting file mover for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::mover::{FileMover, FsMover, MoverError};

/// Real filesystem moves through [`FsMover`], with switchable failures.
///
/// Every successful move is recorded as `(source, destination)`. Failure
/// thresholds count successful calls: `fail_move_after(1)` lets the first
/// move through and fails every later one.
#[derive(Debug, Clone, Default)]
pub struct MockMover {
    inner: FsMover,
    moves: Arc<RwLock<Vec<(PathBuf, PathBuf)>>>,
    removed: Arc<RwLock<Vec<PathBuf>>>,
    files_removed: Arc<RwLock<usize>>,
    fail_move_after: Arc<RwLock<Option<usize>>>,
    fail_remove_file_after: Arc<RwLock<Option<usize>>>,
    delay: Arc<RwLock<Duration>>,
}

impl MockMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_move(&self, fail: bool) {
        *self.fail_move_after.write().await = fail.then_some(0);
    }

    pub async fn fail_move_after(&self, successes: usize) {
        *self.fail_move_after.write().await = Some(successes);
    }

    /// Make `remove_file` fail; directory removal keeps working.
    pub async fn fail_remove_file(&self, fail: bool) {
        *self.fail_remove_file_after.write().await = fail.then_some(0);
    }

    pub async fn fail_remove_file_after(&self, successes: usize) {
        *self.fail_remove_file_after.write().await = Some(successes);
    }

    /// Sleep before every move.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    pub async fn moves(&self) -> Vec<(PathBuf, PathBuf)> {
        self.moves.read().await.clone()
    }

    /// Files and directories removed, in call order.
    pub async fn removed(&self) -> Vec<PathBuf> {
        self.removed.read().await.clone()
    }
}

fn injected() -> std::io::Error {
    std::io::Error::other("injected failure")
}

#[async_trait]
impl FileMover for MockMover {
    fn name(&self) -> &str {
        "mock"
    }

    async fn move_file(&self, source: &Path, destination: &Path) -> Result<u64, MoverError> {
        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let done = self.moves.read().await.len();
        if self.fail_move_after.read().await.is_some_and(|n| done >= n) {
            return Err(MoverError::move_failed(
                source.to_path_buf(),
                destination.to_path_buf(),
                injected(),
            ));
        }
        let bytes = self.inner.move_file(source, destination).await?;
        self.moves
            .write()
            .await
            .push((source.to_path_buf(), destination.to_path_buf()));
        Ok(bytes)
    }

    async fn remove_file(&self, path: &Path) -> Result<(), MoverError> {
        let done = *self.files_removed.read().await;
        if self.fail_remove_file_after.read().await.is_some_and(|n| done >= n) {
            return Err(MoverError::remove_failed(path.to_path_buf(), injected()));
        }
        self.inner.remove_file(path).await?;
        *self.files_removed.write().await += 1;
        self.removed.write().await.push(path.to_path_buf());
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), MoverError> {
        self.inner.remove_dir_all(path).await?;
        self.removed.write().await.push(path.to_path_buf());
        Ok(())
    }
}
