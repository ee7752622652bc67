//! Mock host probe for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::host::{HostError, HostProbe, HostSample};

/// Mock implementation of the [`HostProbe`] trait.
///
/// Returns a configurable sample; defaults to an idle machine with an empty
/// cache and 1 TiB free.
#[derive(Debug, Clone)]
pub struct MockHostProbe {
    sample: Arc<RwLock<HostSample>>,
    fail: Arc<RwLock<bool>>,
    samples_taken: Arc<RwLock<usize>>,
}

impl Default for MockHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHostProbe {
    pub fn new() -> Self {
        let mut sample = HostSample::default();
        sample.storage.disk_total_bytes = 1 << 40;
        sample.storage.disk_free_bytes = 1 << 40;
        Self {
            sample: Arc::new(RwLock::new(sample)),
            fail: Arc::new(RwLock::new(false)),
            samples_taken: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn set_sample(&self, sample: HostSample) {
        *self.sample.write().await = sample;
    }

    pub async fn set_cache_size(&self, bytes: u64) {
        self.sample.write().await.storage.cache_size_bytes = bytes;
    }

    pub async fn set_free_space(&self, bytes: u64) {
        let mut sample = self.sample.write().await;
        sample.storage.disk_free_bytes = bytes;
        sample.storage.disk_used_bytes = sample.storage.disk_total_bytes.saturating_sub(bytes);
    }

    pub async fn set_veto(&self, active: bool) {
        self.sample.write().await.veto.active = active;
    }

    /// Make `sample` fail.
    pub async fn fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn samples_taken(&self) -> usize {
        *self.samples_taken.read().await
    }
}

#[async_trait]
impl HostProbe for MockHostProbe {
    async fn sample(&self) -> Result<HostSample, HostError> {
        if *self.fail.read().await {
            return Err(HostError::Probe("mock probe failure".to_string()));
        }
        *self.samples_taken.write().await += 1;
        Ok(*self.sample.read().await)
    }
}
