//! Host probing: CPU, memory, disk, GPU and the operator veto.

mod local;

use async_trait::async_trait;
use thiserror::Error;

use crate::monitor::{GpuMetrics, StorageMetrics, SysMetrics, VetoMetrics};

pub use local::{parse_nvidia_smi, LocalHostProbe};

/// Errors from host probing.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPU query failed: {0}")]
    Gpu(String),

    #[error("host probe failed: {0}")]
    Probe(String),
}

/// Host-side part of a metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostSample {
    pub sys: SysMetrics,
    pub storage: StorageMetrics,
    pub gpu: GpuMetrics,
    pub veto: VetoMetrics,
}

/// Samples the machine the pipeline runs on.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn sample(&self) -> Result<HostSample, HostError>;
}
