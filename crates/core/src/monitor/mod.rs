//! Collector worker: metrics, candidates and per-item lifecycle.

mod collector;
mod history;
mod snapshot;

use thiserror::Error;

use crate::host::HostError;
use crate::library::LibraryError;

pub use collector::{Monitor, MonitorSettings, MonitorState};
pub use history::{HistoryCounts, LifecycleState, WorkHistory};
pub use snapshot::{
    GpuMetrics, LibraryMetrics, MetricsSnapshot, StorageMetrics, SysMetrics, VetoMetrics,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("library error: {0}")]
    Library(#[from] LibraryError),

    #[error("host probe error: {0}")]
    Host(#[from] HostError),

    #[error("poll task panicked: {0}")]
    TaskPanicked(String),
}
