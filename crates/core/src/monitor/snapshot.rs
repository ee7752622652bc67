//! Metrics snapshot produced by each monitor poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::MetricKey;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SysMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// One-minute load average.
    pub load_avg: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryMetrics {
    pub playing_sessions: u32,
    pub transcode_sessions: u32,
    /// Weighted means over the service's recent resource samples.
    pub host_cpu: f64,
    pub host_memory: f64,
    pub process_cpu: f64,
    pub process_memory: f64,
    /// Items in the last listing.
    pub items: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    /// Succeeded items not yet organized.
    pub pending_organize: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageMetrics {
    /// Bytes currently held in the transcode cache.
    pub cache_size_bytes: u64,
    pub disk_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_free_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub load_percent: f64,
    pub memory_percent: f64,
    pub temperature_c: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VetoMetrics {
    /// An operator asked the pipeline to hold off.
    pub active: bool,
}

/// Everything the admission rules can look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sys: SysMetrics,
    pub library: LibraryMetrics,
    pub storage: StorageMetrics,
    pub gpu: GpuMetrics,
    pub veto: VetoMetrics,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Reads one value as a float; booleans map to `0.0` / `1.0`.
    pub fn value(&self, key: MetricKey) -> f64 {
        match key {
            MetricKey::SysCpu => self.sys.cpu_percent,
            MetricKey::SysMemory => self.sys.memory_percent,
            MetricKey::SysLoadAvg => self.sys.load_avg,
            MetricKey::LibraryPlayingSessions => f64::from(self.library.playing_sessions),
            MetricKey::LibraryTranscodeSessions => f64::from(self.library.transcode_sessions),
            MetricKey::LibraryHostCpu => self.library.host_cpu,
            MetricKey::LibraryHostMemory => self.library.host_memory,
            MetricKey::LibraryProcessCpu => self.library.process_cpu,
            MetricKey::LibraryProcessMemory => self.library.process_memory,
            MetricKey::LibraryItems => self.library.items as f64,
            MetricKey::LibraryInFlight => self.library.in_flight as f64,
            MetricKey::LibrarySucceeded => self.library.succeeded as f64,
            MetricKey::LibraryPendingOrganize => self.library.pending_organize as f64,
            MetricKey::LibraryFailed => self.library.failed as f64,
            MetricKey::StorageCacheSize => self.storage.cache_size_bytes as f64,
            MetricKey::StorageDiskTotal => self.storage.disk_total_bytes as f64,
            MetricKey::StorageDiskUsed => self.storage.disk_used_bytes as f64,
            MetricKey::StorageDiskFree => self.storage.disk_free_bytes as f64,
            MetricKey::GpuLoad => self.gpu.load_percent,
            MetricKey::GpuMemory => self.gpu.memory_percent,
            MetricKey::GpuTemperature => self.gpu.temperature_c,
            MetricKey::VetoActive => {
                if self.veto.active {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
