//! Host probe backed by sysinfo, walkdir and nvidia-smi.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::{Disks, System};
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::HostConfig;
use crate::monitor::{GpuMetrics, StorageMetrics, SysMetrics, VetoMetrics};

use super::{HostError, HostProbe, HostSample};

/// Probe for the local machine.
///
/// The `System` is kept between samples so CPU usage is measured over the
/// interval since the previous poll.
pub struct LocalHostProbe {
    system: Arc<Mutex<System>>,
    cache_dir: PathBuf,
    disk_path: PathBuf,
    nvidia_smi: Option<String>,
    veto_file: Option<PathBuf>,
}

impl LocalHostProbe {
    pub fn new(cache_dir: PathBuf, config: &HostConfig) -> Self {
        let disk_path = config.disk_path.clone().unwrap_or_else(|| cache_dir.clone());
        Self {
            system: Arc::new(Mutex::new(System::new())),
            cache_dir,
            disk_path,
            nvidia_smi: config.nvidia_smi.clone(),
            veto_file: config.veto_file.clone(),
        }
    }

    async fn gpu(&self) -> Result<GpuMetrics, HostError> {
        let Some(binary) = &self.nvidia_smi else {
            return Ok(GpuMetrics::default());
        };
        let output = Command::new(binary)
            .args([
                "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .await
            .map_err(|e| HostError::Gpu(format!("{}: {}", binary, e)))?;
        if !output.status.success() {
            return Err(HostError::Gpu(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl HostProbe for LocalHostProbe {
    async fn sample(&self) -> Result<HostSample, HostError> {
        let system = Arc::clone(&self.system);
        let cache_dir = self.cache_dir.clone();
        let disk_path = self.disk_path.clone();

        let (sys, storage) = tokio::task::spawn_blocking(move || {
            let sys = {
                let mut system = system
                    .lock()
                    .map_err(|_| HostError::Probe("system lock poisoned".to_string()))?;
                sample_sys(&mut system)
            };
            let mut storage = sample_disk(&disk_path);
            storage.cache_size_bytes = dir_size(&cache_dir);
            Ok::<_, HostError>((sys, storage))
        })
        .await
        .map_err(|e| HostError::Probe(e.to_string()))??;

        let gpu = self.gpu().await?;
        let veto = VetoMetrics {
            active: self.veto_file.as_deref().is_some_and(Path::exists),
        };

        debug!(
            cpu = sys.cpu_percent,
            cache = storage.cache_size_bytes,
            free = storage.disk_free_bytes,
            veto = veto.active,
            "Sampled host"
        );
        Ok(HostSample {
            sys,
            storage,
            gpu,
            veto,
        })
    }
}

fn sample_sys(system: &mut System) -> SysMetrics {
    system.refresh_cpu_usage();
    system.refresh_memory();

    let total = system.total_memory();
    let memory_percent = if total > 0 {
        system.used_memory() as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    SysMetrics {
        cpu_percent: f64::from(system.global_cpu_usage()),
        memory_percent,
        load_avg: System::load_average().one,
    }
}

/// Capacity of the disk holding `path` (longest mount-point prefix).
fn sample_disk(path: &Path) -> StorageMetrics {
    let disks = Disks::new_with_refreshed_list();
    let best = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match best {
        Some(disk) => {
            let total = disk.total_space();
            let free = disk.available_space();
            StorageMetrics {
                cache_size_bytes: 0,
                disk_total_bytes: total,
                disk_used_bytes: total.saturating_sub(free),
                disk_free_bytes: free,
            }
        }
        None => StorageMetrics::default(),
    }
}

fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Parses `nvidia-smi --format=csv,noheader,nounits` output for
/// `utilization.gpu,memory.used,memory.total,temperature.gpu`.
///
/// With several GPUs the busiest one is reported.
pub fn parse_nvidia_smi(output: &str) -> Result<GpuMetrics, HostError> {
    let mut best: Option<GpuMetrics> = None;
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<f64> = line
            .split(',')
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| HostError::Gpu(format!("bad nvidia-smi line '{}': {}", line, e)))?;
        let &[load, used, total, temperature] = fields.as_slice() else {
            return Err(HostError::Gpu(format!("expected 4 fields in '{}'", line)));
        };
        let gpu = GpuMetrics {
            load_percent: load,
            memory_percent: if total > 0.0 { used / total * 100.0 } else { 0.0 },
            temperature_c: temperature,
        };
        if best.map_or(true, |b| gpu.load_percent > b.load_percent) {
            best = Some(gpu);
        }
    }
    best.ok_or_else(|| HostError::Gpu("no GPU reported".to_string()))
}
