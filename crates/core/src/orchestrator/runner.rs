//! The orchestrator loop.
//!
//! A single owner drives every worker through the phase cycle
//! `Idle → SelfCheck → Queue → Organize → Idle`. Workers run their jobs as
//! background tasks; the orchestrator looks at the task handles each step and
//! folds finished results back into the monitor's history.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle, TranscodeDisposition};
use crate::config::{AdmissionConfig, Config};
use crate::converter::{Converter, ConverterError};
use crate::database::LibraryDatabase;
use crate::host::HostProbe;
use crate::library::{LibraryConnector, PathMapper};
use crate::metrics;
use crate::monitor::{Monitor, MonitorError, MonitorSettings};
use crate::mover::FileMover;
use crate::notify::{Notification, Notifier};
use crate::organizer::{
    FatalHandler, OrganizeError, OrganizeReport, Organizer, OrganizerDeps,
};
use crate::service::ServiceControl;
use crate::transcoder::{TranscodeOutcome, Transcoder};

use super::config::OrchestratorConfig;
use super::pool::WorkerPool;
use super::types::{
    MonitorStatus, OrchestratorStatus, OrganizerStatus, Phase, TranscoderStatus,
};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// External collaborators, built once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn LibraryConnector>,
    pub host: Arc<dyn HostProbe>,
    pub converter: Arc<dyn Converter>,
    pub mover: Arc<dyn FileMover>,
    pub database: Arc<dyn LibraryDatabase>,
    pub service: Arc<dyn ServiceControl>,
    pub fatal: Arc<dyn FatalHandler>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Option<AuditHandle>,
}

/// Drives the pipeline. Owns every worker pool.
pub struct Orchestrator {
    config: OrchestratorConfig,
    pool_size: usize,
    readonly: bool,
    cache_dir: PathBuf,
    monitor_settings: MonitorSettings,
    admission: Arc<AdmissionConfig>,
    mapper: Arc<PathMapper>,
    collaborators: Collaborators,
    organizer_deps: Arc<OrganizerDeps>,

    phase: Phase,
    iterations: u64,
    monitors: WorkerPool<Monitor, MonitorError>,
    transcoders: WorkerPool<Transcoder, ConverterError>,
    organizers: WorkerPool<Organizer, OrganizeError>,
    status_tx: watch::Sender<OrchestratorStatus>,
}

impl Orchestrator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let mapper = Arc::new(PathMapper::new(config.path_mappings.clone()));
        let admission = Arc::new(config.admission.clone());

        let organizer_deps = Arc::new(OrganizerDeps {
            cache_dir: config.transcoder.cache_dir.clone(),
            mapper: Arc::clone(&mapper),
            mover: Arc::clone(&collaborators.mover),
            database: Arc::clone(&collaborators.database),
            service: Arc::clone(&collaborators.service),
            connector: Arc::clone(&collaborators.connector),
            fatal: Arc::clone(&collaborators.fatal),
            notifier: Arc::clone(&collaborators.notifier),
            audit: collaborators.audit.clone(),
            rescan_windows: config.admission.rescan_windows.clone(),
            readonly: config.readonly,
        });

        let (status_tx, _) = watch::channel(OrchestratorStatus {
            readonly: config.readonly,
            ..Default::default()
        });

        Self {
            config: config.orchestrator.clone(),
            pool_size: config.pools.transcoders,
            readonly: config.readonly,
            cache_dir: config.transcoder.cache_dir.clone(),
            monitor_settings: MonitorSettings::from(&config.library),
            admission,
            mapper,
            collaborators,
            organizer_deps,
            phase: Phase::Idle,
            iterations: 0,
            monitors: WorkerPool::new("monitor"),
            transcoders: WorkerPool::new("transcoder"),
            organizers: WorkerPool::new("organizer"),
            status_tx,
        }
    }

    /// Receives a fresh [`OrchestratorStatus`] after every step.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorStatus> {
        self.status_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn monitor(&self) -> Option<&Monitor> {
        self.monitors.iter().next()
    }

    pub fn transcoders(&self) -> impl Iterator<Item = &Transcoder> {
        self.transcoders.iter()
    }

    pub fn organizer(&self) -> Option<&Organizer> {
        self.organizers.iter().next()
    }

    /// Runs until a shutdown signal arrives, sleeping between steps.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            transcoders = self.pool_size,
            interval_ms = self.config.loop_interval_ms,
            readonly = self.readonly,
            "Orchestrator started"
        );
        let interval = Duration::from_millis(self.config.loop_interval_ms);

        loop {
            self.step().await;
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Orchestrator received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        // A commit holds the library service stopped; let it finish.
        if self.organizers.iter().any(|o| o.is_organizing()) {
            info!("Waiting for the organizer to finish before stopping");
            while self.organizers.iter().any(|o| o.is_organizing()) {
                tokio::time::sleep(DRAIN_POLL).await;
                self.reap_organizers().await;
            }
            self.publish();
        }

        let busy = self.transcoders.iter().filter(|t| !t.is_idle()).count();
        if busy > 0 {
            warn!(busy_transcoders = busy, "Stopping with transcodes in progress");
        }
        info!("Orchestrator stopped");
    }

    /// Executes the current phase once and moves to the next one.
    pub async fn step(&mut self) -> Phase {
        let next = match self.phase {
            Phase::Idle => self.idle().await,
            Phase::SelfCheck => self.self_check().await,
            Phase::Queue => self.queue().await,
            Phase::Organize => self.organize().await,
        };

        if next != self.phase {
            debug!(from = %self.phase, to = %next, "Phase transition");
        }
        metrics::PHASE_TRANSITIONS
            .with_label_values(&[next.as_str()])
            .inc();
        self.phase = next;
        self.iterations += 1;
        self.publish();
        next
    }

    async fn idle(&mut self) -> Phase {
        self.reap_organizers().await;
        self.reap_polls().await;

        if self.organizers.iter().any(|o| o.is_organizing()) {
            for monitor in self.monitors.iter_mut() {
                monitor.sleep();
            }
        } else {
            for monitor in self.monitors.iter_mut() {
                monitor.wakeup();
            }
            if let Some(monitor) = self.monitors.iter_mut().find(|m| !m.is_polling()) {
                monitor.poll();
            }
        }

        Phase::SelfCheck
    }

    async fn self_check(&mut self) -> Phase {
        self.monitors.reap_add().await;
        self.transcoders.reap_add().await;
        self.organizers.reap_add().await;

        self.monitors.prune(|m| m.is_zombie());
        self.organizers.prune(|o| o.is_zombie());

        if self.monitors.is_empty() && !self.monitors.is_adding() {
            let connector = Arc::clone(&self.collaborators.connector);
            let host = Arc::clone(&self.collaborators.host);
            let settings = self.monitor_settings.clone();
            let admission = Arc::clone(&self.admission);
            self.monitors.add(move |id| async move {
                Monitor::connect(id, connector, host, settings, admission).await
            });
        }

        if self.transcoders.len() < self.pool_size && !self.transcoders.is_adding() {
            let converter = Arc::clone(&self.collaborators.converter);
            let mapper = Arc::clone(&self.mapper);
            let cache_dir = self.cache_dir.clone();
            let readonly = self.readonly;
            self.transcoders.add(move |id| async move {
                Transcoder::create(id, converter, mapper, cache_dir, readonly).await
            });
        }

        if self.organizers.is_empty() && !self.organizers.is_adding() {
            let deps = Arc::clone(&self.organizer_deps);
            self.organizers
                .add(move |id| async move { Organizer::create(id, deps).await });
        }

        Phase::Queue
    }

    async fn queue(&mut self) -> Phase {
        self.reap_polls().await;
        self.reconcile().await;

        if self.organizers.iter().any(|o| o.is_organizing()) {
            debug!("Organizer busy, not dispatching");
            return Phase::Idle;
        }

        let Some(monitor) = self.monitors.first_mut() else {
            return Phase::Idle;
        };
        if !monitor.is_ready() {
            return Phase::Idle;
        }

        // A replacement monitor rediscovers items a transcoder still holds.
        let item = loop {
            let Some(item) = monitor.next_candidate() else {
                debug!("No candidate left");
                return Phase::Organize;
            };
            let holder = self
                .transcoders
                .iter()
                .find(|t| t.is_transcoding(&item.rating_key));
            match holder {
                Some(transcoder) if monitor.mark_in_flight(&item) => info!(
                    rating_key = %item.rating_key,
                    transcoder = transcoder.id(),
                    "Adopted transcode already in progress"
                ),
                Some(_) => return Phase::Idle,
                None => break item,
            }
        };

        let mut dispatched = None;
        if monitor.admit_transcode() {
            let idle = self.transcoders.iter_mut().find(|t| t.is_idle());
            if let Some(transcoder) = idle {
                if monitor.mark_in_flight(&item) {
                    dispatched = Some(AuditEvent::TranscodeDispatched {
                        rating_key: item.rating_key.clone(),
                        title: item.title.clone(),
                        transcoder: transcoder.id(),
                    });
                    transcoder.process(item);
                    metrics::TRANSCODES_DISPATCHED.inc();
                }
            } else {
                debug!("No idle transcoder");
            }
        }

        let saturated = monitor.capacity_saturated();
        if let Some(event) = dispatched {
            self.emit(event).await;
        }
        if saturated {
            debug!("Cache capacity saturated");
            Phase::Organize
        } else {
            Phase::Idle
        }
    }

    async fn organize(&mut self) -> Phase {
        self.reap_polls().await;

        if self.transcoders.iter().any(|t| !t.is_idle()) {
            debug!("Transcoders busy, postponing organize");
            return Phase::Idle;
        }
        if self.monitors.iter().any(|m| m.is_polling()) {
            debug!("Monitor poll in flight, postponing organize");
            return Phase::Idle;
        }

        let Some(monitor) = self.monitors.first_mut() else {
            return Phase::Idle;
        };
        if !monitor.admit_organize() {
            return Phase::Idle;
        }
        let items = monitor.pending_organize();

        let Some(organizer) = self.organizers.iter_mut().find(|o| o.is_ready()) else {
            debug!("No organizer ready");
            return Phase::Idle;
        };
        let organizer_id = organizer.id();
        let count = items.len();
        organizer.organize(items);

        for monitor in self.monitors.iter_mut() {
            monitor.sleep();
        }
        info!(organizer = organizer_id, items = count, "Organize dispatched");
        self.collaborators
            .notifier
            .notify(&Notification::OrganizeStarted { items: count })
            .await;
        self.emit(AuditEvent::OrganizeStarted {
            organizer: organizer_id,
            items: count,
        })
        .await;

        Phase::Idle
    }

    /// Applies finished monitor polls.
    async fn reap_polls(&mut self) {
        let mut zombies = Vec::new();
        for monitor in self.monitors.iter_mut() {
            if monitor.reap().await && monitor.is_zombie() {
                zombies.push(monitor.id());
            }
        }
        for id in zombies {
            self.zombified("monitor", id, None).await;
        }
    }

    /// Folds every finished transcode into the monitor's history.
    async fn reconcile(&mut self) {
        let mut outcomes: Vec<TranscodeOutcome> = Vec::new();
        for transcoder in self.transcoders.iter_mut() {
            if let Some(outcome) = transcoder.reap().await {
                outcomes.push(outcome);
            }
        }

        for outcome in outcomes {
            let key = &outcome.item.rating_key;
            let code = outcome.code.code();
            let disposition = if outcome.code.is_success() {
                TranscodeDisposition::Succeeded
            } else if self.config.is_failure(code) {
                TranscodeDisposition::Failed
            } else {
                TranscodeDisposition::Retry
            };

            match self.monitors.first_mut() {
                Some(monitor) => match disposition {
                    TranscodeDisposition::Succeeded => monitor.mark_succeeded(key),
                    TranscodeDisposition::Failed => monitor.mark_failed(key),
                    TranscodeDisposition::Retry => monitor.clear_in_flight(key),
                },
                None => warn!(rating_key = %key, code, "No monitor to record transcode result"),
            }

            self.emit(AuditEvent::TranscodeFinished {
                rating_key: key.clone(),
                code,
                duration_ms: outcome.duration_ms,
                disposition,
            })
            .await;
        }
    }

    async fn reap_organizers(&mut self) {
        let mut finished = Vec::new();
        for organizer in self.organizers.iter_mut() {
            if let Some(result) = organizer.reap().await {
                finished.push((organizer.id(), result));
            }
        }

        for (id, result) in finished {
            match result {
                Ok(report) => self.organized(id, report).await,
                Err(e) => {
                    if let OrganizeError::ServiceStart { report, .. } = &e {
                        self.record_organized(report);
                    }
                    self.zombified("organizer", id, Some(e.to_string())).await;
                }
            }
        }
    }

    async fn organized(&mut self, organizer_id: usize, report: OrganizeReport) {
        self.record_organized(&report);

        self.collaborators
            .notifier
            .notify(&Notification::OrganizeFinished {
                committed: report.committed.len(),
                moved: report.moved,
                mismatched_rows: report.mismatched_rows,
            })
            .await;
        self.emit(AuditEvent::OrganizeFinished {
            organizer: organizer_id,
            committed: report.committed.len(),
            stale: report.stale.len(),
            rescanned: report.rescanned,
            readonly: report.readonly,
        })
        .await;
    }

    /// Marks committed and stale items organized.
    fn record_organized(&mut self, report: &OrganizeReport) {
        match self.monitors.first_mut() {
            Some(monitor) => {
                for key in report.committed.iter().chain(report.stale.iter()) {
                    monitor.mark_organized(key);
                }
                monitor.force_refresh();
            }
            None => warn!(
                committed = report.committed.len(),
                "No monitor to record organize result"
            ),
        }
    }

    async fn zombified(&self, role: &str, id: usize, reason: Option<String>) {
        metrics::WORKERS_ZOMBIFIED.with_label_values(&[role]).inc();
        self.emit(AuditEvent::WorkerZombified {
            role: role.to_string(),
            worker_id: id,
            reason,
        })
        .await;
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.collaborators.audit {
            audit.emit(event).await;
        }
    }

    fn publish(&self) {
        let status = OrchestratorStatus {
            phase: self.phase,
            iterations: self.iterations,
            monitors: self
                .monitors
                .iter()
                .map(|m| MonitorStatus {
                    id: m.id(),
                    state: m.state(),
                    polling: m.is_polling(),
                    candidates: m.candidate_count(),
                    snapshot: m.snapshot().clone(),
                    last_failure: m.last_failure().cloned(),
                })
                .collect(),
            transcoders: self
                .transcoders
                .iter()
                .map(|t| TranscoderStatus {
                    id: t.id(),
                    state: t.state(),
                    rating_key: t.current_item().map(|i| i.rating_key.clone()),
                })
                .collect(),
            organizers: self
                .organizers
                .iter()
                .map(|o| OrganizerStatus {
                    id: o.id(),
                    state: o.state(),
                })
                .collect(),
            readonly: self.readonly,
            updated_at: Some(Utc::now()),
        };
        self.status_tx.send_replace(status);
    }
}
