use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::database::LibraryDatabase;
use crate::library::{LibraryConnector, MediaItem, PathMapper};
use crate::metrics;
use crate::mover::FileMover;
use crate::notify::{Notification, Notifier};
use crate::rules::{within_windows, TimeWindow};
use crate::service::ServiceControl;

use super::fatal::FatalHandler;
use super::transaction::{plan, PendingTransaction};
use super::{CommitStep, OrganizeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizerState {
    Ready,
    Organizing,
    /// A run failed; the pool replaces this organizer.
    Zombie,
}

/// Everything an organizer run touches.
pub struct OrganizerDeps {
    pub cache_dir: PathBuf,
    pub mapper: Arc<PathMapper>,
    pub mover: Arc<dyn FileMover>,
    pub database: Arc<dyn LibraryDatabase>,
    pub service: Arc<dyn ServiceControl>,
    pub connector: Arc<dyn LibraryConnector>,
    pub fatal: Arc<dyn FatalHandler>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Option<AuditHandle>,
    pub rescan_windows: Vec<TimeWindow>,
    pub readonly: bool,
}

/// Result of one organizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrganizeReport {
    /// Items now organized. In readonly mode, the items that would have been.
    pub committed: Vec<String>,
    /// Succeeded items with no output; nothing left to organize for them.
    pub stale: Vec<String>,
    pub moved: usize,
    pub bytes_moved: u64,
    pub deleted: usize,
    pub updated: usize,
    pub mismatched_rows: usize,
    pub orphans_removed: usize,
    pub rescanned: Vec<String>,
    pub readonly: bool,
}

/// Moves transcoded files into the library, one transaction per run.
pub struct Organizer {
    id: usize,
    state: OrganizerState,
    deps: Arc<OrganizerDeps>,
    task: Option<JoinHandle<Result<OrganizeReport, OrganizeError>>>,
}

impl Organizer {
    pub fn new(id: usize, deps: Arc<OrganizerDeps>) -> Self {
        Self {
            id,
            state: OrganizerState::Ready,
            deps,
            task: None,
        }
    }

    /// Builds an organizer once its cache directory is usable.
    pub async fn create(id: usize, deps: Arc<OrganizerDeps>) -> Result<Self, OrganizeError> {
        tokio::fs::create_dir_all(&deps.cache_dir)
            .await
            .map_err(OrganizeError::CacheScan)?;
        info!(organizer = id, cache = %deps.cache_dir.display(), "Organizer ready");
        Ok(Self::new(id, deps))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> OrganizerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == OrganizerState::Ready
    }

    pub fn is_organizing(&self) -> bool {
        self.state == OrganizerState::Organizing
    }

    pub fn is_zombie(&self) -> bool {
        self.state == OrganizerState::Zombie
    }

    /// Starts a run over `items`. Returns false unless the organizer is ready.
    pub fn organize(&mut self, items: Vec<MediaItem>) -> bool {
        if self.state != OrganizerState::Ready {
            return false;
        }
        info!(organizer = self.id, items = items.len(), "Organize started");
        self.state = OrganizerState::Organizing;
        self.task = Some(tokio::spawn(run(Arc::clone(&self.deps), items)));
        true
    }

    /// Collects a finished run. A failed run leaves the organizer a zombie.
    pub async fn reap(&mut self) -> Option<Result<OrganizeReport, OrganizeError>> {
        if !self.task.as_ref().is_some_and(|t| t.is_finished()) {
            return None;
        }
        let task = self.task.take()?;

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(OrganizeError::TaskPanicked(e.to_string())),
        };

        match &result {
            Ok(report) => {
                self.state = OrganizerState::Ready;
                let outcome = if report.readonly {
                    "readonly"
                } else if report.committed.is_empty() {
                    "empty"
                } else {
                    "committed"
                };
                metrics::ORGANIZE_PASSES.with_label_values(&[outcome]).inc();
                info!(
                    organizer = self.id,
                    committed = report.committed.len(),
                    stale = report.stale.len(),
                    moved = report.moved,
                    mismatched_rows = report.mismatched_rows,
                    "Organize finished"
                );
            }
            Err(e) => {
                self.state = OrganizerState::Zombie;
                metrics::ORGANIZE_PASSES.with_label_values(&["failed"]).inc();
                error!(organizer = self.id, error = %e, "Organize failed, marking zombie");
            }
        }
        Some(result)
    }
}

async fn run(deps: Arc<OrganizerDeps>, items: Vec<MediaItem>) -> Result<OrganizeReport, OrganizeError> {
    let tx = plan(&deps.cache_dir, &items, &deps.mapper)
        .await
        .map_err(OrganizeError::CacheScan)?;

    info!(
        moves = tx.moves.len(),
        updates = tx.updates.len(),
        deletions = tx.deletions.len(),
        orphans = tx.orphans.len(),
        stale = tx.stale.len(),
        "Match pass complete"
    );

    let mut report = OrganizeReport {
        stale: tx.stale.clone(),
        readonly: deps.readonly,
        ..Default::default()
    };

    if deps.readonly {
        for m in &tx.moves {
            info!(
                rating_key = %m.rating_key,
                from = %m.source.display(),
                to = %m.destination.display(),
                "Readonly: would move"
            );
        }
        for u in &tx.updates {
            info!(rating_key = %u.rating_key, old = %u.old_path, new = %u.new_path, "Readonly: would update");
        }
        for d in &tx.deletions {
            info!(path = %d.display(), "Readonly: would delete");
        }
        report.committed = tx.committed;
        return Ok(report);
    }

    report.orphans_removed = remove_dirs(deps.mover.as_ref(), &tx.orphans).await;

    if tx.is_empty() {
        debug!("Nothing to commit, leaving the library service running");
        remove_dirs(deps.mover.as_ref(), &tx.cache_dirs).await;
        return Ok(report);
    }

    deps.service.stop().await.map_err(OrganizeError::ServiceStop)?;

    if let Err((step, reason)) = commit(&deps, &tx, &mut report).await {
        abort(&deps, step, &reason).await;
        return Err(OrganizeError::Commit { step, reason });
    }

    if let Some(audit) = &deps.audit {
        audit
            .emit(AuditEvent::TransactionCommitted {
                committed: tx.committed.clone(),
                moved: report.moved,
                deleted: report.deleted,
                updated: report.updated,
                mismatched_rows: report.mismatched_rows,
            })
            .await;
    }
    report.committed = tx.committed.clone();

    if let Err(source) = deps.service.start().await {
        remove_dirs(deps.mover.as_ref(), &tx.cache_dirs).await;
        return Err(OrganizeError::ServiceStart {
            source,
            report: Box::new(report),
        });
    }

    if within_windows(&deps.rescan_windows, Local::now().time()) {
        report.rescanned = rescan(&deps, &tx).await;
    } else {
        info!("Outside the rescan window, skipping library rescan");
    }

    remove_dirs(deps.mover.as_ref(), &tx.cache_dirs).await;
    Ok(report)
}

/// Steps (2) to (5): updates, moves, deletions, then commit.
async fn commit(
    deps: &OrganizerDeps,
    tx: &PendingTransaction,
    report: &mut OrganizeReport,
) -> Result<(), (CommitStep, String)> {
    let mut session = deps
        .database
        .begin()
        .map_err(|e| (CommitStep::Update, e.to_string()))?;

    for update in &tx.updates {
        let rows = session
            .execute_update(update)
            .map_err(|e| (CommitStep::Update, e.to_string()))?;
        if rows != 1 {
            warn!(
                rating_key = %update.rating_key,
                old = %update.old_path,
                rows,
                "Database update touched an unexpected number of rows"
            );
            metrics::ROW_MISMATCHES.inc();
            report.mismatched_rows += 1;
        }
        report.updated += 1;
    }

    for m in &tx.moves {
        let bytes = deps
            .mover
            .move_file(&m.source, &m.destination)
            .await
            .map_err(|e| (CommitStep::Move, e.to_string()))?;
        debug!(rating_key = %m.rating_key, to = %m.destination.display(), bytes, "Moved");
        metrics::FILES_MOVED.inc();
        metrics::BYTES_MOVED.inc_by(bytes);
        report.moved += 1;
        report.bytes_moved += bytes;
    }

    for path in &tx.deletions {
        deps.mover
            .remove_file(path)
            .await
            .map_err(|e| (CommitStep::Delete, e.to_string()))?;
        report.deleted += 1;
    }

    session
        .commit()
        .map_err(|e| (CommitStep::Commit, e.to_string()))?;
    info!(
        moved = report.moved,
        updated = report.updated,
        deleted = report.deleted,
        "Library transaction committed"
    );
    Ok(())
}

async fn abort(deps: &OrganizerDeps, step: CommitStep, reason: &str) {
    error!(step = %step, reason = %reason, "Library transaction aborted");
    let reason = format!("{} step failed: {}", step, reason);
    deps.notifier
        .notify(&Notification::TransactionAborted {
            reason: reason.clone(),
        })
        .await;
    if let Some(audit) = &deps.audit {
        audit
            .emit(AuditEvent::TransactionAborted {
                step: step.to_string(),
                reason: reason.clone(),
            })
            .await;
    }
    deps.fatal.terminate(&reason).await;
}

async fn rescan(deps: &OrganizerDeps, tx: &PendingTransaction) -> Vec<String> {
    let client = match deps.connector.connect().await {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Cannot reach library for rescan");
            return Vec::new();
        }
    };

    let mut rescanned = Vec::new();
    for section in &tx.sections {
        match client.refresh_section(section).await {
            Ok(()) => {
                info!(section = %section, "Library section rescan requested");
                rescanned.push(section.clone());
            }
            Err(e) => warn!(section = %section, error = %e, "Library section rescan failed"),
        }
    }
    rescanned
}

async fn remove_dirs(mover: &dyn FileMover, dirs: &[PathBuf]) -> usize {
    let mut removed = 0;
    for dir in dirs {
        match mover.remove_dir_all(dir).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove cache directory"),
        }
    }
    removed
}
