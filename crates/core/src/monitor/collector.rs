//! The monitor worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{AdmissionConfig, LibraryConfig};
use crate::host::{HostProbe, HostSample};
use crate::library::{
    summarize_resources, LibraryClient, LibraryConnector, MediaItem, ResourceSample, SessionStats,
};
use crate::rules::{any_matches, item_matches, satisfied, FailureReason};

use super::history::{LifecycleState, WorkHistory};
use super::snapshot::MetricsSnapshot;
use super::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// No valid snapshot yet (new, or just woken up).
    Updating,
    Ready,
    /// Suspended while the organizer rewrites the library.
    Sleeping,
    /// A poll failed; the pool replaces this monitor.
    Zombie,
}

/// Polling cadence and the sections to list.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub sections: Vec<String>,
    pub listing_interval: Duration,
    pub sessions_interval: Duration,
}

impl From<&LibraryConfig> for MonitorSettings {
    fn from(config: &LibraryConfig) -> Self {
        Self {
            sections: config.sections.clone(),
            listing_interval: Duration::from_secs(config.listing_interval_secs),
            sessions_interval: Duration::from_secs(config.sessions_interval_secs),
        }
    }
}

/// What a background poll produced.
struct PollOutcome {
    client: Arc<dyn LibraryClient>,
    host: HostSample,
    sessions: Option<(SessionStats, ResourceSample)>,
    listing: Option<Vec<MediaItem>>,
}

struct PollRequest {
    client: Option<Arc<dyn LibraryClient>>,
    connector: Arc<dyn LibraryConnector>,
    host: Arc<dyn HostProbe>,
    sections: Vec<String>,
    fetch_sessions: bool,
    fetch_listing: bool,
}

/// Collects metrics and candidates, and owns the lifecycle history.
///
/// Only the orchestrator touches a monitor. Polls run as background tasks that
/// return a [`PollOutcome`]; nothing is applied until [`Monitor::reap`].
pub struct Monitor {
    id: usize,
    state: MonitorState,
    connector: Arc<dyn LibraryConnector>,
    client: Option<Arc<dyn LibraryClient>>,
    host: Arc<dyn HostProbe>,
    settings: MonitorSettings,
    admission: Arc<AdmissionConfig>,
    snapshot: MetricsSnapshot,
    history: WorkHistory,
    candidates: VecDeque<MediaItem>,
    last_listing: Option<Instant>,
    last_sessions: Option<Instant>,
    force_listing: bool,
    poll_task: Option<JoinHandle<Result<PollOutcome, MonitorError>>>,
    last_failure: Option<FailureReason>,
}

impl Monitor {
    pub fn new(
        id: usize,
        connector: Arc<dyn LibraryConnector>,
        host: Arc<dyn HostProbe>,
        settings: MonitorSettings,
        admission: Arc<AdmissionConfig>,
    ) -> Self {
        Self {
            id,
            state: MonitorState::Updating,
            connector,
            client: None,
            host,
            settings,
            admission,
            snapshot: MetricsSnapshot::default(),
            history: WorkHistory::new(),
            candidates: VecDeque::new(),
            last_listing: None,
            last_sessions: None,
            force_listing: false,
            poll_task: None,
            last_failure: None,
        }
    }

    /// Builds a monitor and verifies the library answers.
    pub async fn connect(
        id: usize,
        connector: Arc<dyn LibraryConnector>,
        host: Arc<dyn HostProbe>,
        settings: MonitorSettings,
        admission: Arc<AdmissionConfig>,
    ) -> Result<Self, MonitorError> {
        let client = connector.connect().await?;
        let mut monitor = Self::new(id, connector, host, settings, admission);
        monitor.client = Some(client);
        info!(monitor = id, "Monitor connected to library");
        Ok(monitor)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == MonitorState::Ready
    }

    pub fn is_zombie(&self) -> bool {
        self.state == MonitorState::Zombie
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_some()
    }

    pub fn snapshot(&self) -> &MetricsSnapshot {
        &self.snapshot
    }

    pub fn history(&self) -> &WorkHistory {
        &self.history
    }

    pub fn last_failure(&self) -> Option<&FailureReason> {
        self.last_failure.as_ref()
    }

    /// Items currently eligible for dispatch, in listing order.
    pub fn candidate_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|i| self.history.state(&i.rating_key) == LifecycleState::Discovered)
            .count()
    }

    /// Starts a background refresh. Returns false when one is already running
    /// or the monitor cannot poll in its current state.
    pub fn poll(&mut self) -> bool {
        if self.poll_task.is_some()
            || matches!(self.state, MonitorState::Sleeping | MonitorState::Zombie)
        {
            return false;
        }

        let fetch_listing = self.force_listing
            || self
                .last_listing
                .is_none_or(|t| t.elapsed() >= self.settings.listing_interval);
        let fetch_sessions = self
            .last_sessions
            .is_none_or(|t| t.elapsed() >= self.settings.sessions_interval);

        let request = PollRequest {
            client: self.client.clone(),
            connector: Arc::clone(&self.connector),
            host: Arc::clone(&self.host),
            sections: self.settings.sections.clone(),
            fetch_sessions,
            fetch_listing,
        };
        debug!(
            monitor = self.id,
            listing = fetch_listing,
            sessions = fetch_sessions,
            "Polling"
        );
        self.poll_task = Some(tokio::spawn(collect(request)));
        true
    }

    /// Applies a finished poll. Returns true when a result was consumed.
    pub async fn reap(&mut self) -> bool {
        if !self.poll_task.as_ref().is_some_and(|t| t.is_finished()) {
            return false;
        }
        let Some(task) = self.poll_task.take() else {
            return false;
        };

        let outcome = match task.await {
            Ok(result) => result,
            Err(join_error) => Err(MonitorError::TaskPanicked(join_error.to_string())),
        };

        if self.state == MonitorState::Sleeping {
            debug!(monitor = self.id, "Discarding poll result received while sleeping");
            return true;
        }

        match outcome {
            Ok(outcome) => self.apply(outcome),
            Err(e) => {
                error!(monitor = self.id, error = %e, "Monitor poll failed, marking zombie");
                self.state = MonitorState::Zombie;
                self.client = None;
            }
        }
        true
    }

    fn apply(&mut self, outcome: PollOutcome) {
        let now = Instant::now();
        self.client = Some(outcome.client);

        self.snapshot.sys = outcome.host.sys;
        self.snapshot.storage = outcome.host.storage;
        self.snapshot.gpu = outcome.host.gpu;
        self.snapshot.veto = outcome.host.veto;

        if let Some((sessions, resources)) = outcome.sessions {
            let library = &mut self.snapshot.library;
            library.playing_sessions = sessions.playing_sessions;
            library.transcode_sessions = sessions.transcode_sessions;
            library.host_cpu = resources.host_cpu;
            library.host_memory = resources.host_memory;
            library.process_cpu = resources.process_cpu;
            library.process_memory = resources.process_memory;
            self.last_sessions = Some(now);
        }

        if let Some(listing) = outcome.listing {
            let retried = self.history.reset_failed();
            self.snapshot.library.items = listing.len();
            self.candidates = listing
                .into_iter()
                .filter(|item| item_matches(&self.admission.item_filter, item))
                .filter(|item| self.history.state(&item.rating_key) == LifecycleState::Discovered)
                .collect();
            self.last_listing = Some(now);
            self.force_listing = false;
            info!(
                monitor = self.id,
                items = self.snapshot.library.items,
                candidates = self.candidates.len(),
                retried,
                "Library listing refreshed"
            );
        }

        self.snapshot.refreshed_at = Some(Utc::now());
        self.sync_counts();
        if self.state == MonitorState::Updating {
            info!(monitor = self.id, "Monitor ready");
        }
        self.state = MonitorState::Ready;
    }

    fn sync_counts(&mut self) {
        let counts = self.history.counts();
        let library = &mut self.snapshot.library;
        library.in_flight = counts.in_flight;
        library.succeeded = counts.succeeded;
        library.pending_organize = counts.pending_organize;
        library.failed = counts.failed;
    }

    /// Suspends polling and releases the library connection.
    pub fn sleep(&mut self) {
        if matches!(self.state, MonitorState::Sleeping | MonitorState::Zombie) {
            return;
        }
        debug!(monitor = self.id, "Monitor sleeping");
        self.state = MonitorState::Sleeping;
        self.client = None;
    }

    /// Resumes after [`Monitor::sleep`]; the next poll reconnects.
    pub fn wakeup(&mut self) {
        if self.state == MonitorState::Sleeping {
            debug!(monitor = self.id, "Monitor waking up");
            self.state = MonitorState::Updating;
        }
    }

    /// Makes the next poll fetch the listing regardless of its interval.
    pub fn force_refresh(&mut self) {
        self.force_listing = true;
    }

    /// First discovered candidate, dropping entries that reached a final state.
    pub fn next_candidate(&mut self) -> Option<MediaItem> {
        let history = &self.history;
        self.candidates.retain(|item| {
            !matches!(
                history.state(&item.rating_key),
                LifecycleState::Succeeded | LifecycleState::Failed
            )
        });
        self.candidates
            .iter()
            .find(|item| history.state(&item.rating_key) == LifecycleState::Discovered)
            .cloned()
    }

    pub fn admit_transcode(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        let result = satisfied(&self.admission.transcode, &self.snapshot);
        self.record(result)
    }

    /// Needs at least one succeeded, unorganized item on top of the rules.
    pub fn admit_organize(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        if self.snapshot.library.pending_organize == 0 {
            return self.record(Err(FailureReason {
                category: "library".to_string(),
                field: "pending_organize".to_string(),
                required: ">= 1".to_string(),
                actual: "0".to_string(),
            }));
        }
        let result = satisfied(&self.admission.organize, &self.snapshot);
        self.record(result)
    }

    fn record(&mut self, result: Result<(), FailureReason>) -> bool {
        match result {
            Ok(()) => {
                self.last_failure = None;
                true
            }
            Err(reason) => {
                debug!(monitor = self.id, reason = %reason, "Admission refused");
                self.last_failure = Some(reason);
                false
            }
        }
    }

    pub fn capacity_saturated(&self) -> bool {
        any_matches(&self.admission.capacity, &self.snapshot)
    }

    /// Succeeded items waiting for the organizer.
    pub fn pending_organize(&self) -> Vec<MediaItem> {
        self.history.pending_organize()
    }

    pub fn mark_in_flight(&mut self, item: &MediaItem) -> bool {
        let marked = self.history.mark_in_flight(item);
        self.sync_counts();
        marked
    }

    pub fn mark_succeeded(&mut self, rating_key: &str) {
        self.history.mark_succeeded(rating_key);
        self.sync_counts();
    }

    pub fn mark_failed(&mut self, rating_key: &str) {
        self.history.mark_failed(rating_key);
        self.sync_counts();
    }

    pub fn clear_in_flight(&mut self, rating_key: &str) {
        self.history.clear_in_flight(rating_key);
        self.sync_counts();
    }

    pub fn mark_organized(&mut self, rating_key: &str) {
        self.history.mark_organized(rating_key);
        self.sync_counts();
    }
}

async fn collect(request: PollRequest) -> Result<PollOutcome, MonitorError> {
    let client = match request.client {
        Some(client) => client,
        None => request.connector.connect().await?,
    };

    let host = request.host.sample().await?;

    let sessions = if request.fetch_sessions {
        let stats = client.sessions().await?;
        let resources = client.resources().await?;
        Some((stats, summarize_resources(&resources)))
    } else {
        None
    };

    let listing = if request.fetch_listing {
        let mut items = Vec::new();
        for section in &request.sections {
            items.extend(client.section_items(section).await?);
        }
        Some(items)
    } else {
        None
    };

    if listing.as_ref().is_some_and(|l| l.is_empty()) {
        warn!("Library listing is empty");
    }

    Ok(PollOutcome {
        client,
        host,
        sessions,
        listing,
    })
}
