//! Per-item lifecycle table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::library::MediaItem;

/// Where an item is in the pipeline.
///
/// `Discovered` is implicit: any key without a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Discovered,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct Record {
    state: LifecycleState,
    organized: bool,
    item: MediaItem,
}

/// Lifecycle counts, as exposed in the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryCounts {
    pub in_flight: usize,
    pub succeeded: usize,
    pub pending_organize: usize,
    pub failed: usize,
}

/// One record per rating key, so an item can never sit in two states.
#[derive(Debug, Default)]
pub struct WorkHistory {
    records: HashMap<String, Record>,
}

impl WorkHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, rating_key: &str) -> LifecycleState {
        self.records
            .get(rating_key)
            .map(|r| r.state)
            .unwrap_or(LifecycleState::Discovered)
    }

    /// `Discovered → InFlight`. Returns false if the item is not discovered.
    pub fn mark_in_flight(&mut self, item: &MediaItem) -> bool {
        let current = self.state(&item.rating_key);
        if current != LifecycleState::Discovered {
            warn!(
                rating_key = %item.rating_key,
                state = ?current,
                "Refusing to dispatch an item that is not discovered"
            );
            return false;
        }
        self.records.insert(
            item.rating_key.clone(),
            Record {
                state: LifecycleState::InFlight,
                organized: false,
                item: item.clone(),
            },
        );
        true
    }

    /// `InFlight → Succeeded`; this also takes the item out of flight.
    pub fn mark_succeeded(&mut self, rating_key: &str) {
        self.finish(rating_key, LifecycleState::Succeeded);
    }

    /// Leaves in-flight for `Failed`.
    pub fn mark_failed(&mut self, rating_key: &str) {
        self.finish(rating_key, LifecycleState::Failed);
    }

    fn finish(&mut self, rating_key: &str, state: LifecycleState) {
        match self.records.get_mut(rating_key) {
            Some(record) if record.state == LifecycleState::InFlight => {
                record.state = state;
                record.organized = false;
            }
            _ => warn!(
                rating_key = %rating_key,
                state = ?state,
                "Result for an item that is not in flight"
            ),
        }
    }

    /// Returns an in-flight item to `Discovered` so it is retried.
    ///
    /// No-op (logged) when the item is not in flight.
    pub fn clear_in_flight(&mut self, rating_key: &str) {
        match self.state(rating_key) {
            LifecycleState::InFlight => {
                self.records.remove(rating_key);
            }
            other => debug!(
                rating_key = %rating_key,
                state = ?other,
                "clear_in_flight on an item that is not in flight"
            ),
        }
    }

    pub fn mark_organized(&mut self, rating_key: &str) {
        match self.records.get_mut(rating_key) {
            Some(record) if record.state == LifecycleState::Succeeded => record.organized = true,
            _ => warn!(rating_key = %rating_key, "Organized an item that had not succeeded"),
        }
    }

    /// Failed items get another chance after each listing refresh.
    pub fn reset_failed(&mut self) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.state != LifecycleState::Failed);
        before - self.records.len()
    }

    /// Succeeded items still waiting for the organizer.
    pub fn pending_organize(&self) -> Vec<MediaItem> {
        let mut items: Vec<MediaItem> = self
            .records
            .values()
            .filter(|r| r.state == LifecycleState::Succeeded && !r.organized)
            .map(|r| r.item.clone())
            .collect();
        items.sort_by(|a, b| a.rating_key.cmp(&b.rating_key));
        items
    }

    pub fn counts(&self) -> HistoryCounts {
        let mut counts = HistoryCounts::default();
        for record in self.records.values() {
            match record.state {
                LifecycleState::InFlight => counts.in_flight += 1,
                LifecycleState::Succeeded => {
                    counts.succeeded += 1;
                    if !record.organized {
                        counts.pending_organize += 1;
                    }
                }
                LifecycleState::Failed => counts.failed += 1,
                LifecycleState::Discovered => {}
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
