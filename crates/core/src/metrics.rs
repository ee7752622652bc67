//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (phase transitions, dispatches)
//! - Transcoder (results by code, duration)
//! - Organizer (passes by outcome, files moved, row-count mismatches)
//! - Audit trail (events written, failed, dropped)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Orchestrator
// =============================================================================

/// Phase transitions by target phase.
pub static PHASE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "grinder_phase_transitions_total",
            "Orchestrator phase transitions",
        ),
        &["phase"], // "idle", "self_check", "queue", "organize"
    )
    .unwrap()
});

/// Items handed to a transcoder.
pub static TRANSCODES_DISPATCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "grinder_transcodes_dispatched_total",
        "Items dispatched to a transcoder",
    )
    .unwrap()
});

/// Workers that turned into zombies, by role.
pub static WORKERS_ZOMBIFIED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("grinder_workers_zombified_total", "Workers marked zombie"),
        &["role"], // "monitor", "organizer"
    )
    .unwrap()
});

// =============================================================================
// Transcoder
// =============================================================================

/// Transcode results by result code.
pub static TRANSCODE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("grinder_transcode_results_total", "Transcode results"),
        &["code"], // "0", "404", "405", "500", "255", "1"
    )
    .unwrap()
});

/// Transcode duration in seconds.
pub static TRANSCODE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "grinder_transcode_duration_seconds",
            "Wall-clock duration of one transcode",
        )
        .buckets(vec![
            1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
        ]),
        &["code"],
    )
    .unwrap()
});

// =============================================================================
// Organizer
// =============================================================================

/// Organize passes by outcome.
pub static ORGANIZE_PASSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("grinder_organize_passes_total", "Organizer runs"),
        &["outcome"], // "committed", "empty", "readonly", "failed"
    )
    .unwrap()
});

/// Files moved from the cache into the library.
pub static FILES_MOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "grinder_files_moved_total",
        "Transcoded files moved into the library",
    )
    .unwrap()
});

/// Bytes moved from the cache into the library.
pub static BYTES_MOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "grinder_bytes_moved_total",
        "Bytes of transcoded files moved into the library",
    )
    .unwrap()
});

/// Database updates that touched a row count other than one.
pub static ROW_MISMATCHES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "grinder_row_count_mismatches_total",
        "Library database updates that did not touch exactly one row",
    )
    .unwrap()
});

// =============================================================================
// Audit
// =============================================================================

/// Audit events by what became of them.
pub static AUDIT_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("grinder_audit_events_total", "Audit events by outcome"),
        &["outcome"], // "written", "failed", "dropped"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PHASE_TRANSITIONS.clone()),
        Box::new(TRANSCODES_DISPATCHED.clone()),
        Box::new(WORKERS_ZOMBIFIED.clone()),
        Box::new(TRANSCODE_RESULTS.clone()),
        Box::new(TRANSCODE_DURATION.clone()),
        Box::new(ORGANIZE_PASSES.clone()),
        Box::new(FILES_MOVED.clone()),
        Box::new(BYTES_MOVED.clone()),
        Box::new(ROW_MISMATCHES.clone()),
        Box::new(AUDIT_EVENTS.clone()),
    ]
}
