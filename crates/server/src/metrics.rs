//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the grinder server:
//! - HTTP request metrics (latency, counts)
//! - Orchestrator and worker status (collected from the published status)
//! - Everything the core registers (phases, transcodes, organize passes)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use grinder_core::{OrchestratorStatus, Phase};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "grinder_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("grinder_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "grinder_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// 1 for the current phase, 0 for the others.
pub static ORCHESTRATOR_PHASE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("grinder_orchestrator_phase", "Current orchestrator phase"),
        &["phase"],
    )
    .unwrap()
});

pub static TRANSCODERS_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("grinder_transcoders_busy", "Transcoders currently working").unwrap()
});

pub static TRANSCODERS_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("grinder_transcoders", "Transcoders in the pool").unwrap()
});

/// Items eligible for dispatch.
pub static CANDIDATES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("grinder_candidates", "Items waiting to be transcoded").unwrap()
});

/// Succeeded items not organized yet.
pub static PENDING_ORGANIZE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "grinder_pending_organize",
        "Transcoded items waiting for the organizer",
    )
    .unwrap()
});

pub static CACHE_SIZE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("grinder_cache_size_bytes", "Bytes held in the transcode cache").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_PHASE.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSCODERS_BUSY.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSCODERS_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(CANDIDATES.clone())).unwrap();
    registry
        .register(Box::new(PENDING_ORGANIZE.clone()))
        .unwrap();
    registry
        .register(Box::new(CACHE_SIZE_BYTES.clone()))
        .unwrap();

    // Core metrics (phases, transcodes, organize passes)
    for metric in grinder_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Update gauges from the orchestrator's latest status.
///
/// Called before encoding so a scrape always sees the current values.
pub fn collect_dynamic_metrics(status: &OrchestratorStatus) {
    for phase in [Phase::Idle, Phase::SelfCheck, Phase::Queue, Phase::Organize] {
        ORCHESTRATOR_PHASE
            .with_label_values(&[phase.as_str()])
            .set(i64::from(phase == status.phase));
    }

    let busy = status
        .transcoders
        .iter()
        .filter(|t| t.rating_key.is_some())
        .count();
    TRANSCODERS_BUSY.set(busy as i64);
    TRANSCODERS_TOTAL.set(status.transcoders.len() as i64);

    if let Some(monitor) = status.monitors.first() {
        CANDIDATES.set(monitor.candidates as i64);
        PENDING_ORGANIZE.set(monitor.snapshot.library.pending_organize as i64);
        CACHE_SIZE_BYTES.set(monitor.snapshot.storage.cache_size_bytes as i64);
    }
}
