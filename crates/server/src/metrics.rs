//! Prometheus metrics for the depot server.
//!
//! Exposes counters for the upload lifecycle, integrity failures,
//! compensating actions and janitor sweeps.
//!
//! The `/metrics` endpoint is unauthenticated and should be network-restricted
//! to the Prometheus scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Session lifecycle
pub static UPLOADS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_uploads_started_total",
        "Total number of upload sessions started",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_uploads_completed_total",
        "Total number of uploads completed into a release",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_uploads_aborted_total",
        "Total number of upload sessions aborted by clients or failed completions",
    )
    .expect("metric creation failed")
});

pub static OPEN_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "depot_open_upload_sessions",
        "Upload sessions currently open for chunks",
    )
    .expect("metric creation failed")
});

// Chunks
pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunks_received_total",
        "Total number of chunks received (including retries)",
    )
    .expect("metric creation failed")
});

pub static CHUNK_BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunk_bytes_received_total",
        "Total chunk bytes received",
    )
    .expect("metric creation failed")
});

// Completion
pub static COMPLETION_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_completion_failures_total",
            "Failed completion attempts by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static INTEGRITY_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_integrity_failures_total",
        "Assembled blobs rejected for size or hash mismatch",
    )
    .expect("metric creation failed")
});

pub static COMPENSATING_DELETES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_compensating_deletes_total",
        "Release blobs deleted after a failed completion",
    )
    .expect("metric creation failed")
});

pub static ASSEMBLY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_assembly_duration_seconds",
            "Time taken to assemble and upload a release blob",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

// Janitor
pub static JANITOR_SESSIONS_SWEPT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_janitor_sessions_swept_total",
            "Sessions removed by the janitor, by status at removal",
        ),
        &["status"],
    )
    .expect("metric creation failed")
});

pub static JANITOR_ORPHANS_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_janitor_orphan_uploads_removed_total",
        "Chunk sets removed that had no owning session",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(UPLOADS_STARTED.clone()),
            Box::new(UPLOADS_COMPLETED.clone()),
            Box::new(UPLOADS_ABORTED.clone()),
            Box::new(OPEN_SESSIONS.clone()),
            Box::new(CHUNKS_RECEIVED.clone()),
            Box::new(CHUNK_BYTES_RECEIVED.clone()),
            Box::new(COMPLETION_FAILURES.clone()),
            Box::new(INTEGRITY_FAILURES.clone()),
            Box::new(COMPENSATING_DELETES.clone()),
            Box::new(ASSEMBLY_DURATION.clone()),
            Box::new(JANITOR_SESSIONS_SWEPT.clone()),
            Box::new(JANITOR_ORPHANS_REMOVED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "metric registration failed");
            }
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a failed completion by its stable error code.
pub fn record_completion_failure(code: &str) {
    COMPLETION_FAILURES.with_label_values(&[code]).inc();
}
