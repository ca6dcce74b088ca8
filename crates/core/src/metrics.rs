//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatcher (chunk invocations, retries, render duration)
//! - Combiner (combine duration)
//! - Cleanup (files deleted)
//! - Jobs (outcomes, active jobs)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Dispatcher
// =============================================================================

/// Chunk invocations total by result.
pub static CHUNK_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chunkrender_chunk_invocations_total",
            "Total chunk worker invocations",
        ),
        &["result"], // "success", "failed", "cancelled"
    )
    .unwrap()
});

/// Chunk retries total by error class.
pub static CHUNK_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkrender_chunk_retries_total", "Total chunk retries"),
        &["class"], // "flaky", "worker_failure"
    )
    .unwrap()
});

/// Chunk render duration in seconds.
pub static CHUNK_RENDER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "chunkrender_chunk_duration_seconds",
            "Wall-clock duration of a successful chunk attempt",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Combiner and cleanup
// =============================================================================

/// Combine duration in seconds.
pub static COMBINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "chunkrender_combine_duration_seconds",
            "Duration of segment concatenation and muxing",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Intermediate objects deleted total.
pub static FILES_CLEANED_UP: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "chunkrender_files_cleaned_up_total",
        "Total intermediate objects deleted",
    )
    .unwrap()
});

// =============================================================================
// Jobs
// =============================================================================

/// Render jobs total by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkrender_jobs_total", "Total render jobs finished"),
        &["outcome"], // "success", "failed", "cancelled", "invalid"
    )
    .unwrap()
});

/// Render jobs currently running.
pub static ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("chunkrender_active_jobs", "Render jobs currently running").unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatcher
        Box::new(CHUNK_INVOCATIONS.clone()),
        Box::new(CHUNK_RETRIES.clone()),
        Box::new(CHUNK_RENDER_DURATION.clone()),
        // Combiner and cleanup
        Box::new(COMBINE_DURATION.clone()),
        Box::new(FILES_CLEANED_UP.clone()),
        // Jobs
        Box::new(JOBS_TOTAL.clone()),
        Box::new(ACTIVE_JOBS.clone()),
    ]
}
