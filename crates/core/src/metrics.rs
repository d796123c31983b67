//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Watcher (admissions)
//! - Orchestrator (queue depth, active job)
//! - Pipeline (job results and durations)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Watcher
// =============================================================================

/// Files admitted by the watcher.
pub static FILES_ADMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "ingest_files_admitted_total",
        "Total files admitted from the watch folder",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator
// =============================================================================

/// Files waiting in the queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ingest_queue_depth", "Files waiting to be processed").unwrap()
});

/// Jobs currently running (0 or 1).
pub static ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ingest_active_jobs", "Jobs currently running").unwrap()
});

// =============================================================================
// Pipeline
// =============================================================================

/// Finished jobs by result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ingest_jobs_total", "Total finished jobs"),
        &["result", "reason"], // "success"/"failure", failure reason or "none"
    )
    .unwrap()
});

/// Wall-clock duration of finished jobs.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("ingest_job_duration_seconds", "Duration of jobs").buckets(vec![
            5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FILES_ADMITTED.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(ACTIVE_JOBS.clone()),
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JOBS_TOTAL.with_label_values(&["success", "none"]).inc();
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "ingest_jobs_total"));
    }
}
