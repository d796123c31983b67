//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the ingest server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Engine state (collected from the latest status snapshot)
//! - Core metrics registered from `ingest_core::metrics`

use axum::{extract::State, http::header, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use ingest_core::status::EngineState;

use crate::state::AppState;

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
            "ingest_http_request_duration_seconds",
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
        Opts::new("ingest_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ingest_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// 1 while the pause flag is set.
pub static ENGINE_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ingest_engine_paused", "Whether processing is paused").unwrap()
});

/// Seconds since the last status snapshot was published.
pub static STATUS_AGE_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ingest_status_age_seconds",
        "Seconds since the last status snapshot",
    )
    .unwrap()
});

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

    // Engine
    registry.register(Box::new(ENGINE_PAUSED.clone())).unwrap();
    registry
        .register(Box::new(STATUS_AGE_SECONDS.clone()))
        .unwrap();

    // Core metrics (watcher, orchestrator, pipeline)
    for metric in ingest_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Update gauges derived from the latest status snapshot.
pub fn collect_dynamic_metrics(state: &AppState) {
    let snapshot = state.store().latest();
    let paused = matches!(snapshot.state, EngineState::Paused | EngineState::Pausing);
    ENGINE_PAUSED.set(if paused { 1 } else { 0 });

    let age = chrono::Utc::now() - snapshot.updated_at;
    STATUS_AGE_SECONDS.set(age.num_seconds().max(0));
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

/// Routes served by the status API, as used in metric labels.
const ROUTES: &[&str] = &[
    "/api/health",
    "/api/config",
    "/api/status",
    "/api/history",
    "/api/logs",
    "/api/control/pause",
    "/api/control/resume",
    "/metrics",
];

/// Metric label for a request path: the route it is served by, or
/// `unmatched`.
pub fn route_label(path: &str) -> &'static str {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    if let Some(name) = path.strip_prefix("/api/folders/") {
        if !name.is_empty() && !name.contains('/') {
            return "/api/folders/{name}";
        }
    }
    ROUTES
        .iter()
        .find(|route| **route == path)
        .copied()
        .unwrap_or("unmatched")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_known_routes() {
        assert_eq!(route_label("/api/status"), "/api/status");
        assert_eq!(route_label("/api/history/"), "/api/history");
        assert_eq!(route_label("/metrics"), "/metrics");
    }

    #[test]
    fn test_route_label_folder_name() {
        assert_eq!(route_label("/api/folders/watch"), "/api/folders/{name}");
        assert_eq!(route_label("/api/folders/nope"), "/api/folders/{name}");
        assert_eq!(route_label("/api/folders/a/b"), "unmatched");
        assert_eq!(route_label("/api/folders/"), "unmatched");
    }

    #[test]
    fn test_route_label_unknown_paths() {
        assert_eq!(route_label("/"), "unmatched");
        assert_eq!(route_label("/api/jobs/42"), "unmatched");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("ingest_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        ingest_core::metrics::FILES_ADMITTED.inc_by(0);
        ingest_core::metrics::QUEUE_DEPTH.set(0);
        ENGINE_PAUSED.set(0);

        let output = encode_metrics();

        assert!(output.contains("ingest_files_admitted_total"));
        assert!(output.contains("ingest_queue_depth"));
        assert!(output.contains("ingest_engine_paused"));
    }
}
