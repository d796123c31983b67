use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{control, folders, handlers, logs, status};
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Engine state
        .route("/status", get(status::get_status))
        .route("/history", get(status::get_history))
        // Filesystem
        .route("/folders/{name}", get(folders::list_folder))
        .route("/logs", get(logs::get_logs))
        // Control
        .route("/control/pause", post(control::pause))
        .route("/control/resume", post(control::resume))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(metrics_handler).with_state(state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
