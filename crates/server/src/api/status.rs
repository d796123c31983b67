//! Engine status and job history.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use ingest_core::{HistoryRecord, StatusSnapshot};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Newest first.
    pub records: Vec<HistoryRecord>,
    pub total: usize,
}

/// GET /api/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.store().latest().as_ref().clone())
}

/// GET /api/history
pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<HistoryResponse> {
    let records = state.store().history();
    let total = records.len();
    Json(HistoryResponse { records, total })
}
