//! Tail of the engine log file.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use ingest_core::fsops::tail_lines;

use super::handlers::ErrorResponse;
use crate::state::AppState;

const DEFAULT_LINES: usize = 100;
const MAX_LINES: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

/// GET /api/logs?lines=N
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let count = query.lines.unwrap_or(DEFAULT_LINES).clamp(1, MAX_LINES);
    let path = state.config().paths.log_file();

    match tail_lines(&path, count) {
        Ok(lines) => Ok(Json(LogsResponse { path, lines })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(format!("Cannot read log file: {}", e)),
        )),
    }
}
