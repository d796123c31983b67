//! Pause and resume. Only the pause flag is touched here.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub paused: bool,
}

/// POST /api/control/pause
pub async fn pause(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    state.control().pause();
    Json(ControlResponse {
        paused: state.control().is_paused(),
    })
}

/// POST /api/control/resume
pub async fn resume(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    state.control().resume();
    Json(ControlResponse {
        paused: state.control().is_paused(),
    })
}
