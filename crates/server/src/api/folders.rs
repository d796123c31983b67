//! Read-only listings of the managed folders.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use ingest_core::fsops::{list_files, FileEntry};

use super::handlers::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FolderResponse {
    pub folder: String,
    pub path: PathBuf,
    pub files: Vec<FileEntry>,
}

/// GET /api/folders/{name}
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<FolderResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(dir) = state.config().paths.managed_folder(&name) else {
        return Err((
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("Unknown folder: {}", name)),
        ));
    };

    match list_files(dir) {
        Ok(files) => Ok(Json(FolderResponse {
            folder: name,
            path: dir.clone(),
            files,
        })),
        Err(e) => {
            warn!("Cannot list folder {}: {}", dir.display(), e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(format!("Cannot list {}: {}", name, e)),
            ))
        }
    }
}
