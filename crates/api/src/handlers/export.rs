//! Storyboard export and export file downloads.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use storyboard_core::error::CoreError;
use storyboard_core::export::{self, ExportFormat};
use storyboard_core::naming::is_safe_download_name;
use storyboard_core::types::EntityId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_format")]
    pub format: ExportFormat,
}

fn default_format() -> ExportFormat {
    ExportFormat::Html
}

#[derive(Debug, Serialize)]
pub struct ExportResult {
    pub filename: String,
    pub format: ExportFormat,
    pub download_url: String,
}

/// POST /api/v1/projects/{id}/export
pub async fn export(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
    Json(input): Json<ExportRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ExportResult>>)> {
    let project = state.store.get(project_id).await?;
    let settings = state.settings.clone();
    let format = input.format;
    let path = tokio::task::spawn_blocking(move || {
        export::write_export(
            &project,
            format,
            &settings.base_dir,
            &settings.exports_dir(),
            settings.pdf_font_path.as_deref(),
            Utc::now(),
        )
    })
    .await
    .map_err(|e| AppError::InternalError(format!("export task failed: {e}")))??;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::InternalError(format!("bad export path {}", path.display())))?
        .to_string();
    let result = ExportResult {
        download_url: format!("/api/v1/exports/{filename}"),
        filename,
        format,
    };
    Ok((StatusCode::CREATED, Json(DataResponse::new(result))))
}

/// GET /api/v1/exports/{filename}
///
/// Only bare names resolving inside the exports directory are served.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    if !is_safe_download_name(&filename) {
        return Err(AppError::BadRequest(format!("Invalid filename '{filename}'")));
    }

    let exports = state.settings.exports_dir();
    let not_found = || AppError::Core(CoreError::not_found("Export", &filename));
    let root = tokio::fs::canonicalize(&exports).await.map_err(|_| not_found())?;
    let path = tokio::fs::canonicalize(exports.join(&filename))
        .await
        .map_err(|_| not_found())?;
    if !path.starts_with(&root) {
        return Err(AppError::BadRequest(format!("Invalid filename '{filename}'")));
    }

    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();
    let stream = ReaderStream::new(file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ExportFormat::content_type_for(&filename))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
