//! Document upload, story analysis and applying an analysis to a project.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use storyboard_core::document::{self, FileType};
use storyboard_core::reconcile::{apply_story, ImportReport};
use storyboard_core::story::{parse_story, StoryAnalysis};
use storyboard_core::types::EntityId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResult {
    /// Stored name under the uploads directory.
    pub filename: String,
    pub original_name: String,
    pub file_type: FileType,
    pub size: usize,
    /// Extracted text, for document types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyImport {
    pub json_content: String,
    pub expected_version: Option<u64>,
}

/// POST /api/v1/import/upload
///
/// Accepts one `file` field. The extension must be in the allowlist (400)
/// and the size within the limit (413). Text is extracted from documents
/// before the file is stored as `uploads/{uuid}.{ext}`.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadResult>>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        if !state.settings.is_allowed_upload(FsPath::new(&original_name)) {
            return Err(AppError::BadRequest(format!(
                "File type not allowed: '{original_name}'"
            )));
        }
        let ext = FsPath::new(&original_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let data = field.bytes().await?;
        let limit = state.settings.max_upload_bytes();
        if data.len() as u64 > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File is {} bytes; the limit is {} MB",
                data.len(),
                state.settings.max_upload_size_mb
            )));
        }

        let file_type = FileType::from_extension(&ext);
        let text = if file_type.is_document() {
            let bytes = data.clone();
            let ext = ext.clone();
            let extracted = tokio::task::spawn_blocking(move || {
                document::extract_text_from_bytes(&bytes, &ext)
            })
            .await
            .map_err(|e| AppError::InternalError(format!("text extraction task failed: {e}")))??;
            Some(extracted)
        } else {
            None
        };

        let uploads = state.settings.uploads_dir();
        tokio::fs::create_dir_all(&uploads)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create uploads dir: {e}")))?;
        let filename = format!("{}.{ext}", uuid::Uuid::new_v4());
        tokio::fs::write(uploads.join(&filename), &data)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;
        tracing::info!(%filename, %original_name, size = data.len(), ?file_type, "Upload stored");

        let result = UploadResult {
            filename,
            original_name,
            file_type,
            size: data.len(),
            text,
        };
        return Ok((StatusCode::CREATED, Json(DataResponse::new(result))));
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{FILE_FIELD}' is required"
    )))
}

/// POST /api/v1/import/analyze
pub async fn analyze(
    State(state): State<AppState>,
    Json(input): Json<AnalyzeRequest>,
) -> AppResult<Json<DataResponse<StoryAnalysis>>> {
    let analyzer = state
        .analyzer
        .clone()
        .ok_or_else(|| AppError::ServiceUnavailable("No text provider is configured".into()))?;
    let analysis = analyzer.analyze(&input.text).await?;
    Ok(Json(DataResponse::new(analysis)))
}

/// POST /api/v1/projects/{id}/import/apply
///
/// Entities are fuzzy-matched against existing names: matches only fill
/// empty fields, everything else is created. Shots are appended.
pub async fn apply(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
    Json(input): Json<ApplyImport>,
) -> AppResult<Json<DataResponse<ImportReport>>> {
    let story = parse_story(&input.json_content)?;
    let threshold = state.settings.match_threshold;
    let report = state
        .store
        .update(project_id, input.expected_version, |p| {
            Ok(apply_story(p, &story, threshold))
        })
        .await?;
    tracing::info!(
        project_id = %project_id,
        shots_added = report.shots_added,
        unresolved = report.unresolved_names.len(),
        "Story applied"
    );
    Ok(Json(DataResponse::new(report)))
}
