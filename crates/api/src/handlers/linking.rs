//! Batch listing and file-to-shot linking against a project's output folder.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use storyboard_core::batch_linker::{self, BatchInfo, LinkReport};
use storyboard_core::error::CoreError;
use storyboard_core::types::EntityId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BatchListing {
    pub directory: PathBuf,
    pub batches: Vec<BatchInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LinkRequest {
    /// Restrict linking to one batch; all files otherwise.
    pub batch_index: Option<usize>,
}

/// GET /api/v1/projects/{id}/batches
pub async fn list_batches(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<BatchListing>>> {
    let project = state.store.get(project_id).await?;
    let directory = state.project_outputs(&project.name);
    let files = batch_linker::scan_images(&directory)
        .map_err(|e| CoreError::Internal(format!("scan {}: {e}", directory.display())))?;
    let batches = batch_linker::describe_batches(&files, state.batch_threshold());
    Ok(Json(DataResponse::new(BatchListing { directory, batches })))
}

/// POST /api/v1/projects/{id}/link
///
/// A file/shot count mismatch is not an error: nothing is linked and the
/// report message says why. The project is only saved when something was
/// linked.
pub async fn link(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
    Json(input): Json<LinkRequest>,
) -> AppResult<Json<DataResponse<LinkReport>>> {
    let threshold = state.batch_threshold();
    let outputs = state.settings.outputs_dir();

    let mut draft = state.store.get(project_id).await?;
    let directory = storyboard_core::naming::project_output_dir(&outputs, &draft.name);
    let preview = batch_linker::link_project(&mut draft, &directory, input.batch_index, threshold)?;
    if preview.linked == 0 {
        return Ok(Json(DataResponse::new(preview)));
    }

    let report = state
        .store
        .update(project_id, None, |p| {
            let directory = storyboard_core::naming::project_output_dir(&outputs, &p.name);
            batch_linker::link_project(p, &directory, input.batch_index, threshold)
        })
        .await?;
    Ok(Json(DataResponse::new(report)))
}
