//! Built-in sample stories.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use storyboard_core::reconcile::ImportReport;
use storyboard_core::samples::{self, SampleInfo};

use crate::error::AppResult;
use crate::handlers::project::ProjectDetail;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoadSample {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct LoadedSample {
    pub project: ProjectDetail,
    pub report: ImportReport,
}

/// GET /api/v1/examples
pub async fn list() -> Json<DataResponse<Vec<SampleInfo>>> {
    Json(DataResponse::new(samples::list()))
}

/// POST /api/v1/examples/load
///
/// Creates a new project through the same reconciliation as import-apply.
pub async fn load(
    State(state): State<AppState>,
    Json(input): Json<LoadSample>,
) -> AppResult<(StatusCode, Json<DataResponse<LoadedSample>>)> {
    let sample = samples::find(&input.key)?;
    let (project, report) = sample.load(state.settings.match_threshold)?;
    let project = state.store.create(project).await?;
    tracing::info!(key = sample.key, project_id = %project.id, "Sample loaded");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(LoadedSample {
            project: project.into(),
            report,
        })),
    ))
}
