//! Handlers for the `/projects` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use storyboard_core::inputs::{CreateProject, UpdateProject, UpdateStyle};
use storyboard_core::project::{Project, ProjectStats, ProjectSummary, StyleConfig};
use storyboard_core::types::EntityId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// A project with its disk-derived stats.
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub stats: ProjectStats,
}

impl From<Project> for ProjectDetail {
    fn from(project: Project) -> Self {
        let stats = project.stats();
        Self { project, stats }
    }
}

/// POST /api/v1/projects
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateProject>,
) -> AppResult<(StatusCode, Json<DataResponse<ProjectDetail>>)> {
    let project = state.store.create(input.into_project()?).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(project.into()))))
}

/// GET /api/v1/projects
pub async fn list(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<ProjectSummary>>>> {
    let projects = state.store.list().await;
    Ok(Json(DataResponse::new(projects)))
}

/// GET /api/v1/projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<ProjectDetail>>> {
    let project = state.store.get(id).await?;
    Ok(Json(DataResponse::new(project.into())))
}

/// PUT /api/v1/projects/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<UpdateProject>,
) -> AppResult<Json<DataResponse<ProjectDetail>>> {
    let expected = input.expected_version;
    state.store.update(id, expected, |p| input.apply(p)).await?;
    let project = state.store.get(id).await?;
    Ok(Json(DataResponse::new(project.into())))
}

/// DELETE /api/v1/projects/{id}
pub async fn delete(State(state): State<AppState>, Path(id): Path<EntityId>) -> AppResult<StatusCode> {
    state.store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/projects/{id}/style
pub async fn update_style(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    Json(input): Json<UpdateStyle>,
) -> AppResult<Json<DataResponse<StyleConfig>>> {
    let expected = input.expected_version;
    let style = state
        .store
        .update(id, expected, |p| {
            input.apply(&mut p.style)?;
            Ok(p.style.clone())
        })
        .await?;
    Ok(Json(DataResponse::new(style)))
}

/// GET /api/v1/projects/{id}/stats
///
/// Completion is re-read from disk on every call.
pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<ProjectStats>>> {
    let project = state.store.get(id).await?;
    Ok(Json(DataResponse::new(project.stats())))
}
