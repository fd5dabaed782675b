//! Handlers for `/projects/{id}/shots`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use storyboard_core::error::CoreError;
use storyboard_core::generation::{collect_reference_images, WeightedReference};
use storyboard_core::inputs::ShotInput;
use storyboard_core::project::{MoveDirection, Project, Shot, ShotStatus};
use storyboard_core::shot_prompt;
use storyboard_core::types::EntityId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// A shot with its status read from disk.
#[derive(Debug, Serialize)]
pub struct ShotView {
    #[serde(flatten)]
    pub shot: Shot,
    pub status: ShotStatus,
    pub has_video: bool,
}

impl From<Shot> for ShotView {
    fn from(shot: Shot) -> Self {
        Self {
            status: shot.status(),
            has_video: shot.video_exists(),
            shot,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveShot {
    pub direction: MoveDirection,
}

#[derive(Debug, Serialize)]
pub struct MoveResult {
    /// False when the shot was already at that end of the list.
    pub moved: bool,
    pub shot_number: u32,
}

/// The eleven-field prompt block and what generation would send.
#[derive(Debug, Serialize)]
pub struct ShotPrompt {
    pub prompt: String,
    pub generation_prompt: String,
    pub negative_prompt: &'static str,
    pub references: Vec<WeightedReference>,
}

fn find_shot(project: &Project, shot_id: EntityId) -> Result<&Shot, CoreError> {
    project
        .shot(shot_id)
        .ok_or_else(|| CoreError::not_found("Shot", shot_id))
}

/// GET /api/v1/projects/{id}/shots
pub async fn list(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Vec<ShotView>>>> {
    let project = state.store.get(project_id).await?;
    let shots = project.shots.into_iter().map(ShotView::from).collect();
    Ok(Json(DataResponse::new(shots)))
}

/// POST /api/v1/projects/{id}/shots
///
/// Appends unless `position` is given; numbers stay dense either way.
pub async fn create(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
    Json(input): Json<ShotInput>,
) -> AppResult<(StatusCode, Json<DataResponse<ShotView>>)> {
    let expected = input.expected_version;
    let position = input.position;
    let shot = state
        .store
        .update(project_id, expected, |p| {
            let mut shot = Shot::default();
            input.apply(p, &mut shot)?;
            match position {
                Some(index) => p.insert_shot_at(index, shot).cloned(),
                None => p.add_shot(shot).cloned(),
            }
        })
        .await?;
    tracing::info!(project_id = %project_id, shot_id = %shot.id, shot_number = shot.shot_number, "Shot created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(shot.into()))))
}

/// GET /api/v1/projects/{id}/shots/{shot_id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<ShotView>>> {
    let project = state.store.get(project_id).await?;
    let shot = find_shot(&project, shot_id)?.clone();
    Ok(Json(DataResponse::new(shot.into())))
}

/// PUT /api/v1/projects/{id}/shots/{shot_id}
pub async fn update(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<ShotInput>,
) -> AppResult<Json<DataResponse<ShotView>>> {
    let expected = input.expected_version;
    let shot = state
        .store
        .update(project_id, expected, |p| {
            let mut draft = find_shot(p, shot_id)?.clone();
            input.apply(p, &mut draft)?;
            let slot = p
                .shot_mut(shot_id)
                .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;
            *slot = draft.clone();
            Ok(draft)
        })
        .await?;
    Ok(Json(DataResponse::new(shot.into())))
}

/// DELETE /api/v1/projects/{id}/shots/{shot_id}
pub async fn delete(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode> {
    state
        .store
        .update(project_id, None, |p| p.remove_shot(shot_id).map(drop))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/projects/{id}/shots/{shot_id}/move
pub async fn move_shot(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<MoveShot>,
) -> AppResult<Json<DataResponse<MoveResult>>> {
    let result = state
        .store
        .update(project_id, None, |p| {
            let moved = p.move_shot(shot_id, input.direction)?;
            let shot_number = find_shot(p, shot_id)?.shot_number;
            Ok(MoveResult { moved, shot_number })
        })
        .await?;
    Ok(Json(DataResponse::new(result)))
}

/// GET /api/v1/projects/{id}/shots/{shot_id}/prompt
pub async fn prompt(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<ShotPrompt>>> {
    let project = state.store.get(project_id).await?;
    let shot = find_shot(&project, shot_id)?;
    let prompt = ShotPrompt {
        prompt: shot_prompt::render_prompt(shot, &project),
        generation_prompt: shot_prompt::generation_prompt(shot, &project, None),
        negative_prompt: shot_prompt::template(&shot.template).negative_prompt,
        references: collect_reference_images(shot, &project),
    };
    Ok(Json(DataResponse::new(prompt)))
}
