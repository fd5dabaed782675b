//! Generic CRUD handlers for characters, scenes and props.
//!
//! Each route instantiates these with the entity type and its input
//! payload, e.g. `entity::create::<Character, CharacterInput>`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use storyboard_core::error::CoreError;
use storyboard_core::inputs::{create_entity, update_entity, EntityInput};
use storyboard_core::project::Entity;
use storyboard_core::types::EntityId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/projects/{id}/{kind}
pub async fn list<T>(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Vec<T>>>>
where
    T: Entity + Serialize,
{
    let project = state.store.get(project_id).await?;
    Ok(Json(DataResponse::new(project.entities::<T>().to_vec())))
}

/// POST /api/v1/projects/{id}/{kind}
pub async fn create<T, I>(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
    Json(input): Json<I>,
) -> AppResult<(StatusCode, Json<DataResponse<T>>)>
where
    T: Entity + Default + Serialize,
    I: EntityInput<T>,
{
    let expected = input.expected_version();
    let entity = state
        .store
        .update(project_id, expected, |p| {
            let entity = create_entity::<T, I>(p, input)?;
            p.add_entity(entity).cloned()
        })
        .await?;
    tracing::info!(project_id = %project_id, entity_id = %entity.id(), kind = T::LABEL, "Entity created");
    Ok((StatusCode::CREATED, Json(DataResponse::new(entity))))
}

/// GET /api/v1/projects/{id}/{kind}/{entity_id}
pub async fn get_by_id<T>(
    State(state): State<AppState>,
    Path((project_id, entity_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<T>>>
where
    T: Entity + Serialize,
{
    let project = state.store.get(project_id).await?;
    let entity = project
        .entity::<T>(entity_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found(T::LABEL, entity_id))?;
    Ok(Json(DataResponse::new(entity)))
}

/// PUT /api/v1/projects/{id}/{kind}/{entity_id}
pub async fn update<T, I>(
    State(state): State<AppState>,
    Path((project_id, entity_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<I>,
) -> AppResult<Json<DataResponse<T>>>
where
    T: Entity + Serialize,
    I: EntityInput<T>,
{
    let expected = input.expected_version();
    let entity = state
        .store
        .update(project_id, expected, |p| update_entity::<T, I>(p, entity_id, input))
        .await?;
    Ok(Json(DataResponse::new(entity)))
}

/// DELETE /api/v1/projects/{id}/{kind}/{entity_id}
///
/// Also detaches the entity from every shot that referenced it.
pub async fn delete<T>(
    State(state): State<AppState>,
    Path((project_id, entity_id)): Path<(EntityId, EntityId)>,
) -> AppResult<StatusCode>
where
    T: Entity,
{
    state
        .store
        .update(project_id, None, |p| p.remove_entity::<T>(entity_id).map(drop))
        .await?;
    tracing::info!(project_id = %project_id, entity_id = %entity_id, kind = T::LABEL, "Entity deleted");
    Ok(StatusCode::NO_CONTENT)
}
