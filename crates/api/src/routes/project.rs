//! Route definitions for the `/projects` resource.
//!
//! Entities, shots, generation, linking, import and export are all
//! scoped to a project and nested under `/projects/{id}/...`.

use axum::routing::{get, post, put};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;

use storyboard_core::inputs::{CharacterInput, EntityInput, PropInput, SceneInput};
use storyboard_core::project::{Character, Prop, Scene};
use storyboard_core::references::ReferenceSubject;

use crate::handlers::{entity, export, generation, import, linking, project, shot};
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /                                  -> list
/// POST   /                                  -> create
/// GET    /{id}                              -> get_by_id
/// PUT    /{id}                              -> update
/// DELETE /{id}                              -> delete
/// PUT    /{id}/style                        -> update_style
/// GET    /{id}/stats                        -> stats
///
/// GET    /{id}/characters                   -> entity::list
/// POST   /{id}/characters                   -> entity::create
/// GET    /{id}/characters/{entity_id}       -> entity::get_by_id
/// PUT    /{id}/characters/{entity_id}       -> entity::update
/// DELETE /{id}/characters/{entity_id}       -> entity::delete
/// POST   /{id}/characters/{entity_id}/generate -> generation::generate_reference
/// (same for /scenes and /props)
///
/// GET    /{id}/shots                        -> shot::list
/// POST   /{id}/shots                        -> shot::create
/// GET    /{id}/shots/{shot_id}              -> shot::get_by_id
/// PUT    /{id}/shots/{shot_id}              -> shot::update
/// DELETE /{id}/shots/{shot_id}              -> shot::delete
/// POST   /{id}/shots/{shot_id}/move         -> shot::move_shot
/// GET    /{id}/shots/{shot_id}/prompt       -> shot::prompt
/// POST   /{id}/shots/{shot_id}/generate     -> generation::generate_image
/// POST   /{id}/shots/{shot_id}/video        -> generation::generate_video
/// POST   /{id}/generate/all                 -> generation::generate_all
///
/// GET    /{id}/batches                      -> linking::list_batches
/// POST   /{id}/link                         -> linking::link
/// POST   /{id}/import/apply                 -> import::apply
/// POST   /{id}/export                       -> export::export
/// ```
pub fn router() -> Router<AppState> {
    let shot_routes = Router::new()
        .route("/", get(shot::list).post(shot::create))
        .route(
            "/{shot_id}",
            get(shot::get_by_id).put(shot::update).delete(shot::delete),
        )
        .route("/{shot_id}/move", post(shot::move_shot))
        .route("/{shot_id}/prompt", get(shot::prompt))
        .route("/{shot_id}/generate", post(generation::generate_image))
        .route("/{shot_id}/video", post(generation::generate_video));

    Router::new()
        .route("/", get(project::list).post(project::create))
        .route(
            "/{id}",
            get(project::get_by_id)
                .put(project::update)
                .delete(project::delete),
        )
        .route("/{id}/style", put(project::update_style))
        .route("/{id}/stats", get(project::stats))
        .nest("/{id}/characters", entity_routes::<Character, CharacterInput>())
        .nest("/{id}/scenes", entity_routes::<Scene, SceneInput>())
        .nest("/{id}/props", entity_routes::<Prop, PropInput>())
        .nest("/{id}/shots", shot_routes)
        .route("/{id}/generate/all", post(generation::generate_all))
        .route("/{id}/batches", get(linking::list_batches))
        .route("/{id}/link", post(linking::link))
        .route("/{id}/import/apply", post(import::apply))
        .route("/{id}/export", post(export::export))
}

/// CRUD and reference generation routes for one entity kind.
fn entity_routes<T, I>() -> Router<AppState>
where
    T: ReferenceSubject + Default + Serialize + Send + Sync + 'static,
    I: EntityInput<T> + DeserializeOwned + Send + 'static,
{
    Router::new()
        .route("/", get(entity::list::<T>).post(entity::create::<T, I>))
        .route(
            "/{entity_id}",
            get(entity::get_by_id::<T>)
                .put(entity::update::<T, I>)
                .delete(entity::delete::<T>),
        )
        .route("/{entity_id}/generate", post(generation::generate_reference::<T>))
}
