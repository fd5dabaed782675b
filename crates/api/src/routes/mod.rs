pub mod examples;
pub mod exports;
pub mod health;
pub mod import;
pub mod project;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /projects                                   list, create
///     /{id}                                   get, update, delete
///     /{id}/style                             update style
///     /{id}/stats                             stats
///     /{id}/characters|scenes|props           list, create
///     /{id}/characters|scenes|props/{eid}     get, update, delete
///     /{id}/characters|scenes|props/{eid}/generate  reference image
///     /{id}/shots                             list, create
///     /{id}/shots/{shot_id}                   get, update, delete
///     /{id}/shots/{shot_id}/move              move up/down
///     /{id}/shots/{shot_id}/prompt            rendered prompt
///     /{id}/shots/{shot_id}/generate          image generation
///     /{id}/shots/{shot_id}/video             video generation
///     /{id}/generate/all                      generate every pending shot
///     /{id}/batches                           output batches
///     /{id}/link                              link output files to shots
///     /{id}/import/apply                      merge a story analysis
///     /{id}/export                            write an export file
///
/// /import/upload                              multipart upload + text extraction
/// /import/analyze                             story analysis via the text provider
///
/// /exports/{filename}                         download an export
///
/// /examples                                   built-in sample stories
/// /examples/load                              create a project from a sample
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/projects", project::router())
        .nest("/import", import::router())
        .nest("/exports", exports::router())
        .nest("/examples", examples::router())
}
