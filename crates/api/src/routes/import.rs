//! Route definitions for `/import`.

use axum::routing::post;
use axum::Router;

use crate::handlers::import;
use crate::state::AppState;

/// Routes mounted at `/import`.
///
/// ```text
/// POST   /upload     -> upload
/// POST   /analyze    -> analyze
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(import::upload))
        .route("/analyze", post(import::analyze))
}
