use axum::routing::{get, post};
use axum::Router;

use crate::handlers::examples;
use crate::state::AppState;

/// Routes mounted at `/examples`.
///
/// ```text
/// GET    /       -> list
/// POST   /load   -> load
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(examples::list))
        .route("/load", post(examples::load))
}
