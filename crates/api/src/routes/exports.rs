use axum::routing::get;
use axum::Router;

use crate::handlers::export;
use crate::state::AppState;

/// Routes mounted at `/exports`.
///
/// ```text
/// GET    /{filename}  -> download
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{filename}", get(export::download))
}
