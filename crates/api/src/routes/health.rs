use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the data directory is reachable.
    pub storage_healthy: bool,
    pub project_count: usize,
    pub image_backend: Option<String>,
}

/// GET /health -- returns service and storage health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage_healthy = tokio::fs::metadata(state.store.dir())
        .await
        .is_ok_and(|m| m.is_dir());
    let project_count = state.store.list().await.len();

    let status = if storage_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        storage_healthy,
        project_count,
        image_backend: state.image_provider.as_ref().map(|p| p.name().to_string()),
    })
}

/// Mount health check routes (root level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
