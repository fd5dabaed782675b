//! Tests for the root-level `/health` endpoint and shared middleware.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};

#[tokio::test]
async fn health_returns_ok_with_version() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["storage_healthy"], true);
    assert_eq!(json["project_count"], 0);
    assert!(json["image_backend"].is_null());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = get(app, "/health").await;

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = get(app, "/api/v1/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
