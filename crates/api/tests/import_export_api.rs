//! HTTP-level integration tests for upload, analysis, import-apply,
//! export/download and the built-in samples.

mod common;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use common::{
    body_bytes, body_json, create_project, get, post_file, post_json, FakeTextProvider, Providers,
};
use serde_json::json;
use storyboard_api::router::build_app_router;
use storyboard_core::export_pdf::{find_font, SYSTEM_CJK_FONTS};

const STORY_JSON: &str = r#"```json
{
  "project_name": "深夜停车场",
  "genre": "都市情感",
  "characters": [{"name": "阿杰", "age": "28", "gender": "男"}],
  "scenes": [{"name": "地下停车场", "lighting": "冷白顶灯"}],
  "props": [{"name": "礼物盒"}],
  "shots": [
    {"description": "阿杰提着礼物盒", "characters": ["阿杰"], "scene": "地下停车场"},
    {"description": "礼物盒落地", "characters": ["小雨"], "scene": "地下停车场"}
  ]
}
```"#;

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_text_extracts_content() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_file(app, "/api/v1/import/upload", "script.txt", "第一场\n夜。".as_bytes()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["file_type"], "text");
    assert_eq!(json["data"]["original_name"], "script.txt");
    assert!(json["data"]["text"].as_str().unwrap().contains("夜。"));
    let stored = json["data"]["filename"].as_str().unwrap();
    assert!(stored.ends_with(".txt"));
    assert!(tmp.path().join("uploads").join(stored).is_file());
}

#[tokio::test]
async fn upload_html_strips_markup() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());
    let html = "<html><head><style>p{}</style></head><body><p>Tom &amp; Jerry</p></body></html>";

    let response = post_file(app, "/api/v1/import/upload", "story.HTML", html.as_bytes()).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["file_type"], "html");
    let text = json["data"]["text"].as_str().unwrap();
    assert!(text.contains("Tom & Jerry"));
    assert!(!text.contains("<p>"));
}

#[tokio::test]
async fn upload_image_has_no_text() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_file(app, "/api/v1/import/upload", "ref.png", b"\x89PNG").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["file_type"], "image");
    assert!(json["data"].get("text").is_none());
}

#[tokio::test]
async fn disallowed_extension_returns_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_file(app, "/api/v1/import/upload", "run.exe", b"MZ").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        std::fs::read_dir(tmp.path().join("uploads")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn oversized_upload_returns_413() {
    let tmp = tempfile::tempdir().unwrap();
    let mut settings = common::test_settings(tmp.path());
    settings.max_upload_size_mb = 1;
    let app = storyboard_api::router::build_app_router(
        common::test_state(settings, Providers::default()),
        &common::test_config(),
    );
    let big = vec![b'a'; 1024 * 1024 + 100];

    let response = post_file(app, "/api/v1/import/upload", "big.txt", &big).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ---------------------------------------------------------------------------
// Analyze and apply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_without_provider_returns_503() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_json(app, "/api/v1/import/analyze", json!({"text": "一个故事"})).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn analyze_parses_provider_reply() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app_with(
        tmp.path(),
        Providers {
            text: Some(Arc::new(FakeTextProvider(STORY_JSON.to_string()))),
            ..Providers::default()
        },
    );

    let response = post_json(app, "/api/v1/import/analyze", json!({"text": "男主在停车场撞见女友"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["project_name"], "深夜停车场");
    assert_eq!(json["data"]["characters"][0]["name"], "阿杰");
    assert_eq!(json["data"]["shots"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn analyze_empty_text_returns_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app_with(
        tmp.path(),
        Providers {
            text: Some(Arc::new(FakeTextProvider("{}".to_string()))),
            ..Providers::default()
        },
    );

    let response = post_json(app, "/api/v1/import/analyze", json!({"text": "   "})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn apply_merges_story_into_project() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());
    let id = create_project(&app, "Import").await;
    post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/characters"),
        json!({"name": "阿杰"}),
    )
    .await;

    let response = post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/import/apply"),
        json!({"json_content": STORY_JSON}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["data"]["characters_matched"], 1);
    assert_eq!(report["data"]["characters_added"], 0);
    assert_eq!(report["data"]["scenes_added"], 1);
    assert_eq!(report["data"]["props_added"], 1);
    assert_eq!(report["data"]["shots_added"], 2);
    assert_eq!(report["data"]["unresolved_names"], json!(["小雨"]));

    let project = body_json(get(app, &format!("/api/v1/projects/{id}")).await).await;
    assert_eq!(project["data"]["characters"].as_array().unwrap().len(), 1);
    assert_eq!(project["data"]["characters"][0]["age"], "28");
    assert_eq!(project["data"]["shots"][1]["shot_number"], 2);
}

#[tokio::test]
async fn apply_unparseable_content_returns_400() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());
    let id = create_project(&app, "Import").await;

    let response = post_json(
        app,
        &format!("/api/v1/projects/{id}/import/apply"),
        json!({"json_content": "not json at all"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Export and download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_then_download() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());
    let id = create_project(&app, "导出：测试").await;
    post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/shots"),
        json!({"description": "开场"}),
    )
    .await;

    let response = post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/export"),
        json!({"format": "markdown"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let filename = json["data"]["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("导出_测试_"));
    assert!(filename.ends_with(".md"));
    let url = json["data"]["download_url"].as_str().unwrap().to_string();
    assert!(url.ends_with(&filename));

    let uri = format!("/api/v1/exports/{}", urlencode(&filename));
    let response = get(app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/markdown; charset=utf-8"
    );
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("开场"));
}

#[tokio::test]
async fn export_defaults_to_html() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());
    let id = create_project(&app, "Plain").await;

    let json = body_json(post_json(app, &format!("/api/v1/projects/{id}/export"), json!({})).await).await;

    assert_eq!(json["data"]["format"], "html");
    assert!(json["data"]["filename"].as_str().unwrap().ends_with(".html"));
}

#[tokio::test]
async fn pdf_export_needs_a_font() {
    let tmp = tempfile::tempdir().unwrap();
    let mut settings = common::test_settings(tmp.path());
    settings.pdf_font_path = Some(tmp.path().join("missing.ttf"));
    let app = build_app_router(common::test_state(settings, Providers::default()), &common::test_config());
    let id = create_project(&app, "分镜").await;
    post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/shots"),
        json!({"description": "开场"}),
    )
    .await;

    let response = post_json(
        app.clone(),
        &format!("/api/v1/projects/{id}/export"),
        json!({"format": "pdf"}),
    )
    .await;

    if find_font(None, SYSTEM_CJK_FONTS).is_none() {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "UNSUPPORTED");
        return;
    }
    assert_eq!(response.status(), StatusCode::CREATED);
    let filename = body_json(response).await["data"]["filename"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(filename.ends_with(".pdf"));
    let response = get(app, &format!("/api/v1/exports/{}", urlencode(&filename))).await;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert!(body_bytes(response).await.starts_with(b"%PDF"));
}

#[tokio::test]
async fn download_rejects_unsafe_names() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = get(app, "/api/v1/exports/..%2Fprojects").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_missing_export_returns_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = get(app, "/api/v1/exports/nothing_here.html").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Percent-encode non-ASCII bytes for a path segment.
fn urlencode(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-_.".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

#[tokio::test]
async fn examples_are_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let json = body_json(get(app, "/api/v1/examples").await).await;

    let keys: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["parking_lot", "lucky_pony"]);
}

#[tokio::test]
async fn loading_a_sample_creates_a_project() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_json(app.clone(), "/api/v1/examples/load", json!({"key": "parking_lot"})).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["project"]["name"], "深夜停车场");
    assert!(json["data"]["report"]["shots_added"].as_u64().unwrap() > 0);

    let list = body_json(get(app, "/api/v1/projects").await).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_sample_returns_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path());

    let response = post_json(app, "/api/v1/examples/load", json!({"key": "nope"})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
