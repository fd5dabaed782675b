#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use storyboard_api::config::ServerConfig;
use storyboard_api::router::build_app_router;
use storyboard_api::state::AppState;
use storyboard_core::generation::{
    verify_output, GenerationError, ImageProvider, ImageRequest, TextProvider, VideoProvider,
    VideoRequest,
};
use storyboard_core::settings::Settings;
use storyboard_db::ProjectStore;
use storyboard_llm::StoryAnalyzer;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin and a 30-second request
/// timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        invalid_values: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Fake providers
// ---------------------------------------------------------------------------

/// Writes a few bytes to the requested path and counts calls.
#[derive(Default)]
pub struct FakeImageProvider {
    pub calls: AtomicUsize,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl FakeImageProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for FakeImageProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn model_suffix(&self) -> &str {
        "fake"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<PathBuf, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some(parent) = request.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.output_path, b"\x89PNG fake")?;
        verify_output(&request.output_path)
    }
}

/// Always fails with a network error.
pub struct FailingImageProvider;

#[async_trait]
impl ImageProvider for FailingImageProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn model_suffix(&self) -> &str {
        "fail"
    }

    async fn generate_image(&self, _request: &ImageRequest) -> Result<PathBuf, GenerationError> {
        Err(GenerationError::Network("connection refused".into()))
    }
}

pub struct FakeVideoProvider;

#[async_trait]
impl VideoProvider for FakeVideoProvider {
    fn name(&self) -> &str {
        "fake-video"
    }

    async fn generate_video(&self, request: &VideoRequest) -> Result<PathBuf, GenerationError> {
        std::fs::write(&request.output_path, b"fake mp4")?;
        verify_output(&request.output_path)
    }
}

/// Replies with a fixed text.
pub struct FakeTextProvider(pub String);

#[async_trait]
impl TextProvider for FakeTextProvider {
    fn name(&self) -> &str {
        "fake-text"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Optional providers wired into a test state.
#[derive(Default)]
pub struct Providers {
    pub image: Option<Arc<dyn ImageProvider>>,
    pub video: Option<Arc<dyn VideoProvider>>,
    pub text: Option<Arc<dyn TextProvider>>,
}

/// Settings rooted at `base_dir` with its directories created.
pub fn test_settings(base_dir: &Path) -> Settings {
    let settings = Settings::with_base_dir(base_dir);
    settings.ensure_directories().unwrap();
    settings
}

pub fn test_state(settings: Settings, providers: Providers) -> AppState {
    AppState {
        store: Arc::new(ProjectStore::new(settings.projects_dir())),
        settings: Arc::new(settings),
        config: Arc::new(test_config()),
        analyzer: providers.text.map(|p| Arc::new(StoryAnalyzer::new(p))),
        image_provider: providers.image,
        video_provider: providers.video,
    }
}

/// Build the full application router with all middleware layers over an
/// empty store rooted at `base_dir`.
pub fn build_test_app(base_dir: &Path) -> Router {
    build_app_router(test_state(test_settings(base_dir), Providers::default()), &test_config())
}

pub fn build_test_app_with(base_dir: &Path, providers: Providers) -> Router {
    build_app_router(test_state(test_settings(base_dir), providers), &test_config())
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a single-file multipart form under the `file` field.
pub async fn post_file(app: Router, uri: &str, filename: &str, contents: &[u8]) -> Response<Body> {
    const BOUNDARY: &str = "storyboard-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Create a project and return its id.
pub async fn create_project(app: &Router, name: &str) -> String {
    let response = post_json(
        app.clone(),
        "/api/v1/projects",
        serde_json::json!({ "name": name }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}
