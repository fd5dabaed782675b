//! REST client for a local ComfyUI server.
//!
//! Covers the endpoints image generation needs: the `/system_stats`
//! connection check, `/upload/image` for reference images, `/prompt`
//! submission, `/history/{id}` polling and `/view` downloads.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use storyboard_core::generation::GenerationError;

/// Per-request timeout. Long renders are polled, never awaited in one call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `/prompt` after queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
    #[serde(default)]
    subfolder: String,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, refused connection).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ComfyUIApiError> for GenerationError {
    fn from(e: ComfyUIApiError) -> Self {
        match e {
            ComfyUIApiError::Request(e) if e.is_timeout() => GenerationError::Timeout(REQUEST_TIMEOUT),
            ComfyUIApiError::Request(e) => GenerationError::Network(format!("ComfyUI: {e}")),
            ComfyUIApiError::ApiError { status, body } => GenerationError::Status { status, body },
            ComfyUIApiError::Io(e) => GenerationError::Io(e),
        }
    }
}

impl ComfyUIApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Connection test: `GET /system_stats`.
    pub async fn system_stats(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Upload a local image into ComfyUI's input folder and return the
    /// name a `LoadImage` node should reference.
    pub async fn upload_image(&self, path: &Path) -> Result<String, ComfyUIApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("reference.png")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("type", "input")
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::parse_response(response).await?;
        Ok(if uploaded.subfolder.is_empty() {
            uploaded.name
        } else {
            format!("{}/{}", uploaded.subfolder, uploaded.name)
        })
    }

    /// Queue a workflow (`POST /prompt`).
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Execution history for a prompt. Empty (`{}`) until the run finishes.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file (`GET /view`).
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
