//! REST client for the cloud generation service.
//!
//! Every endpoint takes a bearer token and returns JSON. Long-running jobs
//! are submitted, then polled by id until a terminal status appears.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use storyboard_core::generation::GenerationError;

/// Whole-request timeout for a single HTTP call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Response bodies kept in error messages are cut to this many chars.
const MAX_BODY_CHARS: usize = 300;

/// HTTP client for the cloud generation API.
#[derive(Clone)]
pub struct CloudApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Errors from the cloud REST layer.
#[derive(Debug, thiserror::Error)]
pub enum CloudApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Cloud API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Response is missing '{0}'")]
    MissingField(&'static str),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job still running after {attempts} polls")]
    PollTimeout { attempts: u32 },

    #[error("Downloaded file is not a usable image: {0}")]
    InvalidImage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CloudApiError> for GenerationError {
    fn from(e: CloudApiError) -> Self {
        match e {
            CloudApiError::Request(e) if e.is_timeout() => GenerationError::Timeout(REQUEST_TIMEOUT),
            CloudApiError::Request(e) => GenerationError::Network(e.to_string()),
            CloudApiError::ApiError { status, body } => GenerationError::Status { status, body },
            CloudApiError::Io(e) => GenerationError::Io(e),
            other => GenerationError::Failed(other.to_string()),
        }
    }
}

/// Polling cadence for an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl CloudApi {
    /// * `base_url` - e.g. `https://api.canghe.ai`; a trailing slash is ignored.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, base_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CloudApiError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CloudApiError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Fetch a result URL. Result hosts are public, so no auth header.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, CloudApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download `url` into `dest`, creating parent directories.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, CloudApiError> {
        let bytes = self.download(url).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CloudApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CloudApiError::ApiError {
                status: status.as_u16(),
                body: body.chars().take(MAX_BODY_CHARS).collect(),
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CloudApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let api = CloudApi::new("https://api.example.com/", "key");
        assert_eq!(api.url("/v1/video/create"), "https://api.example.com/v1/video/create");
    }

    #[test]
    fn api_errors_keep_status() {
        let err: GenerationError = CloudApiError::ApiError {
            status: 402,
            body: "insufficient balance".into(),
        }
        .into();
        assert_matches!(err, GenerationError::Status { status: 402, .. });
    }

    #[test]
    fn job_failures_become_failed() {
        let err: GenerationError = CloudApiError::JobFailed("nsfw".into()).into();
        assert_matches!(err, GenerationError::Failed(msg) if msg.contains("nsfw"));
        let err: GenerationError = CloudApiError::PollTimeout { attempts: 60 }.into();
        assert_matches!(err, GenerationError::Failed(msg) if msg.contains("60"));
    }
}
