//! Cloud video generation from a shot image.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use storyboard_core::generation::{verify_output, GenerationError, VideoProvider, VideoRequest};

use crate::api::{CloudApi, CloudApiError, PollPolicy};

const CREATE_PATH: &str = "/v1/video/create";
const QUERY_PATH: &str = "/v1/video/query";

pub const VIDEO_POLL: PollPolicy = PollPolicy {
    interval: Duration::from_secs(5),
    max_attempts: 120,
};

const FAILED_STATUSES: &[&str] = &[
    "failed",
    "error",
    "video_generation_failed",
    "video_upsampling_failed",
];

#[derive(Debug, Serialize)]
struct CreateVideo<'a> {
    model: &'a str,
    prompt: &'a str,
    enhance_prompt: bool,
    enable_upsample: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    /// Only the veo3 family accepts an aspect ratio.
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateResponse {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QueryResponse {
    status: String,
    video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VideoState {
    Pending(String),
    Completed(Option<String>),
    Failed(String),
}

pub(crate) fn video_state(response: QueryResponse) -> VideoState {
    let status = response.status.trim().to_ascii_lowercase();
    if status == "completed" {
        VideoState::Completed(response.video_url.filter(|u| !u.is_empty()))
    } else if FAILED_STATUSES.contains(&status.as_str()) {
        VideoState::Failed(status)
    } else {
        VideoState::Pending(status)
    }
}

/// Inline a local image as a `data:` URL.
pub fn image_data_url(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

pub struct CloudVideoProvider {
    api: CloudApi,
    default_model: String,
    poll: PollPolicy,
}

impl CloudVideoProvider {
    pub fn new(api: CloudApi, default_model: impl Into<String>) -> Self {
        Self {
            api,
            default_model: default_model.into(),
            poll: VIDEO_POLL,
        }
    }

    async fn wait_for(&self, task_id: &str) -> Result<String, CloudApiError> {
        for attempt in 1..=self.poll.max_attempts {
            let response: QueryResponse = self.api.get_json(QUERY_PATH, &[("id", task_id)]).await?;
            match video_state(response) {
                VideoState::Completed(Some(url)) => return Ok(url),
                VideoState::Completed(None) => return Err(CloudApiError::MissingField("video_url")),
                VideoState::Failed(status) => {
                    return Err(CloudApiError::JobFailed(format!("task {task_id}: {status}")))
                }
                VideoState::Pending(status) => {
                    if attempt % 6 == 1 {
                        tracing::debug!(task_id, attempt, status = %status, "Video task pending");
                    }
                }
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(CloudApiError::PollTimeout {
            attempts: self.poll.max_attempts,
        })
    }
}

#[async_trait]
impl VideoProvider for CloudVideoProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    async fn generate_video(&self, request: &VideoRequest) -> Result<PathBuf, GenerationError> {
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str());
        let images = vec![image_data_url(&request.source_image)?];
        let body = CreateVideo {
            model,
            prompt: &request.prompt,
            enhance_prompt: true,
            enable_upsample: false,
            images,
            aspect_ratio: model
                .contains("veo3")
                .then_some(request.aspect_ratio.as_str()),
        };

        let created: CreateResponse = self
            .api
            .post_json(CREATE_PATH, &body)
            .await
            .map_err(GenerationError::from)?;
        let task_id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or(CloudApiError::MissingField("id"))?;
        tracing::info!(task_id = %task_id, model, "Video task submitted");

        let url = self.wait_for(&task_id).await?;
        let bytes = self
            .api
            .download_to(&url, &request.output_path)
            .await
            .map_err(GenerationError::from)?;
        tracing::info!(path = %request.output_path.display(), bytes, "Video saved");
        verify_output(&request.output_path)
    }
}

#[cfg(test)]
mod tests {
    use storyboard_core::project::AspectRatio;

    use super::*;

    fn parse(json: &str) -> QueryResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn intermediate_statuses_are_pending() {
        for status in ["pending", "image_downloading", "video_generating", "video_upsampling"] {
            let json = format!(r#"{{"status": "{status}"}}"#);
            assert_eq!(video_state(parse(&json)), VideoState::Pending(status.to_string()));
        }
    }

    #[test]
    fn completed_carries_url() {
        let state = video_state(parse(r#"{"status": "completed", "video_url": "https://cdn/v.mp4"}"#));
        assert_eq!(state, VideoState::Completed(Some("https://cdn/v.mp4".into())));
    }

    #[test]
    fn every_failure_status_fails() {
        for status in FAILED_STATUSES {
            let json = format!(r#"{{"status": "{status}"}}"#);
            assert!(matches!(video_state(parse(&json)), VideoState::Failed(_)));
        }
    }

    #[test]
    fn aspect_ratio_only_for_veo3() {
        let body = CreateVideo {
            model: "veo2-fast",
            prompt: "p",
            enhance_prompt: true,
            enable_upsample: false,
            images: Vec::new(),
            aspect_ratio: "veo2-fast".contains("veo3").then_some(AspectRatio::Tall.as_str()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("aspect_ratio").is_none());
        assert!(json.get("images").is_none());
    }

    #[test]
    fn data_url_uses_extension_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.jpg");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(image_data_url(&path).unwrap(), "data:image/jpeg;base64,YWJj");
    }
}
