//! Cloud image generation: nano-banana (queued job) with a dall-e-3
//! fallback (synchronous).

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use storyboard_core::generation::{verify_output, GenerationError, ImageProvider, ImageRequest};
use storyboard_core::project::AspectRatio;

use crate::api::{CloudApi, CloudApiError, PollPolicy};

const NANO_BANANA_PATH: &str = "/fal-ai/nano-banana";
const DALLE_PATH: &str = "/v1/images/generations";

pub const IMAGE_POLL: PollPolicy = PollPolicy {
    interval: Duration::from_secs(2),
    max_attempts: 60,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudImageModel {
    NanoBanana,
    Dalle3,
}

impl CloudImageModel {
    /// Unknown model names fall back to nano-banana.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "dall-e-3" | "dalle3" | "dalle-3" => Self::Dalle3,
            _ => Self::NanoBanana,
        }
    }

    /// Tag embedded in output filenames.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::NanoBanana => "nb",
            Self::Dalle3 => "dalle3",
        }
    }
}

/// dall-e-3 only offers three sizes.
pub fn dalle_size(aspect_ratio: AspectRatio) -> &'static str {
    match aspect_ratio {
        AspectRatio::Wide => "1792x1024",
        AspectRatio::Tall => "1024x1792",
        _ => "1024x1024",
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmitResponse {
    request_id: Option<String>,
    status: String,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FalResult {
    status: String,
    images: Option<Vec<ImageOut>>,
}

#[derive(Debug, Deserialize)]
struct ImageOut {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DalleResponse {
    data: Vec<ImageOut>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FalState {
    Pending,
    Completed(Option<String>),
    Failed,
}

/// `COMPLETED` or the presence of an `images` array means done.
pub(crate) fn fal_state(result: FalResult) -> FalState {
    if result.status == "COMPLETED" || result.images.is_some() {
        let url = result
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.url)
            .find(|u| !u.is_empty());
        FalState::Completed(url)
    } else if result.status == "FAILED" {
        FalState::Failed
    } else {
        FalState::Pending
    }
}

/// Check the downloaded bytes decode as an image header.
pub fn probe_image(bytes: &[u8]) -> Result<(image::ImageFormat, u32, u32), CloudApiError> {
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| CloudApiError::InvalidImage("unrecognized format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| CloudApiError::InvalidImage(e.to_string()))?;
    Ok((format, width, height))
}

/// Swap a trailing `_{from}` model tag in the file stem for `_{to}`.
fn retag(path: &Path, from: &str, to: &str) -> PathBuf {
    if from == to {
        return path.to_path_buf();
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return path.to_path_buf();
    };
    let Some(base) = stem.strip_suffix(&format!("_{from}")) else {
        return path.to_path_buf();
    };
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("png");
    path.with_file_name(format!("{base}_{to}.{ext}"))
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct CloudImageProvider {
    api: CloudApi,
    model: CloudImageModel,
    poll: PollPolicy,
}

impl CloudImageProvider {
    pub fn new(api: CloudApi, model: CloudImageModel) -> Self {
        Self {
            api,
            model,
            poll: IMAGE_POLL,
        }
    }

    async fn nano_banana(&self, prompt: &str) -> Result<String, CloudApiError> {
        let body = serde_json::json!({ "prompt": prompt, "num_images": 1 });
        let submitted: SubmitResponse = self.api.post_json(NANO_BANANA_PATH, &body).await?;
        if submitted.status == "FAILED" {
            return Err(CloudApiError::JobFailed(
                submitted.message.unwrap_or_else(|| "submission rejected".to_string()),
            ));
        }
        let request_id = submitted
            .request_id
            .filter(|id| !id.is_empty())
            .ok_or(CloudApiError::MissingField("request_id"))?;
        tracing::info!(request_id = %request_id, "Image job submitted");

        let path = format!("{NANO_BANANA_PATH}/requests/{request_id}");
        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(self.poll.interval).await;
            let result: FalResult = self.api.get_json(&path, &[]).await?;
            match fal_state(result) {
                FalState::Completed(Some(url)) => return Ok(url),
                FalState::Completed(None) => return Err(CloudApiError::MissingField("images")),
                FalState::Failed => {
                    return Err(CloudApiError::JobFailed(format!("request {request_id} failed")))
                }
                FalState::Pending => {
                    if attempt % 5 == 1 {
                        tracing::debug!(request_id = %request_id, attempt, "Image job pending");
                    }
                }
            }
        }
        Err(CloudApiError::PollTimeout {
            attempts: self.poll.max_attempts,
        })
    }

    async fn dalle3(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<String, CloudApiError> {
        let body = serde_json::json!({
            "model": "dall-e-3",
            "prompt": prompt,
            "n": 1,
            "size": dalle_size(aspect_ratio),
            "quality": "standard",
        });
        let response: DalleResponse = self.api.post_json(DALLE_PATH, &body).await?;
        response
            .data
            .into_iter()
            .map(|i| i.url)
            .find(|u| !u.is_empty())
            .ok_or(CloudApiError::MissingField("data"))
    }
}

#[async_trait]
impl ImageProvider for CloudImageProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    fn model_suffix(&self) -> &str {
        self.model.suffix()
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<PathBuf, GenerationError> {
        let (url, used) = match self.model {
            CloudImageModel::NanoBanana => match self.nano_banana(&request.prompt).await {
                Ok(url) => (url, CloudImageModel::NanoBanana),
                Err(e) => {
                    tracing::warn!(error = %e, "nano-banana failed, falling back to dall-e-3");
                    let url = self.dalle3(&request.prompt, request.aspect_ratio).await?;
                    (url, CloudImageModel::Dalle3)
                }
            },
            CloudImageModel::Dalle3 => (
                self.dalle3(&request.prompt, request.aspect_ratio).await?,
                CloudImageModel::Dalle3,
            ),
        };

        let dest = retag(&request.output_path, self.model.suffix(), used.suffix());
        let bytes = self.api.download(&url).await.map_err(GenerationError::from)?;
        let (format, width, height) = probe_image(&bytes)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, &bytes).await?;

        tracing::info!(
            path = %dest.display(),
            model = used.suffix(),
            format = ?format,
            width,
            height,
            "Image saved"
        );
        verify_output(&dest)
    }
}
