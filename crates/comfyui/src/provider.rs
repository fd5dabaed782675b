//! [`ImageProvider`] backed by a local ComfyUI server.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use storyboard_core::generation::{
    verify_output, GenerationError, ImageProvider, ImageRequest, ReferenceSlot,
};

use crate::api::ComfyUIApi;
use crate::workflow::{self, RunState, WorkflowParams, DEFAULT_CFG, DEFAULT_STEPS};

const HISTORY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const HISTORY_MAX_ATTEMPTS: u32 = 300;

pub struct ComfyUiImageProvider {
    api: ComfyUIApi,
    checkpoint: String,
    client_id: String,
}

/// Locked seeds are used as-is, otherwise a fresh random seed per run.
pub fn choose_seed(locked: Option<i64>) -> u64 {
    match locked {
        Some(seed) if seed > 0 => seed as u64,
        _ => u64::from(rand::rng().random::<u32>()),
    }
}

impl ComfyUiImageProvider {
    pub fn new(api: ComfyUIApi, checkpoint: impl Into<String>) -> Self {
        Self {
            api,
            checkpoint: checkpoint.into(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    async fn wait_for_outputs(
        &self,
        prompt_id: &str,
    ) -> Result<Vec<workflow::OutputImage>, GenerationError> {
        for attempt in 1..=HISTORY_MAX_ATTEMPTS {
            tokio::time::sleep(HISTORY_POLL_INTERVAL).await;
            let history = self.api.get_history(prompt_id).await?;
            match workflow::run_state(&history, prompt_id) {
                RunState::Done(images) => return Ok(images),
                RunState::Failed(detail) => {
                    return Err(GenerationError::Failed(format!("ComfyUI run failed: {detail}")))
                }
                RunState::Running => {
                    if attempt % 10 == 0 {
                        tracing::debug!(prompt_id, attempt, "ComfyUI run in progress");
                    }
                }
            }
        }
        Err(GenerationError::Timeout(
            HISTORY_POLL_INTERVAL * HISTORY_MAX_ATTEMPTS,
        ))
    }
}

#[async_trait]
impl ImageProvider for ComfyUiImageProvider {
    fn name(&self) -> &str {
        "comfyui"
    }

    fn model_suffix(&self) -> &str {
        "comfy"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<PathBuf, GenerationError> {
        self.api.system_stats().await.map_err(|e| {
            GenerationError::Network(format!(
                "ComfyUI at {} is not reachable: {e}",
                self.api.api_url()
            ))
        })?;

        // The first character reference drives image-to-image.
        let source_image = match request
            .references
            .iter()
            .find(|r| r.slot == ReferenceSlot::Character)
        {
            Some(reference) => Some(self.api.upload_image(&reference.path).await?),
            None => None,
        };

        let (width, height) = request.aspect_ratio.dimensions();
        let params = WorkflowParams {
            checkpoint: self.checkpoint.clone(),
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            width,
            height,
            seed: choose_seed(request.seed),
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            source_image,
        };
        let graph = workflow::build(&params);
        let submitted = self.api.submit_workflow(&graph, &self.client_id).await?;
        tracing::info!(
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            seed = params.seed,
            img2img = params.source_image.is_some(),
            "ComfyUI workflow queued"
        );

        let outputs = self.wait_for_outputs(&submitted.prompt_id).await?;
        let first = outputs
            .first()
            .ok_or_else(|| GenerationError::Failed("ComfyUI produced no images".to_string()))?;
        let bytes = self
            .api
            .view(&first.filename, &first.subfolder, &first.kind)
            .await?;

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, &bytes).await?;
        tracing::info!(path = %request.output_path.display(), bytes = bytes.len(), "ComfyUI image saved");
        verify_output(&request.output_path)
    }
}
