//! API-format workflow graphs for text-to-image and image-to-image runs,
//! and parsing of the history entries they produce.

use serde_json::{json, Value};

pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_CFG: f64 = 7.0;
/// Denoise strength when starting from a reference image.
pub const IMG2IMG_DENOISE: f64 = 0.7;

const FILENAME_PREFIX: &str = "storyboard";

// Node ids. Links are `[node_id, output_index]`.
const CHECKPOINT: &str = "4";
const POSITIVE: &str = "6";
const NEGATIVE: &str = "7";
const LATENT: &str = "5";
const LOAD_IMAGE: &str = "10";
const SAMPLER: &str = "3";
const DECODE: &str = "8";
const SAVE: &str = "9";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowParams {
    pub checkpoint: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    /// Uploaded image name; switches the graph to image-to-image.
    pub source_image: Option<String>,
}

impl WorkflowParams {
    pub fn denoise(&self) -> f64 {
        if self.source_image.is_some() {
            IMG2IMG_DENOISE
        } else {
            1.0
        }
    }
}

/// Build the graph: checkpoint loader, two CLIP encodes, a latent (empty,
/// or the encoded source image), KSampler, VAE decode and SaveImage.
pub fn build(params: &WorkflowParams) -> Value {
    let mut graph = json!({
        CHECKPOINT: {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": params.checkpoint }
        },
        POSITIVE: {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.prompt, "clip": [CHECKPOINT, 1] }
        },
        NEGATIVE: {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": params.negative_prompt, "clip": [CHECKPOINT, 1] }
        },
        SAMPLER: {
            "class_type": "KSampler",
            "inputs": {
                "seed": params.seed,
                "steps": params.steps,
                "cfg": params.cfg,
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": params.denoise(),
                "model": [CHECKPOINT, 0],
                "positive": [POSITIVE, 0],
                "negative": [NEGATIVE, 0],
                "latent_image": [LATENT, 0]
            }
        },
        DECODE: {
            "class_type": "VAEDecode",
            "inputs": { "samples": [SAMPLER, 0], "vae": [CHECKPOINT, 2] }
        },
        SAVE: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": FILENAME_PREFIX, "images": [DECODE, 0] }
        }
    });

    match &params.source_image {
        Some(image) => {
            graph[LOAD_IMAGE] = json!({
                "class_type": "LoadImage",
                "inputs": { "image": image }
            });
            graph[LATENT] = json!({
                "class_type": "VAEEncode",
                "inputs": { "pixels": [LOAD_IMAGE, 0], "vae": [CHECKPOINT, 2] }
            });
        }
        None => {
            graph[LATENT] = json!({
                "class_type": "EmptyLatentImage",
                "inputs": { "width": params.width, "height": params.height, "batch_size": 1 }
            });
        }
    }
    graph
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// An output file reference from a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImage {
    pub filename: String,
    pub subfolder: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// No entry yet, or the entry has no outputs.
    Running,
    Done(Vec<OutputImage>),
    Failed(String),
}

/// Inspect `GET /history/{prompt_id}` for `prompt_id`.
pub fn run_state(history: &Value, prompt_id: &str) -> RunState {
    let Some(entry) = history.get(prompt_id) else {
        return RunState::Running;
    };

    if entry.pointer("/status/status_str").and_then(Value::as_str) == Some("error") {
        let detail = entry
            .pointer("/status/messages")
            .and_then(Value::as_array)
            .and_then(|msgs| {
                msgs.iter()
                    .find(|m| m.get(0).and_then(Value::as_str) == Some("execution_error"))
            })
            .and_then(|m| m.pointer("/1/exception_message"))
            .and_then(Value::as_str)
            .unwrap_or("execution error");
        return RunState::Failed(detail.trim().to_string());
    }

    let images: Vec<OutputImage> = entry
        .get("outputs")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|outputs| outputs.values())
        .filter_map(|node| node.get("images").and_then(Value::as_array))
        .flatten()
        .filter_map(|img| {
            Some(OutputImage {
                filename: img.get("filename")?.as_str()?.to_string(),
                subfolder: img
                    .get("subfolder")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind: img
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("output")
                    .to_string(),
            })
        })
        .collect();

    if images.is_empty() {
        RunState::Running
    } else {
        RunState::Done(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(source: Option<&str>) -> WorkflowParams {
        WorkflowParams {
            checkpoint: "sd_xl_base_1.0.safetensors".into(),
            prompt: "雨夜街角".into(),
            negative_prompt: "blurry".into(),
            width: 1024,
            height: 576,
            seed: 42,
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            source_image: source.map(String::from),
        }
    }

    #[test]
    fn text_to_image_uses_empty_latent() {
        let graph = build(&params(None));
        assert_eq!(graph[LATENT]["class_type"], "EmptyLatentImage");
        assert_eq!(graph[LATENT]["inputs"]["width"], 1024);
        assert_eq!(graph[SAMPLER]["inputs"]["denoise"], 1.0);
        assert_eq!(graph[SAMPLER]["inputs"]["seed"], 42);
        assert!(graph.get(LOAD_IMAGE).is_none());
    }

    #[test]
    fn image_to_image_encodes_source() {
        let graph = build(&params(Some("hero.png")));
        assert_eq!(graph[LOAD_IMAGE]["inputs"]["image"], "hero.png");
        assert_eq!(graph[LATENT]["class_type"], "VAEEncode");
        assert_eq!(graph[SAMPLER]["inputs"]["denoise"], IMG2IMG_DENOISE);
        assert_eq!(graph[SAMPLER]["inputs"]["steps"], 20);
        assert_eq!(graph[SAMPLER]["inputs"]["cfg"], 7.0);
    }

    #[test]
    fn history_without_entry_is_running() {
        assert_eq!(run_state(&json!({}), "abc"), RunState::Running);
    }

    #[test]
    fn history_outputs_are_collected() {
        let history = json!({
            "abc": {
                "outputs": {
                    "9": { "images": [
                        { "filename": "storyboard_00001_.png", "subfolder": "", "type": "output" }
                    ]}
                },
                "status": { "status_str": "success", "completed": true }
            }
        });
        assert_eq!(
            run_state(&history, "abc"),
            RunState::Done(vec![OutputImage {
                filename: "storyboard_00001_.png".into(),
                subfolder: String::new(),
                kind: "output".into(),
            }])
        );
    }

    #[test]
    fn execution_error_is_reported() {
        let history = json!({
            "abc": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "messages": [
                        ["execution_start", {}],
                        ["execution_error", { "exception_message": "ckpt not found\n" }]
                    ]
                }
            }
        });
        assert_eq!(run_state(&history, "abc"), RunState::Failed("ckpt not found".into()));
    }
}
