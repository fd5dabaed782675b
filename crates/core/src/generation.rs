//! Provider seams for text, image and video generation.
//!
//! The concrete providers live in the `llm`, `cloud` and `comfyui` crates;
//! this module owns the traits, the request types they consume and the
//! [`GenerationResult`] returned to clients. Provider failures are values,
//! not faults: handlers convert them into `success: false` results.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::naming::{project_output_dir, shot_image_filename};
use crate::project::{AspectRatio, Character, Project, Prop, Scene, Shot, MAX_CHARACTER_REFS};
use crate::shot_prompt;
use crate::types::Timestamp;

/// Atmosphere references count for half of the scene slot.
const ATMOSPHERE_FACTOR: f64 = 0.5;

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome reported to clients for a generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl GenerationResult {
    pub fn succeeded(message: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            success: true,
            message: message.into(),
            output_path: Some(output_path),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output_path: None,
        }
    }
}

/// Check that a provider actually produced a non-empty file at `path`.
pub fn verify_output(path: &Path) -> Result<PathBuf, GenerationError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(path.to_path_buf()),
        Ok(_) => Err(GenerationError::Failed(format!(
            "output file {} is empty",
            path.display()
        ))),
        Err(_) => Err(GenerationError::Failed(format!(
            "output file {} was not written",
            path.display()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceSlot {
    Character,
    Scene,
    Atmosphere,
    Prop,
    Style,
}

/// An existing reference image and the emphasis it should carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedReference {
    pub path: PathBuf,
    pub weight: f64,
    pub slot: ReferenceSlot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub references: Vec<WeightedReference>,
    /// Fixed seed when the project locks one.
    pub seed: Option<i64>,
    /// Where the provider must write the image.
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub source_image: PathBuf,
    pub aspect_ratio: AspectRatio,
    pub output_path: PathBuf,
}

/// Reference images for a shot: up to two per character, the scene's space
/// and atmosphere refs, each prop's ref and the project style ref. Paths
/// that no longer exist are skipped.
pub fn collect_reference_images(shot: &Shot, project: &Project) -> Vec<WeightedReference> {
    let weights = shot.slot_weights;
    let mut refs = Vec::new();
    let mut push = |path: &Path, weight: f64, slot: ReferenceSlot| {
        if path.is_file() {
            refs.push(WeightedReference {
                path: path.to_path_buf(),
                weight,
                slot,
            });
        }
    };

    for id in &shot.character_ids {
        if let Some(c) = project.entity::<Character>(*id) {
            for path in c.ref_images.iter().take(MAX_CHARACTER_REFS) {
                push(
                    path,
                    weights.character * c.consistency_weight,
                    ReferenceSlot::Character,
                );
            }
        }
    }
    if let Some(scene) = shot.scene_id.and_then(|id| project.entity::<Scene>(id)) {
        if let Some(path) = &scene.space_ref_image {
            push(
                path,
                weights.scene * scene.consistency_weight,
                ReferenceSlot::Scene,
            );
        }
        if let Some(path) = &scene.atmosphere_ref_image {
            push(
                path,
                weights.scene * ATMOSPHERE_FACTOR,
                ReferenceSlot::Atmosphere,
            );
        }
    }
    for id in &shot.prop_ids {
        if let Some(p) = project.entity::<Prop>(*id) {
            if let Some(path) = &p.ref_image {
                push(path, weights.props * p.consistency_weight, ReferenceSlot::Prop);
            }
        }
    }
    if let Some(path) = &project.style.ref_image {
        push(
            path,
            weights.style * project.style.weight,
            ReferenceSlot::Style,
        );
    }
    refs
}

/// Seed to use for a project, if it locks one.
pub fn locked_seed(project: &Project) -> Option<i64> {
    (project.style.lock_seed && project.style.seed > 0).then_some(project.style.seed)
}

/// Build the image request for `shot` with its output under `outputs_dir`.
pub fn image_request(
    shot: &Shot,
    project: &Project,
    custom_prompt: Option<&str>,
    outputs_dir: &Path,
    model_suffix: &str,
    at: Timestamp,
) -> ImageRequest {
    let dir = project_output_dir(outputs_dir, &project.name);
    ImageRequest {
        prompt: shot_prompt::generation_prompt(shot, project, custom_prompt),
        negative_prompt: shot_prompt::template(&shot.template).negative_prompt.to_string(),
        aspect_ratio: project.style.aspect_ratio,
        references: collect_reference_images(shot, project),
        seed: locked_seed(project),
        output_path: dir.join(shot_image_filename(shot.shot_number, at, model_suffix)),
    }
}

/// Videos sit next to their source image with the same stem.
pub fn video_output_path(image: &Path) -> PathBuf {
    image.with_extension("mp4")
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Text completion backend used for story analysis.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Image backend. Implementations write to `request.output_path` and return
/// the path only after the file is verified.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Short tag embedded in output filenames.
    fn model_suffix(&self) -> &str;

    async fn generate_image(&self, request: &ImageRequest) -> Result<PathBuf, GenerationError>;
}

#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_video(&self, request: &VideoRequest) -> Result<PathBuf, GenerationError>;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"img").unwrap();
        path
    }

    #[test]
    fn references_skip_missing_files_and_cap_character_refs() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new("Refs");
        let mut hero = Character::new("Hero");
        hero.consistency_weight = 0.5;
        hero.ref_images = vec![
            touch(dir.path(), "a.png"),
            touch(dir.path(), "b.png"),
            touch(dir.path(), "c.png"),
        ];
        let hero_id = project.add_entity(hero).unwrap().id;
        let mut scene = Scene::new("Street");
        scene.space_ref_image = Some(touch(dir.path(), "street.png"));
        scene.atmosphere_ref_image = Some(dir.path().join("missing.png"));
        let scene_id = project.add_entity(scene).unwrap().id;

        let shot = Shot {
            character_ids: vec![hero_id],
            scene_id: Some(scene_id),
            ..Shot::default()
        };
        let refs = collect_reference_images(&shot, &project);

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].slot, ReferenceSlot::Character);
        assert!((refs[0].weight - 0.5).abs() < 1e-9);
        assert_eq!(refs[2].slot, ReferenceSlot::Scene);
        assert!((refs[2].weight - 0.8).abs() < 1e-9);
    }

    #[test]
    fn seed_only_when_locked_and_positive() {
        let mut project = Project::new("Seed");
        project.style.seed = 42;
        assert_eq!(locked_seed(&project), None);
        project.style.lock_seed = true;
        assert_eq!(locked_seed(&project), Some(42));
        project.style.seed = 0;
        assert_eq!(locked_seed(&project), None);
    }

    #[test]
    fn image_request_targets_project_output_dir() {
        let mut project = Project::new("雨夜：上");
        project.add_shot(Shot::default()).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let req = image_request(&project.shots[0], &project, None, Path::new("/out"), "nb", at);

        assert_eq!(
            req.output_path,
            Path::new("/out/雨夜_上/shot_001_20250102_030405_nb.png")
        );
        assert!(req.prompt.ends_with(". Avoid: low quality, blurry, deformed"));
        assert_eq!(req.seed, None);
    }

    #[test]
    fn verify_output_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert_matches!(verify_output(&empty), Err(GenerationError::Failed(_)));
        assert_matches!(
            verify_output(&dir.path().join("nope.png")),
            Err(GenerationError::Failed(_))
        );
        let ok = touch(dir.path(), "ok.png");
        assert_eq!(verify_output(&ok).unwrap(), ok);
    }

    #[test]
    fn video_sits_next_to_image() {
        assert_eq!(
            video_output_path(Path::new("/o/shot_001_x_nb.png")),
            Path::new("/o/shot_001_x_nb.mp4")
        );
    }
}
