//! Reference image generation for characters, scenes and props.
//!
//! A generated reference is stored on the entity itself and picked up by
//! [`collect_reference_images`](crate::generation::collect_reference_images)
//! the next time a shot that uses the entity is rendered.

use std::path::{Path, PathBuf};

use crate::generation::{locked_seed, ImageRequest};
use crate::naming::reference_image_filename;
use crate::project::{ArtStyle, AspectRatio, Character, Entity, Project, Prop, Scene};
use crate::prompts::{character_prompt, prop_prompt, scene_prompt};
use crate::types::Timestamp;

/// Kept out of every reference sheet.
pub const REFERENCE_NEGATIVE_PROMPT: &str =
    "low quality, blurry, deformed, watermark, text, multiple views";

/// An entity that can carry a generated reference image.
pub trait ReferenceSubject: Entity {
    /// Subdirectory of the assets directory the image is written to.
    const ASSET_DIR: &'static str;

    fn reference_prompt(&self, style: ArtStyle) -> String;

    fn reference_aspect(project: &Project) -> AspectRatio;

    /// Store a freshly generated image on the entity.
    fn attach_reference(&mut self, path: PathBuf);
}

impl ReferenceSubject for Character {
    const ASSET_DIR: &'static str = "characters";

    fn reference_prompt(&self, style: ArtStyle) -> String {
        character_prompt(self, style)
    }

    fn reference_aspect(_project: &Project) -> AspectRatio {
        AspectRatio::ClassicTall
    }

    /// Newest first, so it is among the refs a shot actually uses.
    fn attach_reference(&mut self, path: PathBuf) {
        self.ref_images.retain(|p| *p != path);
        self.ref_images.insert(0, path);
    }
}

impl ReferenceSubject for Scene {
    const ASSET_DIR: &'static str = "scenes";

    fn reference_prompt(&self, style: ArtStyle) -> String {
        scene_prompt(self, style)
    }

    fn reference_aspect(project: &Project) -> AspectRatio {
        project.style.aspect_ratio
    }

    fn attach_reference(&mut self, path: PathBuf) {
        self.space_ref_image = Some(path);
    }
}

impl ReferenceSubject for Prop {
    const ASSET_DIR: &'static str = "props";

    fn reference_prompt(&self, style: ArtStyle) -> String {
        prop_prompt(self, style)
    }

    fn reference_aspect(_project: &Project) -> AspectRatio {
        AspectRatio::Square
    }

    fn attach_reference(&mut self, path: PathBuf) {
        self.ref_image = Some(path);
    }
}

/// Build the image request for an entity's reference sheet. A non-blank
/// `custom_prompt` replaces the template prompt.
pub fn reference_image_request<T: ReferenceSubject>(
    entity: &T,
    project: &Project,
    custom_prompt: Option<&str>,
    assets_dir: &Path,
    model_suffix: &str,
    at: Timestamp,
) -> ImageRequest {
    let prompt = match custom_prompt.map(str::trim) {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => entity.reference_prompt(project.style.art_style),
    };
    let filename = reference_image_filename(&project.name, entity.name(), at, model_suffix);
    ImageRequest {
        prompt,
        negative_prompt: REFERENCE_NEGATIVE_PROMPT.to_string(),
        aspect_ratio: T::reference_aspect(project),
        references: Vec::new(),
        seed: locked_seed(project),
        output_path: assets_dir.join(T::ASSET_DIR).join(filename),
    }
}
