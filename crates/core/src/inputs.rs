//! Create/update payloads for projects, entities, shots and style.
//!
//! Every payload is a patch: `None` leaves the target field unchanged.
//! Field-level limits are declared with `validator`; cross-entity checks
//! (name uniqueness, reference resolution) happen in `apply`.

use std::path::PathBuf;

use serde::Deserialize;
use validator::Validate;

use crate::error::CoreError;
use crate::project::{
    ArtStyle, AspectRatio, Character, Entity, NameIndex, Project, Prop, Scene, Shot,
    ShotSegment, SlotWeights, StyleConfig,
};
use crate::types::EntityId;

fn set(target: &mut String, value: Option<String>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn set_opt<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProject {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub style: Option<ArtStyle>,
    pub aspect_ratio: Option<AspectRatio>,
}

impl CreateProject {
    pub fn into_project(self) -> Result<Project, CoreError> {
        self.validate()?;
        crate::project::validate_name(&self.name)?;
        let mut project = Project::new(self.name.trim());
        set(&mut project.description, self.description);
        set(&mut project.genre, self.genre);
        set_opt(&mut project.style.art_style, self.style);
        set_opt(&mut project.style.aspect_ratio, self.aspect_ratio);
        Ok(project)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProject {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub expected_version: Option<u64>,
}

impl UpdateProject {
    pub fn apply(self, project: &mut Project) -> Result<(), CoreError> {
        self.validate()?;
        if let Some(name) = self.name {
            crate::project::validate_name(&name)?;
            project.name = name.trim().to_string();
        }
        set(&mut project.description, self.description);
        set(&mut project.genre, self.genre);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateStyle {
    pub art_style: Option<ArtStyle>,
    pub aspect_ratio: Option<AspectRatio>,
    pub style_prompt: Option<String>,
    pub ref_image: Option<PathBuf>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub weight: Option<f64>,
    pub lock_seed: Option<bool>,
    #[validate(range(min = 0))]
    pub seed: Option<i64>,
    pub expected_version: Option<u64>,
}

impl UpdateStyle {
    pub fn apply(self, style: &mut StyleConfig) -> Result<(), CoreError> {
        self.validate()?;
        set_opt(&mut style.art_style, self.art_style);
        set_opt(&mut style.aspect_ratio, self.aspect_ratio);
        set(&mut style.style_prompt, self.style_prompt);
        if let Some(path) = self.ref_image {
            style.ref_image = (!path.as_os_str().is_empty()).then_some(path);
        }
        set_opt(&mut style.weight, self.weight);
        set_opt(&mut style.lock_seed, self.lock_seed);
        set_opt(&mut style.seed, self.seed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A create/update payload for one entity kind.
pub trait EntityInput<T: Entity>: Validate {
    fn name(&self) -> Option<&str>;
    fn expected_version(&self) -> Option<u64>;
    /// Copy every provided field except the name onto `target`.
    fn apply_fields(self, target: &mut T);
}

/// Build a new entity from `input`. The name is required.
pub fn create_entity<T, I>(project: &Project, input: I) -> Result<T, CoreError>
where
    T: Entity + Default,
    I: EntityInput<T>,
{
    input.validate()?;
    let name = input
        .name()
        .ok_or_else(|| CoreError::Validation(format!("{} name is required", T::LABEL)))?
        .trim()
        .to_string();
    project.ensure_unique_name::<T>(&name, None)?;
    let mut entity = T::default();
    entity.set_name(name);
    input.apply_fields(&mut entity);
    Ok(entity)
}

/// Patch the entity `id` in place, re-checking name uniqueness on rename.
pub fn update_entity<T, I>(project: &mut Project, id: EntityId, input: I) -> Result<T, CoreError>
where
    T: Entity,
    I: EntityInput<T>,
{
    input.validate()?;
    if project.entity::<T>(id).is_none() {
        return Err(CoreError::not_found(T::LABEL, id));
    }
    let rename = input.name().map(|n| n.trim().to_string());
    if let Some(name) = &rename {
        project.ensure_unique_name::<T>(name, Some(id))?;
    }
    let entity = project
        .entity_mut::<T>(id)
        .ok_or_else(|| CoreError::not_found(T::LABEL, id))?;
    if let Some(name) = rename {
        entity.set_name(name);
    }
    input.apply_fields(entity);
    Ok(entity.clone())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CharacterInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub appearance: Option<String>,
    pub clothing: Option<String>,
    pub personality: Option<String>,
    pub role: Option<String>,
    pub ref_images: Option<Vec<PathBuf>>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub consistency_weight: Option<f64>,
    pub expected_version: Option<u64>,
}

impl EntityInput<Character> for CharacterInput {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn expected_version(&self) -> Option<u64> {
        self.expected_version
    }
    fn apply_fields(self, c: &mut Character) {
        set(&mut c.age, self.age);
        set(&mut c.gender, self.gender);
        set(&mut c.appearance, self.appearance);
        set(&mut c.clothing, self.clothing);
        set(&mut c.personality, self.personality);
        set(&mut c.role, self.role);
        set_opt(&mut c.ref_images, self.ref_images);
        set_opt(&mut c.consistency_weight, self.consistency_weight);
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SceneInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub location_type: Option<String>,
    pub description: Option<String>,
    pub lighting: Option<String>,
    pub atmosphere: Option<String>,
    pub time_of_day: Option<String>,
    pub weather: Option<String>,
    pub space_ref_image: Option<PathBuf>,
    pub atmosphere_ref_image: Option<PathBuf>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub consistency_weight: Option<f64>,
    pub expected_version: Option<u64>,
}

impl EntityInput<Scene> for SceneInput {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn expected_version(&self) -> Option<u64> {
        self.expected_version
    }
    fn apply_fields(self, s: &mut Scene) {
        set(&mut s.location_type, self.location_type);
        set(&mut s.description, self.description);
        set(&mut s.lighting, self.lighting);
        set(&mut s.atmosphere, self.atmosphere);
        set(&mut s.time_of_day, self.time_of_day);
        set(&mut s.weather, self.weather);
        if self.space_ref_image.is_some() {
            s.space_ref_image = self.space_ref_image;
        }
        if self.atmosphere_ref_image.is_some() {
            s.atmosphere_ref_image = self.atmosphere_ref_image;
        }
        set_opt(&mut s.consistency_weight, self.consistency_weight);
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PropInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub material: Option<String>,
    pub size: Option<String>,
    pub importance: Option<String>,
    pub ref_image: Option<PathBuf>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub consistency_weight: Option<f64>,
    pub expected_version: Option<u64>,
}

impl EntityInput<Prop> for PropInput {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn expected_version(&self) -> Option<u64> {
        self.expected_version
    }
    fn apply_fields(self, p: &mut Prop) {
        set(&mut p.category, self.category);
        set(&mut p.description, self.description);
        set(&mut p.material, self.material);
        set(&mut p.size, self.size);
        set(&mut p.importance, self.importance);
        if self.ref_image.is_some() {
            p.ref_image = self.ref_image;
        }
        set_opt(&mut p.consistency_weight, self.consistency_weight);
    }
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

/// Shot payload. Entity references may be given as ids or as names; names
/// are resolved exactly (case-insensitive) and an unknown name is rejected.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ShotInput {
    #[validate(length(max = 50))]
    pub template: Option<String>,
    #[validate(length(max = 200))]
    pub subject: Option<String>,
    pub shot_type: Option<String>,
    pub atmosphere: Option<String>,
    pub environment: Option<String>,
    pub segments: Option<Vec<ShotSegment>>,
    pub special_technique: Option<String>,
    pub style: Option<String>,
    pub dynamic_control: Option<String>,
    pub dialogue: Option<String>,
    pub description: Option<String>,
    pub character_ids: Option<Vec<EntityId>>,
    pub character_names: Option<Vec<String>>,
    pub scene_id: Option<EntityId>,
    pub scene_name: Option<String>,
    pub prop_ids: Option<Vec<EntityId>>,
    pub prop_names: Option<Vec<String>>,
    pub slot_weights: Option<SlotWeights>,
    pub generated_prompt: Option<String>,
    /// 0-based insert position for new shots; appended when absent.
    pub position: Option<usize>,
    pub expected_version: Option<u64>,
}

impl ShotInput {
    /// Copy provided fields onto `shot`, resolving names against `project`.
    pub fn apply(self, project: &Project, shot: &mut Shot) -> Result<(), CoreError> {
        self.validate()?;
        let index = NameIndex::build(project);

        if let Some(names) = &self.character_names {
            shot.character_ids = resolve_names(names, "Character", |n| index.character(n))?;
        }
        set_opt(&mut shot.character_ids, self.character_ids);
        if let Some(name) = &self.scene_name {
            shot.scene_id = if name.trim().is_empty() {
                None
            } else {
                Some(
                    index
                        .scene(name)
                        .ok_or_else(|| CoreError::Validation(format!("unknown scene '{name}'")))?,
                )
            };
        }
        if self.scene_id.is_some() {
            shot.scene_id = self.scene_id;
        }
        if let Some(names) = &self.prop_names {
            shot.prop_ids = resolve_names(names, "Prop", |n| index.prop(n))?;
        }
        set_opt(&mut shot.prop_ids, self.prop_ids);

        set(&mut shot.template, self.template);
        set(&mut shot.subject, self.subject);
        set(&mut shot.shot_type, self.shot_type);
        set(&mut shot.atmosphere, self.atmosphere);
        set(&mut shot.environment, self.environment);
        set_opt(&mut shot.segments, self.segments);
        set(&mut shot.special_technique, self.special_technique);
        set(&mut shot.style, self.style);
        set(&mut shot.dynamic_control, self.dynamic_control);
        set(&mut shot.dialogue, self.dialogue);
        set(&mut shot.description, self.description);
        set_opt(&mut shot.slot_weights, self.slot_weights);
        set(&mut shot.generated_prompt, self.generated_prompt);

        project.validate_shot_refs(shot)
    }
}

fn resolve_names(
    names: &[String],
    label: &str,
    lookup: impl Fn(&str) -> Option<EntityId>,
) -> Result<Vec<EntityId>, CoreError> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        let id = lookup(name).ok_or_else(|| {
            CoreError::Validation(format!("unknown {} '{}'", label.to_lowercase(), name.trim()))
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
