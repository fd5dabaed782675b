//! Project data model.
//!
//! A [`Project`] owns ordered lists of characters, scenes, props and shots
//! plus a project-wide [`StyleConfig`]. Shots reference the other entities
//! by stable [`EntityId`]; names stay unique per kind so that import
//! reconciliation and [`NameIndex`] lookups are unambiguous.
//!
//! Every persisted type uses `#[serde(default)]`: unknown fields are ignored
//! and missing fields fall back to their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::matching::{normalize, Named};
use crate::types::{new_id, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of any entity or project name.
pub const MAX_NAME_LEN: usize = 200;

/// Shot type used when a segment or shot does not specify one.
pub const DEFAULT_SHOT_TYPE: &str = "中景";

/// Number of character reference images fed to generation per character.
pub const MAX_CHARACTER_REFS: usize = 2;

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

/// Project-wide visual style mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArtStyle {
    #[default]
    Realistic,
    Anime,
    Comic,
    Watercolor,
    OilPainting,
    Sketch,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 6] = [
        ArtStyle::Realistic,
        ArtStyle::Anime,
        ArtStyle::Comic,
        ArtStyle::Watercolor,
        ArtStyle::OilPainting,
        ArtStyle::Sketch,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ArtStyle::Realistic => "realistic",
            ArtStyle::Anime => "anime",
            ArtStyle::Comic => "comic",
            ArtStyle::Watercolor => "watercolor",
            ArtStyle::OilPainting => "oil_painting",
            ArtStyle::Sketch => "sketch",
        }
    }

    /// Name used inside rendered prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            ArtStyle::Realistic => "写实风格",
            ArtStyle::Anime => "日系动漫风格",
            ArtStyle::Comic => "美漫风格",
            ArtStyle::Watercolor => "水彩画风格",
            ArtStyle::OilPainting => "油画风格",
            ArtStyle::Sketch => "素描风格",
        }
    }

    /// Accepts either the key or the display name; unknown values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(value) || s.display_name() == value)
    }
}

impl From<String> for ArtStyle {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_default()
    }
}

impl From<ArtStyle> for String {
    fn from(value: ArtStyle) -> Self {
        value.key().to_string()
    }
}

/// Output aspect ratio. Unknown strings deserialize as 16:9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AspectRatio {
    #[default]
    Wide,
    Tall,
    Square,
    Classic,
    ClassicTall,
    Cinema,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Classic => "4:3",
            AspectRatio::ClassicTall => "3:4",
            AspectRatio::Cinema => "21:9",
        }
    }

    /// Pixel dimensions used for local generation.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Wide => (1024, 576),
            AspectRatio::Tall => (576, 1024),
            AspectRatio::Square => (768, 768),
            AspectRatio::Classic => (896, 672),
            AspectRatio::ClassicTall => (672, 896),
            AspectRatio::Cinema => (1024, 440),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "16:9" => Some(AspectRatio::Wide),
            "9:16" => Some(AspectRatio::Tall),
            "1:1" => Some(AspectRatio::Square),
            "4:3" => Some(AspectRatio::Classic),
            "3:4" => Some(AspectRatio::ClassicTall),
            "21:9" => Some(AspectRatio::Cinema),
            _ => None,
        }
    }
}

impl From<String> for AspectRatio {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_default()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub art_style: ArtStyle,
    pub aspect_ratio: AspectRatio,
    /// Free-form style text appended to the style line.
    pub style_prompt: String,
    pub ref_image: Option<PathBuf>,
    pub weight: f64,
    pub lock_seed: bool,
    pub seed: i64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            art_style: ArtStyle::default(),
            aspect_ratio: AspectRatio::default(),
            style_prompt: String::new(),
            ref_image: None,
            weight: 1.0,
            lock_seed: false,
            seed: 0,
        }
    }
}

impl StyleConfig {
    /// Text rendered on the style line when a shot has no style of its own.
    pub fn style_line(&self) -> String {
        let name = self.art_style.display_name();
        if self.style_prompt.trim().is_empty() {
            name.to_string()
        } else {
            format!("{name}，{}", self.style_prompt.trim())
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub age: String,
    pub gender: String,
    pub appearance: String,
    pub clothing: String,
    pub personality: String,
    pub role: String,
    pub ref_images: Vec<PathBuf>,
    pub consistency_weight: f64,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            age: String::new(),
            gender: String::new(),
            appearance: String::new(),
            clothing: String::new(),
            personality: String::new(),
            role: String::new(),
            ref_images: Vec::new(),
            consistency_weight: 1.0,
        }
    }
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub id: EntityId,
    pub name: String,
    pub location_type: String,
    pub description: String,
    pub lighting: String,
    pub atmosphere: String,
    pub time_of_day: String,
    pub weather: String,
    pub space_ref_image: Option<PathBuf>,
    pub atmosphere_ref_image: Option<PathBuf>,
    pub consistency_weight: f64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            location_type: String::new(),
            description: String::new(),
            lighting: String::new(),
            atmosphere: String::new(),
            time_of_day: String::new(),
            weather: String::new(),
            space_ref_image: None,
            atmosphere_ref_image: None,
            consistency_weight: 1.0,
        }
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prop {
    pub id: EntityId,
    pub name: String,
    pub category: String,
    pub description: String,
    pub material: String,
    pub size: String,
    pub importance: String,
    pub ref_image: Option<PathBuf>,
    pub consistency_weight: f64,
}

impl Default for Prop {
    fn default() -> Self {
        Self {
            id: new_id(),
            name: String::new(),
            category: String::new(),
            description: String::new(),
            material: String::new(),
            size: String::new(),
            importance: String::new(),
            ref_image: None,
            consistency_weight: 1.0,
        }
    }
}

impl Prop {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

/// One cut inside a multi-cut shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotSegment {
    pub description: String,
    pub shot_type: String,
    pub angle: String,
}

impl Default for ShotSegment {
    fn default() -> Self {
        Self {
            description: String::new(),
            shot_type: DEFAULT_SHOT_TYPE.to_string(),
            angle: String::new(),
        }
    }
}

/// Emphasis applied to each kind of reference image during generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotWeights {
    pub character: f64,
    pub scene: f64,
    pub props: f64,
    pub style: f64,
}

impl Default for SlotWeights {
    fn default() -> Self {
        Self {
            character: 1.0,
            scene: 0.8,
            props: 0.6,
            style: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shot {
    pub id: EntityId,
    /// Dense 1-based position, rebuilt by [`Project::renumber_shots`].
    pub shot_number: u32,
    pub template: String,
    pub subject: String,
    pub shot_type: String,
    pub atmosphere: String,
    pub environment: String,
    pub segments: Vec<ShotSegment>,
    pub special_technique: String,
    pub style: String,
    pub dynamic_control: String,
    pub dialogue: String,
    pub description: String,
    pub character_ids: Vec<EntityId>,
    pub scene_id: Option<EntityId>,
    pub prop_ids: Vec<EntityId>,
    pub slot_weights: SlotWeights,
    pub generated_prompt: String,
    pub output_image: Option<PathBuf>,
    pub output_video: Option<PathBuf>,
}

impl Default for Shot {
    fn default() -> Self {
        Self {
            id: new_id(),
            shot_number: 0,
            template: "medium".to_string(),
            subject: String::new(),
            shot_type: String::new(),
            atmosphere: String::new(),
            environment: String::new(),
            segments: Vec::new(),
            special_technique: String::new(),
            style: String::new(),
            dynamic_control: String::new(),
            dialogue: String::new(),
            description: String::new(),
            character_ids: Vec::new(),
            scene_id: None,
            prop_ids: Vec::new(),
            slot_weights: SlotWeights::default(),
            generated_prompt: String::new(),
            output_image: None,
            output_video: None,
        }
    }
}

/// Generation status derived from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotStatus {
    Pending,
    Completed,
}

impl Shot {
    /// Whether the recorded image still exists. Re-checked on every call.
    pub fn image_exists(&self) -> bool {
        self.output_image.as_deref().is_some_and(Path::is_file)
    }

    pub fn video_exists(&self) -> bool {
        self.output_video.as_deref().is_some_and(Path::is_file)
    }

    /// True when an image path is recorded but the file is gone.
    pub fn has_dangling_image(&self) -> bool {
        self.output_image.is_some() && !self.image_exists()
    }

    pub fn status(&self) -> ShotStatus {
        if self.image_exists() {
            ShotStatus::Completed
        } else {
            ShotStatus::Pending
        }
    }
}

/// Direction for [`Project::move_shot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub genre: String,
    pub style: StyleConfig,
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
    pub props: Vec<Prop>,
    pub shots: Vec<Shot>,
    /// Bumped on every persisted mutation; used for optimistic checks.
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Default for Project {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: String::new(),
            description: String::new(),
            genre: String::new(),
            style: StyleConfig::default(),
            characters: Vec::new(),
            scenes: Vec::new(),
            props: Vec::new(),
            shots: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Counts shown on the project dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProjectStats {
    pub character_count: usize,
    pub scene_count: usize,
    pub prop_count: usize,
    pub shot_count: usize,
    pub completed_count: usize,
}

/// Lightweight listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: EntityId,
    pub name: String,
    pub shot_count: usize,
    pub version: u64,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Record a mutation: bump the version and refresh `updated_at`.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id,
            name: self.name.clone(),
            shot_count: self.shots.len(),
            version: self.version,
            updated_at: self.updated_at,
        }
    }

    /// Compute stats. Completion is read from disk for every shot.
    pub fn stats(&self) -> ProjectStats {
        ProjectStats {
            character_count: self.characters.len(),
            scene_count: self.scenes.len(),
            prop_count: self.props.len(),
            shot_count: self.shots.len(),
            completed_count: self.shots.iter().filter(|s| s.image_exists()).count(),
        }
    }

    /// Whether any shot references an image that no longer resolves.
    pub fn has_dangling_images(&self) -> bool {
        self.shots.iter().any(Shot::has_dangling_image)
    }

    // -- Generic entity access --

    pub fn entities<T: Entity>(&self) -> &[T] {
        T::collection(self)
    }

    pub fn entity<T: Entity>(&self, id: EntityId) -> Option<&T> {
        T::collection(self).iter().find(|e| e.id() == id)
    }

    pub fn entity_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        T::collection_mut(self).iter_mut().find(|e| e.id() == id)
    }

    /// Case-insensitive exact name lookup.
    pub fn entity_by_name<T: Entity>(&self, name: &str) -> Option<&T> {
        let key = normalize(name);
        T::collection(self)
            .iter()
            .find(|e| normalize(e.name()) == key)
    }

    /// Reject a name that is empty, too long, or already used by another
    /// entity of the same kind (`except` skips the entity being renamed).
    pub fn ensure_unique_name<T: Entity>(
        &self,
        name: &str,
        except: Option<EntityId>,
    ) -> Result<(), CoreError> {
        validate_name(name)?;
        if let Some(existing) = self.entity_by_name::<T>(name) {
            if Some(existing.id()) != except {
                return Err(CoreError::Conflict(format!(
                    "{} named '{}' already exists",
                    T::LABEL,
                    name.trim()
                )));
            }
        }
        Ok(())
    }

    pub fn add_entity<T: Entity>(&mut self, mut entity: T) -> Result<&T, CoreError> {
        self.ensure_unique_name::<T>(entity.name(), None)?;
        entity.set_name(entity.name().trim().to_string());
        let items = T::collection_mut(self);
        items.push(entity);
        Ok(&items[items.len() - 1])
    }

    /// Remove an entity and drop every shot reference to it.
    pub fn remove_entity<T: Entity>(&mut self, id: EntityId) -> Result<T, CoreError> {
        let items = T::collection_mut(self);
        let pos = items
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| CoreError::not_found(T::LABEL, id))?;
        let removed = items.remove(pos);
        for shot in &mut self.shots {
            T::detach(shot, id);
        }
        Ok(removed)
    }

    // -- Shots --

    pub fn shot(&self, id: EntityId) -> Option<&Shot> {
        self.shots.iter().find(|s| s.id == id)
    }

    pub fn shot_mut(&mut self, id: EntityId) -> Option<&mut Shot> {
        self.shots.iter_mut().find(|s| s.id == id)
    }

    /// Check that every id a shot references exists in this project.
    pub fn validate_shot_refs(&self, shot: &Shot) -> Result<(), CoreError> {
        for id in &shot.character_ids {
            if self.entity::<Character>(*id).is_none() {
                return Err(CoreError::Validation(format!("unknown character id {id}")));
            }
        }
        if let Some(id) = shot.scene_id {
            if self.entity::<Scene>(id).is_none() {
                return Err(CoreError::Validation(format!("unknown scene id {id}")));
            }
        }
        for id in &shot.prop_ids {
            if self.entity::<Prop>(*id).is_none() {
                return Err(CoreError::Validation(format!("unknown prop id {id}")));
            }
        }
        Ok(())
    }

    /// Append a shot and renumber.
    pub fn add_shot(&mut self, shot: Shot) -> Result<&Shot, CoreError> {
        let index = self.shots.len();
        self.insert_shot_at(index, shot)
    }

    /// Insert a shot at `index` (clamped to the end) and renumber.
    pub fn insert_shot_at(&mut self, index: usize, shot: Shot) -> Result<&Shot, CoreError> {
        self.validate_shot_refs(&shot)?;
        let index = index.min(self.shots.len());
        self.shots.insert(index, shot);
        self.renumber_shots();
        Ok(&self.shots[index])
    }

    pub fn remove_shot(&mut self, id: EntityId) -> Result<Shot, CoreError> {
        let pos = self
            .shots
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CoreError::not_found("Shot", id))?;
        let removed = self.shots.remove(pos);
        self.renumber_shots();
        Ok(removed)
    }

    /// Swap a shot with its neighbour. Returns `false` (and changes nothing)
    /// when the shot is already at that boundary.
    pub fn move_shot(&mut self, id: EntityId, direction: MoveDirection) -> Result<bool, CoreError> {
        let pos = self
            .shots
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CoreError::not_found("Shot", id))?;
        let target = match direction {
            MoveDirection::Up if pos > 0 => pos - 1,
            MoveDirection::Down if pos + 1 < self.shots.len() => pos + 1,
            _ => return Ok(false),
        };
        self.shots.swap(pos, target);
        self.renumber_shots();
        Ok(true)
    }

    /// Rebuild the dense 1-based `shot_number` sequence from list order.
    pub fn renumber_shots(&mut self) {
        for (i, shot) in self.shots.iter_mut().enumerate() {
            shot.shot_number = i as u32 + 1;
        }
    }

    /// Names of the characters a shot references, in shot order.
    pub fn character_names(&self, shot: &Shot) -> Vec<&str> {
        shot.character_ids
            .iter()
            .filter_map(|id| self.entity::<Character>(*id))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Validate an entity or project name.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entity trait
// ---------------------------------------------------------------------------

/// A named, id-keyed member of one of the project's entity lists.
pub trait Entity: Named + Clone {
    /// Human-readable kind used in error messages.
    const LABEL: &'static str;

    fn id(&self) -> EntityId;
    fn set_name(&mut self, name: String);
    fn collection(project: &Project) -> &Vec<Self>;
    fn collection_mut(project: &mut Project) -> &mut Vec<Self>;
    /// Drop any reference to `id` from a shot.
    fn detach(shot: &mut Shot, id: EntityId);
}

impl Named for Character {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Scene {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Prop {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Character {
    const LABEL: &'static str = "Character";

    fn id(&self) -> EntityId {
        self.id
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
    fn collection(project: &Project) -> &Vec<Self> {
        &project.characters
    }
    fn collection_mut(project: &mut Project) -> &mut Vec<Self> {
        &mut project.characters
    }
    fn detach(shot: &mut Shot, id: EntityId) {
        shot.character_ids.retain(|c| *c != id);
    }
}

impl Entity for Scene {
    const LABEL: &'static str = "Scene";

    fn id(&self) -> EntityId {
        self.id
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
    fn collection(project: &Project) -> &Vec<Self> {
        &project.scenes
    }
    fn collection_mut(project: &mut Project) -> &mut Vec<Self> {
        &mut project.scenes
    }
    fn detach(shot: &mut Shot, id: EntityId) {
        if shot.scene_id == Some(id) {
            shot.scene_id = None;
        }
    }
}

impl Entity for Prop {
    const LABEL: &'static str = "Prop";

    fn id(&self) -> EntityId {
        self.id
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
    fn collection(project: &Project) -> &Vec<Self> {
        &project.props
    }
    fn collection_mut(project: &mut Project) -> &mut Vec<Self> {
        &mut project.props
    }
    fn detach(shot: &mut Shot, id: EntityId) {
        shot.prop_ids.retain(|p| *p != id);
    }
}

// ---------------------------------------------------------------------------
// Name index
// ---------------------------------------------------------------------------

/// Normalized-name → id lookup for every entity kind of one project.
#[derive(Debug, Default)]
pub struct NameIndex {
    characters: HashMap<String, EntityId>,
    scenes: HashMap<String, EntityId>,
    props: HashMap<String, EntityId>,
}

impl NameIndex {
    pub fn build(project: &Project) -> Self {
        fn index<T: Entity>(items: &[T]) -> HashMap<String, EntityId> {
            items.iter().map(|e| (normalize(e.name()), e.id())).collect()
        }
        Self {
            characters: index(&project.characters),
            scenes: index(&project.scenes),
            props: index(&project.props),
        }
    }

    pub fn character(&self, name: &str) -> Option<EntityId> {
        self.characters.get(&normalize(name)).copied()
    }

    pub fn scene(&self, name: &str) -> Option<EntityId> {
        self.scenes.get(&normalize(name)).copied()
    }

    pub fn prop(&self, name: &str) -> Option<EntityId> {
        self.props.get(&normalize(name)).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
