//! Merge a [`StoryAnalysis`] into an existing project.
//!
//! Characters, scenes and props are fuzzy-matched by name against what the
//! project already has: a match fills the existing entity's empty fields,
//! anything else is created. Shots are appended with their name references
//! resolved to stable ids through the same matcher. Names that resolve to
//! nothing are reported back rather than failing the import.

use serde::Serialize;

use crate::matching::{match_candidate, Named};
use crate::project::{ArtStyle, Character, Entity, Project, Prop, Scene, Shot, StyleConfig};
use crate::shot_prompt;
use crate::story::{StoryAnalysis, StoryCharacter, StoryProp, StoryScene, StoryShot};
use crate::types::EntityId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub characters_added: usize,
    pub characters_matched: usize,
    pub scenes_added: usize,
    pub scenes_matched: usize,
    pub props_added: usize,
    pub props_matched: usize,
    pub shots_added: usize,
    /// Names referenced by shots (or rejected as entities) that did not resolve.
    pub unresolved_names: Vec<String>,
}

/// Apply `story` to `project` using `threshold` for fuzzy matches.
pub fn apply_story(project: &mut Project, story: &StoryAnalysis, threshold: f64) -> ImportReport {
    let mut report = ImportReport::default();

    fill(&mut project.name, &story.project_name);
    fill(&mut project.description, &story.description);
    fill(&mut project.genre, &story.genre);
    // Style counts as empty only while the project still has the default.
    if project.style == StyleConfig::default() {
        if let Some(style) = ArtStyle::parse(&story.style) {
            project.style.art_style = style;
        }
    }

    for c in &story.characters {
        match merge_entity(project, &c.name, threshold, |existing: &mut Character| {
            merge_character(existing, c)
        }) {
            Merge::Matched => report.characters_matched += 1,
            Merge::Added => report.characters_added += 1,
            Merge::Rejected => report.unresolved_names.push(c.name.clone()),
            Merge::Skipped => {}
        }
    }

    for s in &story.scenes {
        match merge_entity(project, &s.name, threshold, |existing: &mut Scene| {
            merge_scene(existing, s)
        }) {
            Merge::Matched => report.scenes_matched += 1,
            Merge::Added => report.scenes_added += 1,
            Merge::Rejected => report.unresolved_names.push(s.name.clone()),
            Merge::Skipped => {}
        }
    }

    for p in &story.props {
        match merge_entity(project, &p.name, threshold, |existing: &mut Prop| {
            merge_prop(existing, p)
        }) {
            Merge::Matched => report.props_matched += 1,
            Merge::Added => report.props_added += 1,
            Merge::Rejected => report.unresolved_names.push(p.name.clone()),
            Merge::Skipped => {}
        }
    }

    for story_shot in &story.shots {
        let shot = build_shot(project, story_shot, threshold, &mut report.unresolved_names);
        if project.add_shot(shot).is_ok() {
            report.shots_added += 1;
        }
    }

    report.unresolved_names.dedup();
    tracing::info!(
        project_id = %project.id,
        characters_added = report.characters_added,
        characters_matched = report.characters_matched,
        shots_added = report.shots_added,
        unresolved = report.unresolved_names.len(),
        "Applied story analysis"
    );
    report
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

enum Merge {
    Matched,
    Added,
    Rejected,
    Skipped,
}

/// Match `name` against entities of kind `T`; update the match in place or
/// create a new default entity and run `update` on it before inserting.
fn merge_entity<T, F>(project: &mut Project, name: &str, threshold: f64, update: F) -> Merge
where
    T: Entity + Default,
    F: Fn(&mut T),
{
    if name.trim().is_empty() {
        return Merge::Skipped;
    }
    if let Some(m) = match_candidate(name, project.entities::<T>(), threshold) {
        let existing = &mut T::collection_mut(project)[m.index];
        update(existing);
        return Merge::Matched;
    }
    let mut created = T::default();
    created.set_name(name.trim().to_string());
    update(&mut created);
    match project.add_entity(created) {
        Ok(_) => Merge::Added,
        Err(e) => {
            tracing::warn!(name, error = %e, "Skipping imported entity");
            Merge::Rejected
        }
    }
}

fn fill(target: &mut String, value: &str) {
    if target.trim().is_empty() && !value.trim().is_empty() {
        *target = value.trim().to_string();
    }
}

fn merge_character(existing: &mut Character, c: &StoryCharacter) {
    fill(&mut existing.age, &c.age);
    fill(&mut existing.gender, &c.gender);
    fill(&mut existing.appearance, &c.appearance);
    fill(&mut existing.clothing, &c.clothing);
    fill(&mut existing.personality, &c.personality);
    fill(&mut existing.role, &c.role);
}

fn merge_scene(existing: &mut Scene, s: &StoryScene) {
    fill(&mut existing.location_type, &s.location_type);
    fill(&mut existing.description, &s.description);
    fill(&mut existing.lighting, &s.lighting);
    fill(&mut existing.atmosphere, &s.atmosphere);
    fill(&mut existing.time_of_day, &s.time_of_day);
    fill(&mut existing.weather, &s.weather);
}

fn merge_prop(existing: &mut Prop, p: &StoryProp) {
    fill(&mut existing.category, &p.category);
    fill(&mut existing.description, &p.description);
    fill(&mut existing.material, &p.material);
    fill(&mut existing.size, &p.size);
    fill(&mut existing.importance, &p.importance);
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

fn resolve<T: Entity>(
    items: &[T],
    name: &str,
    threshold: f64,
    unresolved: &mut Vec<String>,
) -> Option<EntityId> {
    if name.trim().is_empty() {
        return None;
    }
    match match_candidate(name, items, threshold) {
        Some(m) => Some(items[m.index].id()),
        None => {
            unresolved.push(name.trim().to_string());
            None
        }
    }
}

fn build_shot(
    project: &Project,
    story_shot: &StoryShot,
    threshold: f64,
    unresolved: &mut Vec<String>,
) -> Shot {
    let mut character_ids: Vec<EntityId> = Vec::new();
    for name in &story_shot.characters {
        if let Some(id) = resolve(&project.characters, name, threshold, unresolved) {
            if !character_ids.contains(&id) {
                character_ids.push(id);
            }
        }
    }
    let scene_id = resolve(&project.scenes, &story_shot.scene, threshold, unresolved);
    let mut prop_ids: Vec<EntityId> = Vec::new();
    for name in &story_shot.props {
        if let Some(id) = resolve(&project.props, name, threshold, unresolved) {
            if !prop_ids.contains(&id) {
                prop_ids.push(id);
            }
        }
    }

    let template = shot_prompt::template(&story_shot.template);
    let subject = character_ids
        .iter()
        .filter_map(|id| project.entity::<Character>(*id))
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join("、");

    Shot {
        template: template.id.to_string(),
        subject,
        description: story_shot.description.clone(),
        dynamic_control: story_shot.description.clone(),
        atmosphere: story_shot.atmosphere.clone(),
        dialogue: story_shot.dialogue.clone(),
        character_ids,
        scene_id,
        prop_ids,
        ..Shot::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
