//! Shot prompt template engine.
//!
//! Renders a shot's structured fields into the fixed eleven-line prompt
//! block. Derived lines (camera movement, angle, special technique,
//! composition) are computed from the shot's segments. Rendering is pure:
//! the same shot and project always produce the same string.

use serde::Serialize;

use crate::project::{Project, Scene, Shot, ShotSegment};

// ---------------------------------------------------------------------------
// Labels and tokens
// ---------------------------------------------------------------------------

pub const LABEL_SUBJECT: &str = "主体";
pub const LABEL_SHOT_TYPE: &str = "景别";
pub const LABEL_ATMOSPHERE: &str = "氛围";
pub const LABEL_ENVIRONMENT: &str = "环境";
pub const LABEL_CAMERA_MOVEMENT: &str = "运镜";
pub const LABEL_ANGLE: &str = "视角";
pub const LABEL_SPECIAL_TECHNIQUE: &str = "特殊拍摄手法";
pub const LABEL_COMPOSITION: &str = "构图";
pub const LABEL_STYLE: &str = "风格统一";
pub const LABEL_DYNAMIC_CONTROL: &str = "动态控制";
pub const LABEL_DIALOGUE: &str = "台词";

/// Field labels in render order.
pub const FIELD_LABELS: [&str; 11] = [
    LABEL_SUBJECT,
    LABEL_SHOT_TYPE,
    LABEL_ATMOSPHERE,
    LABEL_ENVIRONMENT,
    LABEL_CAMERA_MOVEMENT,
    LABEL_ANGLE,
    LABEL_SPECIAL_TECHNIQUE,
    LABEL_COMPOSITION,
    LABEL_STYLE,
    LABEL_DYNAMIC_CONTROL,
    LABEL_DIALOGUE,
];

/// Separator between shot types in the composition line.
pub const CUT: &str = "切";
/// Cut marker used in camera movement and special technique.
pub const CUT_SHOT: &str = "切镜";
pub const FIXED_CAMERA: &str = "固定";
pub const EYE_LEVEL: &str = "平视";
pub const MEDIUM_SHOT: &str = "中景";
pub const STANDARD_FILMING: &str = "标准拍摄";

/// Negative prompt used when nothing more specific applies.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, deformed";

// ---------------------------------------------------------------------------
// Shot templates
// ---------------------------------------------------------------------------

/// A named framing preset a shot can be created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShotTemplate {
    pub id: &'static str,
    pub label: &'static str,
    pub negative_prompt: &'static str,
}

pub const SHOT_TEMPLATES: &[ShotTemplate] = &[
    ShotTemplate {
        id: "wide",
        label: "远景",
        negative_prompt: "low quality, blurry, cropped subject, cluttered foreground",
    },
    ShotTemplate {
        id: "full",
        label: "全景",
        negative_prompt: "low quality, blurry, cut-off limbs, deformed body",
    },
    ShotTemplate {
        id: "medium",
        label: MEDIUM_SHOT,
        negative_prompt: DEFAULT_NEGATIVE_PROMPT,
    },
    ShotTemplate {
        id: "close",
        label: "近景",
        negative_prompt: "low quality, blurry, deformed face, extra fingers",
    },
    ShotTemplate {
        id: "closeup",
        label: "特写",
        negative_prompt: "low quality, blurry, deformed face, asymmetric eyes",
    },
    ShotTemplate {
        id: "extreme_closeup",
        label: "大特写",
        negative_prompt: "low quality, blurry, noisy texture, out of focus",
    },
];

/// Look up a template by id or Chinese label. Unknown ids fall back to medium.
pub fn template(id: &str) -> &'static ShotTemplate {
    let id = id.trim();
    SHOT_TEMPLATES
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(id) || t.label == id)
        .unwrap_or(&SHOT_TEMPLATES[2])
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Zero or one segment is a fixed camera; more become an ordered cut list.
pub fn camera_movement(segments: &[ShotSegment]) -> String {
    if segments.len() <= 1 {
        return FIXED_CAMERA.to_string();
    }
    let last = segments.len();
    segments
        .iter()
        .enumerate()
        .map(|(i, seg)| {
            let n = i + 1;
            if n < last {
                format!("第{n}个{}，{CUT_SHOT}", seg.description)
            } else {
                format!("第{n}个{}", seg.description)
            }
        })
        .collect()
}

/// Each segment's angle with its ordinal; segments without one are skipped.
pub fn angle(segments: &[ShotSegment]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| !seg.angle.trim().is_empty())
        .map(|(i, seg)| format!("第{}个{}", i + 1, seg.angle.trim()))
        .collect();
    if parts.is_empty() {
        EYE_LEVEL.to_string()
    } else {
        parts.join("，")
    }
}

/// Segment shot types joined by the cut separator.
pub fn composition(segments: &[ShotSegment]) -> String {
    let types: Vec<&str> = segments
        .iter()
        .map(|seg| seg.shot_type.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if types.is_empty() {
        MEDIUM_SHOT.to_string()
    } else {
        types.join(CUT)
    }
}

pub fn special_technique(segments: &[ShotSegment], explicit: &str) -> String {
    let explicit = explicit.trim();
    if segments.len() > 1 {
        if explicit.is_empty() {
            CUT_SHOT.to_string()
        } else {
            format!("{CUT_SHOT}, {explicit}")
        }
    } else if explicit.is_empty() {
        STANDARD_FILMING.to_string()
    } else {
        explicit.to_string()
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// The eleven resolved field values of one shot, in render order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShotFields {
    pub subject: String,
    pub shot_type: String,
    pub atmosphere: String,
    pub environment: String,
    pub camera_movement: String,
    pub angle: String,
    pub special_technique: String,
    pub composition: String,
    pub style: String,
    pub dynamic_control: String,
    pub dialogue: String,
}

impl ShotFields {
    /// Resolve every field, falling back to project data where the shot is blank.
    pub fn resolve(shot: &Shot, project: &Project) -> Self {
        let scene: Option<&Scene> = shot.scene_id.and_then(|id| project.entity::<Scene>(id));

        let subject = non_empty(&shot.subject)
            .unwrap_or_else(|| project.character_names(shot).join("、"));
        let shot_type =
            non_empty(&shot.shot_type).unwrap_or_else(|| template(&shot.template).label.to_string());
        let atmosphere = non_empty(&shot.atmosphere)
            .or_else(|| scene.and_then(|s| non_empty(&s.atmosphere)))
            .unwrap_or_default();
        let environment = non_empty(&shot.environment)
            .or_else(|| scene.map(scene_environment))
            .unwrap_or_default();
        let style = non_empty(&shot.style).unwrap_or_else(|| project.style.style_line());

        Self {
            subject,
            shot_type,
            atmosphere,
            environment,
            camera_movement: camera_movement(&shot.segments),
            angle: angle(&shot.segments),
            special_technique: special_technique(&shot.segments, &shot.special_technique),
            composition: composition(&shot.segments),
            style,
            dynamic_control: shot.dynamic_control.trim().to_string(),
            dialogue: shot.dialogue.trim().to_string(),
        }
    }

    /// `(label, value)` pairs in render order.
    pub fn rows(&self) -> [(&'static str, &str); 11] {
        [
            (LABEL_SUBJECT, self.subject.as_str()),
            (LABEL_SHOT_TYPE, self.shot_type.as_str()),
            (LABEL_ATMOSPHERE, self.atmosphere.as_str()),
            (LABEL_ENVIRONMENT, self.environment.as_str()),
            (LABEL_CAMERA_MOVEMENT, self.camera_movement.as_str()),
            (LABEL_ANGLE, self.angle.as_str()),
            (LABEL_SPECIAL_TECHNIQUE, self.special_technique.as_str()),
            (LABEL_COMPOSITION, self.composition.as_str()),
            (LABEL_STYLE, self.style.as_str()),
            (LABEL_DYNAMIC_CONTROL, self.dynamic_control.as_str()),
            (LABEL_DIALOGUE, self.dialogue.as_str()),
        ]
    }

    /// One `label: value` line per field.
    pub fn to_prompt_string(&self) -> String {
        self.rows()
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render the full prompt block for a shot.
pub fn render_prompt(shot: &Shot, project: &Project) -> String {
    ShotFields::resolve(shot, project).to_prompt_string()
}

/// Prompt sent to an image backend: the shot's custom or stored prompt (or
/// the rendered block), prefixed by the project style and suffixed with the
/// template's negative prompt.
pub fn generation_prompt(shot: &Shot, project: &Project, custom: Option<&str>) -> String {
    let body = custom
        .and_then(non_empty)
        .or_else(|| non_empty(&shot.generated_prompt))
        .unwrap_or_else(|| render_prompt(shot, project));
    let prefix = project.style.art_style.display_name();
    let negative = template(&shot.template).negative_prompt;
    format!("{prefix} {body}. Avoid: {negative}")
}

fn scene_environment(scene: &Scene) -> String {
    match non_empty(&scene.description) {
        Some(desc) => format!("{}，{desc}", scene.name),
        None => scene.name.clone(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
