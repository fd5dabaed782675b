//! Story analysis documents: the JSON shape produced by the text provider
//! (or pasted by the user) describing characters, scenes, props and shots.
//!
//! Parsing is lenient. Language models wrap JSON in prose or code fences,
//! return numbers where strings are expected and omit fields, so every
//! field defaults and [`extract_json`] digs the object out of the reply.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::project::DEFAULT_SHOT_TYPE;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryAnalysis {
    #[serde(deserialize_with = "lenient_string")]
    pub project_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub genre: String,
    #[serde(deserialize_with = "lenient_string")]
    pub style: String,
    pub characters: Vec<StoryCharacter>,
    pub scenes: Vec<StoryScene>,
    pub props: Vec<StoryProp>,
    pub shots: Vec<StoryShot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryCharacter {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(deserialize_with = "lenient_string")]
    pub gender: String,
    #[serde(deserialize_with = "lenient_string")]
    pub appearance: String,
    #[serde(deserialize_with = "lenient_string")]
    pub clothing: String,
    #[serde(deserialize_with = "lenient_string")]
    pub personality: String,
    #[serde(deserialize_with = "lenient_string")]
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryScene {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub location_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub lighting: String,
    #[serde(deserialize_with = "lenient_string")]
    pub atmosphere: String,
    #[serde(deserialize_with = "lenient_string")]
    pub time_of_day: String,
    #[serde(deserialize_with = "lenient_string")]
    pub weather: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryProp {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub material: String,
    #[serde(deserialize_with = "lenient_string")]
    pub size: String,
    #[serde(deserialize_with = "lenient_string")]
    pub importance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryShot {
    #[serde(deserialize_with = "lenient_string")]
    pub template: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_list")]
    pub characters: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub scene: String,
    #[serde(deserialize_with = "lenient_list")]
    pub props: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub atmosphere: String,
    #[serde(deserialize_with = "lenient_string")]
    pub dialogue: String,
}

impl Default for StoryShot {
    fn default() -> Self {
        Self {
            template: DEFAULT_SHOT_TYPE.to_string(),
            description: String::new(),
            characters: Vec::new(),
            scene: String::new(),
            props: Vec::new(),
            atmosphere: String::new(),
            dialogue: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Find a JSON object in free text: a fenced ```json block, then the whole
/// text, then the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let parse_object = |candidate: &str| {
        serde_json::from_str::<serde_json::Value>(candidate)
            .ok()
            .filter(serde_json::Value::is_object)
    };

    if let Some(found) = FENCED_JSON
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_object(m.as_str()))
    {
        return Some(found);
    }
    if let Some(found) = parse_object(text.trim()) {
        return Some(found);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

/// Parse a story analysis out of a provider reply or pasted JSON.
pub fn parse_story(text: &str) -> Result<StoryAnalysis, CoreError> {
    let value = extract_json(text)
        .ok_or_else(|| CoreError::Validation("no JSON object found in story text".to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(format!("story JSON has an unexpected shape: {e}")))
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("、"),
        other => other.to_string(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_to_string(value))
}

/// A list of names, also accepting a single comma/、-separated string.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let items = match value {
        serde_json::Value::Array(items) => items.into_iter().map(value_to_string).collect(),
        serde_json::Value::Null => Vec::new(),
        other => value_to_string(other)
            .split([',', '，', '、'])
            .map(|s| s.trim().to_string())
            .collect(),
    };
    Ok(items.into_iter().filter(|s| !s.is_empty()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
