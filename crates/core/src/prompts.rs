//! Prompt text sent to the text provider, and the template-only prompts
//! used when no provider is reachable.

use crate::project::{ArtStyle, Character, Prop, Scene};
use crate::story::{StoryAnalysis, StoryCharacter, StoryScene, StoryShot};

/// Inputs shorter than this (in chars, trimmed) are treated as a one-line
/// idea to expand rather than a script to analyze.
pub const SHORT_IDEA_CHARS: usize = 100;

/// Script text beyond this many chars is cut before analysis.
pub const MAX_ANALYSIS_CHARS: usize = 8000;

const QUALITY_TAIL: &str = "高质量，细节丰富，专业水准";

/// System message for chat-style providers.
pub const SYSTEM_PROMPT: &str =
    "你是一名专业的影视分镜师，擅长把剧本拆解为角色、场景、道具和分镜。只输出要求的JSON。";

const ANALYSIS_TEMPLATE: &str = r#"请分析以下剧情文本，提取角色、场景、重要道具，并拆分为分镜。

剧情文本:
{story}

请按以下JSON格式输出分析结果（只输出JSON，不要其他解释）:
```json
{
    "project_name": "项目名称（根据剧情总结）",
    "description": "剧情简介（50字以内）",
    "genre": "题材类型（如：爱情/动作/悬疑/奇幻等）",
    "characters": [
        {"name": "角色名", "age": "年龄", "gender": "性别", "appearance": "外貌描述（发型、五官、体型等）",
         "clothing": "服装描述", "personality": "性格特点", "role": "主角/配角/反派"}
    ],
    "scenes": [
        {"name": "场景名称", "location_type": "室内/室外/混合", "description": "场景详细描述",
         "lighting": "光线描述", "atmosphere": "氛围描述", "time_of_day": "时间段", "weather": "天气（如适用）"}
    ],
    "props": [
        {"name": "道具名称", "category": "道具类型", "description": "道具描述", "material": "材质",
         "size": "尺寸描述", "importance": "关键道具/背景道具"}
    ],
    "shots": [
        {"template": "远景/全景/中景/近景/特写", "description": "画面描述，包含动作和表情",
         "characters": ["出现的角色名"], "scene": "场景名", "props": ["道具名"], "dialogue": "台词（如有）"}
    ]
}
```

分析要求:
1. 识别所有出现的角色，提取外貌、服装等视觉特征
2. 识别剧情中的场景/地点
3. 提取重要的道具和物品
4. 分镜中的角色名、场景名必须与上面列出的名称一致
5. 如果信息不明确，根据上下文合理推断"#;

const CREATION_TEMPLATE: &str = r#"根据以下故事创意，创作一个完整的分镜故事，包含角色、场景、道具和7个分镜设定。

故事创意:
{story}

要求:
1. 创建2-4个有特色的角色，外貌描述至少50字，服装描述至少30字
2. 设计2-3个具体的场景，场景描述至少60字
3. 添加1-3个重要的道具
4. 给故事起一个吸引人的名字
5. 设计7个分镜，每个分镜包含动作、表情，可以加入对话

请按以下JSON格式输出（只输出JSON，不要其他解释）:
```json
{
    "project_name": "故事名称",
    "description": "剧情简介（50-100字）",
    "genre": "题材类型",
    "style": "画面风格",
    "characters": [{"name": "", "age": "", "gender": "", "appearance": "", "clothing": "", "personality": "", "role": ""}],
    "scenes": [{"name": "", "location_type": "", "description": "", "lighting": "", "atmosphere": "", "time_of_day": "", "weather": ""}],
    "props": [{"name": "", "category": "", "description": "", "material": "", "size": "", "importance": ""}],
    "shots": [{"template": "全景/中景/特写", "description": "", "characters": ["角色名"], "scene": "场景名", "dialogue": ""}]
}
```"#;

/// Whether `text` is short enough to be expanded as an idea.
pub fn is_short_idea(text: &str) -> bool {
    text.trim().chars().count() < SHORT_IDEA_CHARS
}

/// Prompt for `text`: the creation prompt for short ideas, otherwise the
/// analysis prompt over at most [`MAX_ANALYSIS_CHARS`] chars.
pub fn story_prompt(text: &str) -> String {
    let trimmed = text.trim();
    if is_short_idea(trimmed) {
        CREATION_TEMPLATE.replace("{story}", trimmed)
    } else {
        let cut: String = trimmed.chars().take(MAX_ANALYSIS_CHARS).collect();
        ANALYSIS_TEMPLATE.replace("{story}", &cut)
    }
}

// ---------------------------------------------------------------------------
// Template-only prompts
// ---------------------------------------------------------------------------

pub fn character_prompt(c: &Character, style: ArtStyle) -> String {
    let mut parts = vec!["人物立绘".to_string()];
    push_nonempty(&mut parts, &c.name);
    if !c.age.trim().is_empty() {
        let age = c.age.trim();
        parts.push(if age.ends_with('岁') { age.to_string() } else { format!("{age}岁") });
    }
    push_nonempty(&mut parts, &c.gender);
    push_labelled(&mut parts, "外貌特征", &c.appearance);
    push_labelled(&mut parts, "服装", &c.clothing);
    parts.push(style.display_name().to_string());
    parts.push(QUALITY_TAIL.to_string());
    parts.join("，")
}

pub fn scene_prompt(s: &Scene, style: ArtStyle) -> String {
    let mut parts = vec!["场景概念图".to_string()];
    push_nonempty(&mut parts, &s.name);
    if !s.location_type.trim().is_empty() {
        parts.push(format!("{}场景", s.location_type.trim()));
    }
    push_labelled(&mut parts, "环境", &s.description);
    push_labelled(&mut parts, "光线", &s.lighting);
    push_labelled(&mut parts, "氛围", &s.atmosphere);
    parts.push(style.display_name().to_string());
    parts.push(QUALITY_TAIL.to_string());
    parts.join("，")
}

pub fn prop_prompt(p: &Prop, style: ArtStyle) -> String {
    let mut parts = vec!["道具设定图".to_string()];
    push_nonempty(&mut parts, &p.name);
    push_nonempty(&mut parts, &p.category);
    push_nonempty(&mut parts, &p.description);
    push_labelled(&mut parts, "材质", &p.material);
    parts.push("白色背景".to_string());
    parts.push(style.display_name().to_string());
    parts.push("高质量，细节丰富".to_string());
    parts.join("，")
}

fn push_nonempty(parts: &mut Vec<String>, value: &str) {
    if !value.trim().is_empty() {
        parts.push(value.trim().to_string());
    }
}

fn push_labelled(parts: &mut Vec<String>, label: &str, value: &str) {
    if !value.trim().is_empty() {
        parts.push(format!("{label}：{}", value.trim()));
    }
}

// ---------------------------------------------------------------------------
// Offline story
// ---------------------------------------------------------------------------

const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    ("爱情", &["爱情", "恋爱", "浪漫", "爱"]),
    ("末世", &["末世", "僵尸", "丧尸", "病毒", "废墟", "生存", "灾难"]),
    ("动作", &["动作", "追逐", "战斗", "打"]),
    ("悬疑", &["悬疑", "神秘", "侦探", "案件"]),
    ("奇幻", &["奇幻", "魔法", "仙", "玄幻"]),
    ("科幻", &["科幻", "未来", "机器", "太空"]),
];

const DEFAULT_GENRE: &str = "剧情";

/// Genre guessed from keywords in a story idea.
pub fn guess_genre(idea: &str) -> &'static str {
    GENRE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| idea.contains(w)))
        .map_or(DEFAULT_GENRE, |(genre, _)| *genre)
}

/// A small complete story built from an idea without any provider, used
/// when the text provider fails on a short idea.
pub fn offline_story(idea: &str) -> StoryAnalysis {
    let idea = idea.trim();
    let genre = guess_genre(idea);
    let head: String = idea.chars().take(10).collect();
    let lead = "主角";
    let partner = "伙伴";
    let place = "故事发生地";

    let shot = |template: &str, description: String, characters: &[&str]| StoryShot {
        template: template.to_string(),
        description,
        characters: characters.iter().map(|c| c.to_string()).collect(),
        scene: place.to_string(),
        ..StoryShot::default()
    };

    StoryAnalysis {
        project_name: format!("{genre}故事 - {head}"),
        description: format!("基于「{idea}」创作的分镜故事"),
        genre: genre.to_string(),
        style: String::new(),
        characters: vec![
            StoryCharacter {
                name: lead.to_string(),
                age: "25岁".to_string(),
                role: "主角".to_string(),
                personality: "坚定，善良".to_string(),
                ..StoryCharacter::default()
            },
            StoryCharacter {
                name: partner.to_string(),
                age: "26岁".to_string(),
                role: "配角".to_string(),
                personality: "机敏，幽默".to_string(),
                ..StoryCharacter::default()
            },
        ],
        scenes: vec![StoryScene {
            name: place.to_string(),
            description: idea.to_string(),
            atmosphere: format!("{genre}氛围"),
            ..StoryScene::default()
        }],
        props: Vec::new(),
        shots: vec![
            shot("远景", format!("开场远景，交代{place}：{idea}"), &[]),
            shot("中景", format!("{lead}登场，神情专注"), &[lead]),
            shot("中景", format!("{lead}与{partner}相遇，故事展开"), &[lead, partner]),
            shot("特写", format!("{lead}的表情特写，情绪达到高潮"), &[lead]),
            shot("全景", "结尾全景，两人并肩而立".to_string(), &[lead, partner]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ideas_use_creation_prompt() {
        let prompt = story_prompt("  雨夜里的一封信  ");
        assert!(prompt.starts_with("根据以下故事创意"));
        assert!(prompt.contains("雨夜里的一封信"));
    }

    #[test]
    fn long_text_is_analyzed_and_truncated() {
        let text = "字".repeat(MAX_ANALYSIS_CHARS + 500);
        let prompt = story_prompt(&text);
        assert!(prompt.starts_with("请分析以下剧情文本"));
        assert!(prompt.contains(&"字".repeat(MAX_ANALYSIS_CHARS)));
        assert!(!prompt.contains(&"字".repeat(MAX_ANALYSIS_CHARS + 1)));
    }

    #[test]
    fn boundary_at_one_hundred_chars() {
        assert!(is_short_idea(&"a".repeat(99)));
        assert!(!is_short_idea(&"a".repeat(100)));
    }

    #[test]
    fn character_prompt_skips_blank_fields() {
        let mut c = Character::new("林夏");
        c.age = "17".into();
        c.clothing = "校服".into();
        assert_eq!(
            character_prompt(&c, ArtStyle::Anime),
            "人物立绘，林夏，17岁，服装：校服，日系动漫风格，高质量，细节丰富，专业水准"
        );
    }

    #[test]
    fn scene_prompt_labels_fields() {
        let mut s = Scene::new("天台");
        s.location_type = "室外".into();
        s.lighting = "黄昏逆光".into();
        let prompt = scene_prompt(&s, ArtStyle::Realistic);
        assert!(prompt.starts_with("场景概念图，天台，室外场景，光线：黄昏逆光"));
    }

    #[test]
    fn genre_from_keywords() {
        assert_eq!(guess_genre("丧尸围城"), "末世");
        assert_eq!(guess_genre("一只猫的日常"), DEFAULT_GENRE);
    }

    #[test]
    fn offline_story_references_its_own_names() {
        let story = offline_story("太空站里的最后一人");
        assert_eq!(story.genre, "科幻");
        for shot in &story.shots {
            assert_eq!(shot.scene, story.scenes[0].name);
            for name in &shot.characters {
                assert!(story.characters.iter().any(|c| &c.name == name));
            }
        }
    }
}
