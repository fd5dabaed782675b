//! Turns script text or a one-line idea into a [`StoryAnalysis`].

use std::sync::Arc;

use storyboard_core::error::CoreError;
use storyboard_core::generation::{GenerationError, TextProvider};
use storyboard_core::prompts::{is_short_idea, offline_story, story_prompt};
use storyboard_core::story::{parse_story, StoryAnalysis};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Story text is empty")]
    EmptyInput,

    #[error("Text provider failed: {0}")]
    Provider(#[from] GenerationError),

    #[error("Could not parse provider output: {0}")]
    Parse(#[source] CoreError),
}

pub struct StoryAnalyzer {
    provider: Arc<dyn TextProvider>,
}

impl StoryAnalyzer {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Analyze a script, or expand a short idea into a full story.
    ///
    /// A provider failure on a short idea falls back to [`offline_story`];
    /// on a script it is returned as [`AnalysisError::Provider`].
    pub async fn analyze(&self, text: &str) -> Result<StoryAnalysis, AnalysisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let short = is_short_idea(text);
        let prompt = story_prompt(text);
        tracing::info!(
            provider = self.provider.name(),
            input_chars = text.chars().count(),
            short_idea = short,
            "Analyzing story"
        );

        let raw = match self.provider.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) if short => {
                tracing::warn!(error = %e, "Text provider failed, using offline story");
                return Ok(offline_story(text));
            }
            Err(e) => return Err(AnalysisError::Provider(e)),
        };

        let story = parse_story(&raw).map_err(AnalysisError::Parse)?;
        tracing::info!(
            characters = story.characters.len(),
            scenes = story.scenes.len(),
            props = story.props.len(),
            shots = story.shots.len(),
            "Story analyzed"
        );
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;

    struct FakeProvider {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("offline".to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(GenerationError::Network)
        }
    }

    const REPLY: &str = r#"好的，以下是结果：
```json
{"project_name": "雨夜", "characters": [{"name": "阿杰"}], "scenes": [{"name": "街角"}],
 "shots": [{"template": "中景", "description": "阿杰站在街角", "characters": ["阿杰"], "scene": "街角"}]}
```"#;

    #[tokio::test]
    async fn parses_fenced_reply() {
        let provider = FakeProvider::ok(REPLY);
        let analyzer = StoryAnalyzer::new(provider.clone());
        let story = analyzer.analyze("雨夜街角").await.unwrap();
        assert_eq!(story.project_name, "雨夜");
        assert_eq!(story.shots.len(), 1);
        assert!(provider.prompts.lock().unwrap()[0].contains("雨夜街角"));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let analyzer = StoryAnalyzer::new(FakeProvider::ok(REPLY));
        assert_matches!(analyzer.analyze("   ").await, Err(AnalysisError::EmptyInput));
    }

    #[tokio::test]
    async fn short_idea_falls_back_offline() {
        let analyzer = StoryAnalyzer::new(FakeProvider::failing());
        let story = analyzer.analyze("丧尸围城中的最后一家便利店").await.unwrap();
        assert_eq!(story.genre, "末世");
        assert!(!story.shots.is_empty());
    }

    #[tokio::test]
    async fn long_script_failure_propagates() {
        let analyzer = StoryAnalyzer::new(FakeProvider::failing());
        let script = "他推开门，走进了房间。".repeat(20);
        assert_matches!(
            analyzer.analyze(&script).await,
            Err(AnalysisError::Provider(GenerationError::Network(_)))
        );
    }

    #[tokio::test]
    async fn unparseable_reply_is_parse_error() {
        let analyzer = StoryAnalyzer::new(FakeProvider::ok("抱歉，我无法完成。"));
        assert_matches!(analyzer.analyze("一个故事").await, Err(AnalysisError::Parse(_)));
    }
}
