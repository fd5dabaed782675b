//! Text providers for story analysis: a local CLI tool fed over stdin, or
//! an OpenAI-compatible chat completions endpoint.

pub mod analyzer;
pub mod cli;
pub mod cloud;

use std::sync::Arc;
use std::time::Duration;

use storyboard_core::generation::TextProvider;
use storyboard_core::settings::{LlmProviderKind, Settings};

pub use analyzer::{AnalysisError, StoryAnalyzer};
pub use cli::CliProvider;
pub use cloud::CloudChatProvider;

/// Build the configured text provider. The cloud provider needs an API key;
/// without one `None` is returned and analysis endpoints report the gap.
pub fn provider_from_settings(settings: &Settings) -> Option<Arc<dyn TextProvider>> {
    let timeout = Duration::from_secs(settings.llm_timeout_secs);
    match settings.llm_provider {
        LlmProviderKind::Cli => Some(Arc::new(CliProvider::new(
            settings.llm_cli_command.clone(),
            timeout,
        ))),
        LlmProviderKind::Cloud => {
            if settings.cloud_api_key.trim().is_empty() {
                tracing::warn!("LLM_PROVIDER=cloud but no cloud API key is set");
                return None;
            }
            Some(Arc::new(CloudChatProvider::new(
                settings.cloud_api_base_url.clone(),
                settings.cloud_api_key.clone(),
                settings.llm_cloud_model.clone(),
                timeout,
            )))
        }
    }
}
