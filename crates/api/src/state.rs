use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use storyboard_core::generation::{ImageProvider, VideoProvider};
use storyboard_core::naming::project_output_dir;
use storyboard_core::settings::{ImageBackend, Settings};
use storyboard_db::ProjectStore;
use storyboard_llm::StoryAnalyzer;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`. Providers are optional;
/// a missing provider turns the matching endpoints into reported failures
/// rather than errors.
#[derive(Clone)]
pub struct AppState {
    /// Every loaded project, persisted as JSON.
    pub store: Arc<ProjectStore>,
    /// Domain settings (directories, thresholds, provider selection).
    pub settings: Arc<Settings>,
    /// HTTP server configuration.
    pub config: Arc<ServerConfig>,
    pub analyzer: Option<Arc<StoryAnalyzer>>,
    pub image_provider: Option<Arc<dyn ImageProvider>>,
    pub video_provider: Option<Arc<dyn VideoProvider>>,
}

impl AppState {
    /// Build state with providers chosen from `settings`.
    pub fn from_settings(store: ProjectStore, settings: Settings, config: ServerConfig) -> Self {
        let analyzer = storyboard_llm::provider_from_settings(&settings)
            .map(|provider| Arc::new(StoryAnalyzer::new(provider)));

        let cloud = storyboard_cloud::providers_from_settings(&settings);
        let (cloud_image, video_provider) = match cloud {
            Some((image, video)) => (
                Some(Arc::new(image) as Arc<dyn ImageProvider>),
                Some(Arc::new(video) as Arc<dyn VideoProvider>),
            ),
            None => (None, None),
        };

        let image_provider = match settings.image_backend {
            ImageBackend::Cloud => cloud_image,
            ImageBackend::ComfyUi => storyboard_comfyui::provider_from_settings(&settings)
                .map(|p| Arc::new(p) as Arc<dyn ImageProvider>),
        };

        tracing::info!(
            analyzer = analyzer.as_ref().map(|a| a.provider_name().to_string()),
            image = image_provider.as_ref().map(|p| p.name().to_string()),
            video = video_provider.as_ref().map(|p| p.name().to_string()),
            "Providers configured"
        );

        Self {
            store: Arc::new(store),
            settings: Arc::new(settings),
            config: Arc::new(config),
            analyzer,
            image_provider,
            video_provider,
        }
    }

    pub fn batch_threshold(&self) -> Duration {
        Duration::from_secs(self.settings.batch_threshold_secs)
    }

    /// Output folder for a project, keyed by its sanitized name.
    pub fn project_outputs(&self, project_name: &str) -> PathBuf {
        project_output_dir(&self.settings.outputs_dir(), project_name)
    }
}
