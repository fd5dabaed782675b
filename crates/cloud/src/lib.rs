//! Cloud image and video generation clients.
//!
//! Jobs are submitted over REST, polled by id, and the result downloaded
//! into the project output directory.

pub mod api;
pub mod image;
pub mod video;

pub use api::{CloudApi, CloudApiError, PollPolicy};
pub use self::image::{CloudImageModel, CloudImageProvider};
pub use video::CloudVideoProvider;

use storyboard_core::settings::Settings;

/// Cloud image and video providers, or `None` when no API key is set.
pub fn providers_from_settings(settings: &Settings) -> Option<(CloudImageProvider, CloudVideoProvider)> {
    let key = settings.cloud_api_key.trim();
    if key.is_empty() {
        tracing::warn!("CLOUD_API_KEY is not set; cloud generation disabled");
        return None;
    }
    let api = CloudApi::new(&settings.cloud_api_base_url, key);
    Some((
        CloudImageProvider::new(api.clone(), CloudImageModel::parse(&settings.cloud_image_model)),
        CloudVideoProvider::new(api, &settings.cloud_video_model),
    ))
}
