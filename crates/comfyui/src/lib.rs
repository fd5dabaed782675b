//! Local ComfyUI image backend: REST client, workflow graphs and the
//! image provider built on them.

pub mod api;
pub mod provider;
pub mod workflow;

pub use api::{ComfyUIApi, ComfyUIApiError};
pub use provider::ComfyUiImageProvider;

use storyboard_core::settings::Settings;

/// The ComfyUI provider, or `None` when `COMFYUI_ENABLED` is off.
pub fn provider_from_settings(settings: &Settings) -> Option<ComfyUiImageProvider> {
    if !settings.comfyui_enabled {
        return None;
    }
    let api = ComfyUIApi::new(settings.comfyui_url());
    Some(ComfyUiImageProvider::new(api, &settings.comfyui_model))
}
