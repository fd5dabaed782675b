//! Image and video generation for shots, plus reference images for
//! characters, scenes and props.
//!
//! Provider calls never run under the project lock: the handler works from
//! a snapshot, awaits the provider, then re-enters the store to attach the
//! verified file. Provider failures are reported as a failed
//! [`GenerationResult`] with status 200, not as HTTP errors.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use storyboard_core::error::CoreError;
use storyboard_core::generation::{
    image_request, video_output_path, GenerationResult, ImageProvider, VideoRequest,
};
use storyboard_core::project::{Project, ShotStatus};
use storyboard_core::references::{reference_image_request, ReferenceSubject};
use storyboard_core::shot_prompt;
use storyboard_core::types::EntityId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const NO_IMAGE_BACKEND: &str = "No image backend is configured";
const NO_VIDEO_BACKEND: &str = "No video backend is configured";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateImage {
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateVideo {
    pub prompt: Option<String>,
    pub model: Option<String>,
}

/// Per-shot entry of a generate-all run.
#[derive(Debug, Serialize)]
pub struct ShotGeneration {
    pub shot_id: EntityId,
    pub shot_number: u32,
    #[serde(flatten)]
    pub result: GenerationResult,
}

#[derive(Debug, Default, Serialize)]
pub struct GenerateAllReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Shots that already had an image on disk.
    pub skipped: usize,
    pub results: Vec<ShotGeneration>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Generate one shot's image against `project` and attach it on success.
async fn run_image(
    state: &AppState,
    provider: &dyn ImageProvider,
    project: &Project,
    shot_id: EntityId,
    custom_prompt: Option<&str>,
) -> AppResult<GenerationResult> {
    let shot = project
        .shot(shot_id)
        .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;
    let request = image_request(
        shot,
        project,
        custom_prompt,
        &state.settings.outputs_dir(),
        provider.model_suffix(),
        Utc::now(),
    );
    tracing::info!(
        project_id = %project.id,
        shot_id = %shot_id,
        provider = provider.name(),
        references = request.references.len(),
        "Generating shot image"
    );

    let path = match provider.generate_image(&request).await {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(project_id = %project.id, shot_id = %shot_id, error = %e, "Image generation failed");
            return Ok(GenerationResult::failed(e.to_string()));
        }
    };

    let custom = custom_prompt.map(str::to_string);
    let attached = path.clone();
    let shot_number = state
        .store
        .update(project.id, None, move |p| {
            let shot = p
                .shot_mut(shot_id)
                .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;
            shot.output_image = Some(attached);
            if let Some(custom) = custom {
                shot.generated_prompt = custom;
            }
            Ok(shot.shot_number)
        })
        .await?;

    Ok(GenerationResult::succeeded(
        format!("Shot {shot_number} generated with {}", provider.name()),
        path,
    ))
}

/// POST /api/v1/projects/{id}/shots/{shot_id}/generate
pub async fn generate_image(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<GenerateImage>,
) -> AppResult<Json<DataResponse<GenerationResult>>> {
    let project = state.store.get(project_id).await?;
    let Some(provider) = state.image_provider.clone() else {
        project
            .shot(shot_id)
            .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;
        return Ok(Json(DataResponse::new(GenerationResult::failed(NO_IMAGE_BACKEND))));
    };

    let custom = non_empty(input.custom_prompt.as_deref());
    let result = run_image(&state, provider.as_ref(), &project, shot_id, custom).await?;
    Ok(Json(DataResponse::new(result)))
}

/// POST /api/v1/projects/{id}/{kind}/{entity_id}/generate
///
/// Renders a reference sheet for one character, scene or prop and stores
/// it on the entity.
pub async fn generate_reference<T>(
    State(state): State<AppState>,
    Path((project_id, entity_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<GenerateImage>,
) -> AppResult<Json<DataResponse<GenerationResult>>>
where
    T: ReferenceSubject + Send + Sync + 'static,
{
    let project = state.store.get(project_id).await?;
    let entity = project
        .entity::<T>(entity_id)
        .ok_or_else(|| CoreError::not_found(T::LABEL, entity_id))?;
    let Some(provider) = state.image_provider.clone() else {
        return Ok(Json(DataResponse::new(GenerationResult::failed(NO_IMAGE_BACKEND))));
    };

    let request = reference_image_request(
        entity,
        &project,
        non_empty(input.custom_prompt.as_deref()),
        &state.settings.assets_dir(),
        provider.model_suffix(),
        Utc::now(),
    );
    tracing::info!(
        project_id = %project_id,
        entity_id = %entity_id,
        kind = T::LABEL,
        provider = provider.name(),
        "Generating reference image"
    );

    let path = match provider.generate_image(&request).await {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(project_id = %project_id, entity_id = %entity_id, error = %e, "Reference generation failed");
            return Ok(Json(DataResponse::new(GenerationResult::failed(e.to_string()))));
        }
    };

    let attached = path.clone();
    let name = state
        .store
        .update(project_id, None, move |p| {
            let entity = p
                .entity_mut::<T>(entity_id)
                .ok_or_else(|| CoreError::not_found(T::LABEL, entity_id))?;
            entity.attach_reference(attached);
            Ok(entity.name().to_string())
        })
        .await?;

    Ok(Json(DataResponse::new(GenerationResult::succeeded(
        format!("{} reference for {name} generated with {}", T::LABEL, provider.name()),
        path,
    ))))
}

/// POST /api/v1/projects/{id}/generate/all
///
/// Generates every shot that has no image on disk, one at a time, against
/// a fresh snapshot each time so edits made meanwhile are honored.
pub async fn generate_all(
    State(state): State<AppState>,
    Path(project_id): Path<EntityId>,
) -> AppResult<Json<DataResponse<GenerateAllReport>>> {
    let snapshot = state.store.get(project_id).await?;
    let provider: Option<Arc<dyn ImageProvider>> = state.image_provider.clone();
    let mut report = GenerateAllReport::default();

    for planned in &snapshot.shots {
        if planned.status() == ShotStatus::Completed {
            report.skipped += 1;
            continue;
        }

        let project = state.store.get(project_id).await?;
        let Some(shot) = project.shot(planned.id) else {
            continue;
        };
        let shot_number = shot.shot_number;
        let result = match &provider {
            Some(provider) => run_image(&state, provider.as_ref(), &project, planned.id, None).await?,
            None => GenerationResult::failed(NO_IMAGE_BACKEND),
        };

        if result.success {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
        report.results.push(ShotGeneration {
            shot_id: planned.id,
            shot_number,
            result,
        });
    }

    tracing::info!(
        project_id = %project_id,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Batch generation finished"
    );
    Ok(Json(DataResponse::new(report)))
}

/// POST /api/v1/projects/{id}/shots/{shot_id}/video
///
/// Animates the shot's existing image. The video lands next to the image
/// with the same stem so batch linking pairs them.
pub async fn generate_video(
    State(state): State<AppState>,
    Path((project_id, shot_id)): Path<(EntityId, EntityId)>,
    Json(input): Json<GenerateVideo>,
) -> AppResult<Json<DataResponse<GenerationResult>>> {
    let project = state.store.get(project_id).await?;
    let shot = project
        .shot(shot_id)
        .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;

    let Some(provider) = state.video_provider.clone() else {
        return Ok(Json(DataResponse::new(GenerationResult::failed(NO_VIDEO_BACKEND))));
    };
    let source_image = match (&shot.output_image, shot.image_exists()) {
        (Some(path), true) => path.clone(),
        _ => {
            return Ok(Json(DataResponse::new(GenerationResult::failed(format!(
                "Shot {} has no generated image",
                shot.shot_number
            )))))
        }
    };

    let request = VideoRequest {
        prompt: non_empty(input.prompt.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| shot_prompt::render_prompt(shot, &project)),
        model: non_empty(input.model.as_deref()).map(str::to_string),
        output_path: video_output_path(&source_image),
        source_image,
        aspect_ratio: project.style.aspect_ratio,
    };
    tracing::info!(project_id = %project_id, shot_id = %shot_id, provider = provider.name(), "Generating shot video");

    let path = match provider.generate_video(&request).await {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(project_id = %project_id, shot_id = %shot_id, error = %e, "Video generation failed");
            return Ok(Json(DataResponse::new(GenerationResult::failed(e.to_string()))));
        }
    };

    let attached = path.clone();
    let shot_number = state
        .store
        .update(project_id, None, move |p| {
            let shot = p
                .shot_mut(shot_id)
                .ok_or_else(|| CoreError::not_found("Shot", shot_id))?;
            shot.output_video = Some(attached);
            Ok(shot.shot_number)
        })
        .await?;

    Ok(Json(DataResponse::new(GenerationResult::succeeded(
        format!("Video for shot {shot_number} generated with {}", provider.name()),
        path,
    ))))
}
