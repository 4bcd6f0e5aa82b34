use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wg_core::gallery::{DEFAULT_PER_PAGE, HistoryEntry, MAX_PER_PAGE};
use wg_core::presets::DevicePreset;
use wg_core::settings::GenerationDefaults;
use wg_core::{GenerationRequest, Resolution, Seed};

use crate::error::AppError;

pub const DEFAULT_TARGET: Resolution = Resolution::new(3840, 2160);

/// First message a client sends on `/ws/generate`. Unset fields fall back
/// to the server's generation defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateRequestBody {
    pub prompt: String,
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_target_height")]
    pub target_height: u32,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub num_inference_steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub enable_upscaling: Option<bool>,
    #[serde(default)]
    pub upscale_model: Option<String>,
}

fn default_target_width() -> u32 {
    DEFAULT_TARGET.width
}

fn default_target_height() -> u32 {
    DEFAULT_TARGET.height
}

impl GenerateRequestBody {
    pub fn into_request(self, defaults: &GenerationDefaults) -> GenerationRequest {
        let target = Resolution::new(self.target_width, self.target_height);
        let mut request = GenerationRequest::with_defaults(self.prompt, target, defaults);
        request.negative_prompt = self.negative_prompt.filter(|s| !s.trim().is_empty());
        if let Some(steps) = self.num_inference_steps {
            request.num_inference_steps = steps;
        }
        if let Some(guidance_scale) = self.guidance_scale {
            request.guidance_scale = guidance_scale;
        }
        if let Some(seed) = self.seed {
            request.seed = Seed::from(seed);
        }
        if let Some(enabled) = self.enable_upscaling {
            request.enable_upscaling = enabled;
        }
        if let Some(model) = self.upscale_model {
            request.upscale_model = model;
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryItem {
    pub filename: String,
    pub image_url: String,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
    pub num_inference_steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub base_resolution: Option<Resolution>,
    pub target_resolution: Option<Resolution>,
    pub enable_upscaling: Option<bool>,
    pub upscale_model: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryEntry> for GalleryItem {
    fn from(entry: HistoryEntry) -> Self {
        let image_url = format!("/images/{}", entry.filename);
        let meta = entry.metadata;
        Self {
            filename: entry.filename,
            image_url,
            prompt: meta.as_ref().map(|m| m.prompt.clone()),
            negative_prompt: meta.as_ref().map(|m| m.negative_prompt.clone()),
            seed: meta.as_ref().map(|m| m.seed),
            num_inference_steps: meta.as_ref().map(|m| m.num_inference_steps),
            guidance_scale: meta.as_ref().map(|m| m.guidance_scale),
            base_resolution: meta.as_ref().map(|m| m.base_resolution),
            target_resolution: meta.as_ref().map(|m| m.target_resolution),
            enable_upscaling: meta.as_ref().map(|m| m.enable_upscaling),
            upscale_model: meta.map(|m| m.upscale_model),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub resolution: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl GalleryQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::Validation("page must be at least 1".into()));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(AppError::Validation(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportQuery {
    pub filenames: String,
}

impl ExportQuery {
    /// Comma-separated names, trimmed, blanks dropped.
    pub fn names(&self) -> Vec<String> {
        self.filenames
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResolutionQuery {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaseResolutionResponse {
    pub base_width: u32,
    pub base_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetEntry {
    pub name: &'static str,
    /// Size to request, aligned for the pipeline
    pub width: u32,
    pub height: u32,
    /// Native panel size of the device
    pub device_width: u32,
    pub device_height: u32,
}

impl From<&DevicePreset> for PresetEntry {
    fn from(preset: &DevicePreset) -> Self {
        let target = preset.generation_target();
        Self {
            name: preset.name,
            width: target.width,
            height: target.height,
            device_width: preset.width,
            device_height: preset.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpscalerInfo {
    pub scale: u32,
    pub description: &'static str,
}

/// Defaults a client may show and override.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicDefaults {
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub negative_prompt: String,
    pub enable_upscaling: bool,
    pub upscale_model: String,
    pub seed: i64,
}

impl From<&GenerationDefaults> for PublicDefaults {
    fn from(defaults: &GenerationDefaults) -> Self {
        Self {
            num_inference_steps: defaults.num_inference_steps,
            guidance_scale: defaults.guidance_scale,
            negative_prompt: defaults.negative_prompt.clone(),
            enable_upscaling: defaults.enable_upscaling,
            upscale_model: defaults.upscale_model.clone(),
            seed: defaults.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetsResponse {
    pub presets: BTreeMap<&'static str, Vec<PresetEntry>>,
    pub upscaler_models: BTreeMap<&'static str, UpscalerInfo>,
    pub default_settings: PublicDefaults,
}
