//! Contracts for the two GPU-resident stage executors.
//!
//! An executor owns its loaded model state. The orchestrator owns the
//! executors exclusively and drives `load` / run / `unload` for exactly one
//! stage at a time, so the two models are never resident together.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::model_types::UpscalerModel;
use crate::request::Seed;
use crate::resolution::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[serde(rename = "fp16")]
    Half,
    #[serde(rename = "fp32")]
    Full,
}

/// Inputs of one diffusion call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams<'a> {
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub resolution: Resolution,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Seed,
}

/// Output of one diffusion call. `seed` is the draw actually used, when the
/// backend reports it.
#[derive(Debug, Clone)]
pub struct Generation {
    pub image: RgbImage,
    pub seed: Option<u64>,
}

/// Text-to-image diffusion model.
///
/// A fixed seed must give reproducible output for identical inputs.
pub trait BaseGenerator: Send {
    fn load(&mut self, model_id: &str, precision: Precision) -> Result<(), ExecutorError>;

    /// Runs the denoising loop. `on_step` receives the zero-based index of
    /// each completed step.
    fn generate(
        &mut self,
        params: &GenerateParams<'_>,
        on_step: &mut dyn FnMut(u32),
    ) -> Result<Generation, ExecutorError>;

    /// Releases the model and its GPU memory. A no-op when nothing is loaded.
    fn unload(&mut self) -> Result<(), ExecutorError>;

    fn is_loaded(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpscalerOptions {
    /// Tile edge in pixels, 0 disables tiling
    pub tile_size: u32,
    pub half_precision: bool,
}

impl Default for UpscalerOptions {
    fn default() -> Self {
        Self {
            tile_size: 0,
            half_precision: true,
        }
    }
}

/// Super-resolution model working at a fixed integer factor.
pub trait Upscaler: Send {
    /// Loads a registered model by name, failing with
    /// [`ExecutorError::UnknownModel`] for anything else.
    fn load(
        &mut self,
        model_name: &str,
        options: &UpscalerOptions,
    ) -> Result<UpscalerModel, ExecutorError>;

    fn enhance(&mut self, image: &RgbImage, scale: u32) -> Result<RgbImage, ExecutorError>;

    /// Releases the model and its GPU memory. A no-op when nothing is loaded.
    fn unload(&mut self) -> Result<(), ExecutorError>;

    fn is_loaded(&self) -> bool;
}

/// Registry lookup shared by [`Upscaler`] implementations.
pub fn resolve_upscaler(model_name: &str) -> Result<UpscalerModel, ExecutorError> {
    UpscalerModel::from_name(model_name)
        .ok_or_else(|| ExecutorError::UnknownModel(model_name.to_string()))
}
