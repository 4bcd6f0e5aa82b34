use serde::{Deserialize, Serialize};

use crate::executor::Precision;
use crate::model_types::UpscalerModel;
use crate::request::RANDOM_SEED;
use crate::resolution::DEFAULT_BASE_SIZE;

pub const DEFAULT_MODEL_ID: &str = "stabilityai/stable-diffusion-xl-base-1.0";
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "blurry, low quality, distorted, deformed, ugly, bad anatomy";

/// Generation defaults applied when a request leaves a field unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub model_id: String,
    pub base_size: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub negative_prompt: String,
    pub use_fp16: bool,
    pub enable_attention_slicing: bool,
    pub enable_upscaling: bool,
    pub upscale_model: String,
    pub seed: i64,
}

impl GenerationDefaults {
    pub fn precision(&self) -> Precision {
        if self.use_fp16 { Precision::Half } else { Precision::Full }
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_size: DEFAULT_BASE_SIZE,
            num_inference_steps: 30,
            guidance_scale: 7.5,
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            use_fp16: true,
            enable_attention_slicing: true,
            enable_upscaling: true,
            upscale_model: UpscalerModel::default().name().to_string(),
            seed: RANDOM_SEED,
        }
    }
}
