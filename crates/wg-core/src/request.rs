use crate::error::{PipelineError, Result};
use crate::resolution::Resolution;
use crate::settings::GenerationDefaults;

/// Wire/metadata value recorded for a random seed.
pub const RANDOM_SEED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seed {
    Fixed(u64),
    #[default]
    Random,
}

impl Seed {
    pub fn fixed(&self) -> Option<u64> {
        match self {
            Self::Fixed(seed) => Some(*seed),
            Self::Random => None,
        }
    }
}

/// Negative values mean random.
impl From<i64> for Seed {
    fn from(value: i64) -> Self {
        u64::try_from(value).map_or(Self::Random, Self::Fixed)
    }
}

/// One wallpaper generation, fully resolved against the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub target: Resolution,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub seed: Seed,
    pub enable_upscaling: bool,
    pub upscale_model: String,
    pub save_output: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, target: Resolution) -> Self {
        Self::with_defaults(prompt, target, &GenerationDefaults::default())
    }

    pub fn with_defaults(
        prompt: impl Into<String>,
        target: Resolution,
        defaults: &GenerationDefaults,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            target,
            num_inference_steps: defaults.num_inference_steps,
            guidance_scale: defaults.guidance_scale,
            seed: Seed::from(defaults.seed),
            enable_upscaling: defaults.enable_upscaling,
            upscale_model: defaults.upscale_model.clone(),
            save_output: true,
        }
    }

    pub fn negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    /// The negative prompt to condition on. A blank one falls back to `default`.
    pub fn negative_prompt_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.negative_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default)
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.num_inference_steps = steps;
        self
    }

    pub fn guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    pub fn upscaling(mut self, enabled: bool) -> Self {
        self.enable_upscaling = enabled;
        self
    }

    pub fn upscale_model(mut self, model: impl Into<String>) -> Self {
        self.upscale_model = model.into();
        self
    }

    pub fn save_output(mut self, save: bool) -> Self {
        self.save_output = save;
        self
    }

    /// Parameter checks that must pass before any model is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::Validation("Prompt must not be empty".into()));
        }
        self.target
            .validate()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        if self.num_inference_steps == 0 {
            return Err(PipelineError::Validation(
                "Number of inference steps must be positive".into(),
            ));
        }
        if !(self.guidance_scale.is_finite() && self.guidance_scale > 0.0) {
            return Err(PipelineError::Validation("Guidance scale must be positive".into()));
        }
        if self.seed.fixed().is_some_and(|seed| i64::try_from(seed).is_err()) {
            return Err(PipelineError::Validation("Seed must fit in a signed 64-bit integer".into()));
        }
        Ok(())
    }
}
