pub mod diffusion;
pub mod resample;
pub mod service;
pub mod text_to_image;
pub mod upscaler;
pub mod weights;

pub use diffusion::RemoteDiffusion;
pub use resample::ResampleUpscaler;
pub use service::{DEFAULT_INFERENCE_URL, InferenceClient};
pub use text_to_image::PlaceholderGenerator;
pub use upscaler::RemoteUpscaler;
pub use weights::WeightCache;
