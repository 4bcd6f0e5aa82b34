pub mod archive;
pub mod error;
pub mod executor;
pub mod gallery;
pub mod imaging;
mod model_types;
pub mod orchestrator;
pub mod presets;
pub mod request;
pub mod resolution;
pub mod settings;
pub mod stage;

pub use error::{ExecutorError, PipelineError, StoreError};
pub use model_types::UpscalerModel;
pub use orchestrator::{Orchestrator, PipelineResult};
pub use request::{GenerationRequest, Seed};
pub use resolution::Resolution;
pub use stage::{PipelineStage, ProgressAggregator, ProgressSink, StageWeights};
