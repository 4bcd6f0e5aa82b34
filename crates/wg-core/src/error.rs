use thiserror::Error;

use crate::model_types::UpscalerModel;

/// User-facing remediation shown when the GPU runs out of memory mid-run.
pub const OUT_OF_MEMORY_MESSAGE: &str =
    "Out of GPU memory. Try a smaller resolution or close other GPU applications.";

/// Failure taxonomy of a pipeline run. Every variant ends up as the
/// human-readable `PipelineResult::error` string.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", OUT_OF_MEMORY_MESSAGE)]
    ResourceExhausted,

    #[error("Unknown upscaler model: {name}. Choose from {available}")]
    UnknownModel { name: String, available: String },

    #[error("{0}")]
    StageFailure(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by a stage executor (diffusion model or upscaler).
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("CUDA out of memory")]
    OutOfMemory,

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model is not loaded")]
    NotLoaded,

    #[error("{0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised by the artifact store (gallery directory, sidecars, archives).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl From<ExecutorError> for PipelineError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::OutOfMemory => Self::ResourceExhausted,
            ExecutorError::UnknownModel(name) => Self::UnknownModel {
                name,
                available: UpscalerModel::names().join(", "),
            },
            other => Self::StageFailure(other.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        Self::StageFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_maps_to_remediation() {
        let err = PipelineError::from(ExecutorError::OutOfMemory);
        assert!(matches!(err, PipelineError::ResourceExhausted));
        assert_eq!(err.to_string(), OUT_OF_MEMORY_MESSAGE);
    }

    #[test]
    fn test_unknown_model_lists_registry() {
        let err = PipelineError::from(ExecutorError::UnknownModel("bogus".into()));
        let message = err.to_string();
        assert!(message.contains("bogus"));
        assert!(message.contains("RealESRGAN_x4plus"));
        assert!(message.contains("RealESRGAN_x2plus"));
    }

    #[test]
    fn test_backend_failure_is_stage_failure() {
        let err = PipelineError::from(ExecutorError::Backend("service exploded".into()));
        assert!(matches!(err, PipelineError::StageFailure(_)));
        assert_eq!(err.to_string(), "service exploded");
    }
}
