use serde::{Deserialize, Serialize};
use wg_core::{PipelineResult, PipelineStage, Resolution};

/// Records sent over `/ws/generate`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerateEvent {
    Progress {
        stage: PipelineStage,
        progress: f32,
        message: String,
    },
    Complete {
        success: bool,
        image_url: Option<String>,
        filename: Option<String>,
        seed_used: Option<i64>,
        base_resolution: Option<Resolution>,
        target_resolution: Option<Resolution>,
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

impl GenerateEvent {
    /// Overall progress is rounded to 4 decimals.
    pub fn progress(stage: PipelineStage, overall: f32, message: &str) -> Self {
        Self::Progress {
            stage,
            progress: (overall * 10_000.0).round() / 10_000.0,
            message: message.to_string(),
        }
    }

    pub fn complete(result: &PipelineResult) -> Self {
        let filename = result.output_filename();
        Self::Complete {
            success: result.is_success(),
            image_url: filename.as_ref().map(|f| format!("/images/{}", f)),
            filename,
            seed_used: result.seed_used,
            base_resolution: Some(result.base_resolution),
            target_resolution: Some(result.target_resolution),
            error: result.error.clone(),
        }
    }

    /// Terminal record for a run that ended without a result.
    pub fn aborted(error: impl Into<String>) -> Self {
        Self::Complete {
            success: false,
            image_url: None,
            filename: None,
            seed_used: None,
            base_resolution: None,
            target_resolution: None,
            error: Some(error.into()),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_wire_format() {
        let event = GenerateEvent::progress(PipelineStage::Generating, 0.123456, "Step 3/30");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "progress", "stage": "generating", "progress": 0.1235f32, "message": "Step 3/30" })
        );
    }

    #[test]
    fn test_error_wire_format() {
        let value = serde_json::to_value(GenerateEvent::error("busy")).unwrap();
        assert_eq!(value, json!({ "type": "error", "error": "busy" }));
    }

    #[test]
    fn test_aborted_is_unsuccessful_complete() {
        let value = serde_json::to_value(GenerateEvent::aborted("worker died")).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "worker died");
        assert!(value["image_url"].is_null());
    }
}
