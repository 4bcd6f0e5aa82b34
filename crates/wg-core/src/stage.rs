//! Pipeline stages, progress reporting and the stage-to-overall weight table.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    LoadingModel,
    Generating,
    UnloadingModel,
    LoadingUpscaler,
    Upscaling,
    Saving,
    Complete,
    Error,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingModel => "loading_model",
            Self::Generating => "generating",
            Self::UnloadingModel => "unloading_model",
            Self::LoadingUpscaler => "loading_upscaler",
            Self::Upscaling => "upscaling",
            Self::Saving => "saving",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives `(stage, fraction within stage, message)` updates from a run.
pub trait ProgressSink {
    fn report(&mut self, stage: PipelineStage, fraction: f32, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(PipelineStage, f32, &str),
{
    fn report(&mut self, stage: PipelineStage, fraction: f32, message: &str) {
        self(stage, fraction, message)
    }
}

/// Maps each stage to a `[lo, hi]` sub-range of the overall 0..1 scale.
///
/// Stages without a range (idle, error) do not move the overall value.
#[derive(Debug, Clone, PartialEq)]
pub struct StageWeights {
    ranges: HashMap<PipelineStage, (f32, f32)>,
}

impl StageWeights {
    pub fn empty() -> Self {
        Self { ranges: HashMap::new() }
    }

    pub fn with_range(mut self, stage: PipelineStage, lo: f32, hi: f32) -> Self {
        self.ranges.insert(stage, (lo, hi));
        self
    }

    pub fn range(&self, stage: PipelineStage) -> Option<(f32, f32)> {
        self.ranges.get(&stage).copied()
    }

    /// `lo + fraction * (hi - lo)`, clamped to 1.0. Written as a blend so
    /// both endpoints come out exact.
    pub fn overall(&self, stage: PipelineStage, fraction: f32) -> Option<f32> {
        let (lo, hi) = self.range(stage)?;
        let fraction = fraction.clamp(0.0, 1.0);
        Some((lo * (1.0 - fraction) + hi * fraction).min(1.0))
    }
}

impl Default for StageWeights {
    fn default() -> Self {
        Self::empty()
            .with_range(PipelineStage::LoadingModel, 0.0, 0.15)
            .with_range(PipelineStage::Generating, 0.15, 0.65)
            .with_range(PipelineStage::UnloadingModel, 0.65, 0.70)
            .with_range(PipelineStage::LoadingUpscaler, 0.70, 0.75)
            .with_range(PipelineStage::Upscaling, 0.75, 0.95)
            .with_range(PipelineStage::Saving, 0.95, 1.0)
            .with_range(PipelineStage::Complete, 1.0, 1.0)
    }
}

/// Folds per-stage updates of one run into a non-decreasing overall value.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    weights: StageWeights,
    last: f32,
}

impl ProgressAggregator {
    pub fn new(weights: StageWeights) -> Self {
        Self { weights, last: 0.0 }
    }

    pub fn update(&mut self, stage: PipelineStage, fraction: f32) -> f32 {
        if let Some(overall) = self.weights.overall(stage, fraction) {
            self.last = self.last.max(overall);
        }
        self.last
    }
}
