use std::time::Duration;

use wg_core::gallery::Gallery;
use wg_core::settings::GenerationDefaults;

use crate::gate::GenerationGate;
use crate::worker::PipelineWorker;

/// How long a generation socket may stay silent before its request arrives.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppState {
    pub gallery: Gallery,
    pub defaults: GenerationDefaults,
    pub gate: GenerationGate,
    pub worker: PipelineWorker,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(gallery: Gallery, defaults: GenerationDefaults, worker: PipelineWorker) -> Self {
        Self {
            gallery,
            defaults,
            gate: GenerationGate::new(),
            worker,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::path::Path;

    use wg_core::{Orchestrator, StageWeights};
    use wg_models::{PlaceholderGenerator, ResampleUpscaler};

    use super::*;

    /// State backed by the placeholder executors, saving into `dir`.
    pub fn placeholder_state(dir: &Path) -> AppState {
        let defaults = GenerationDefaults { base_size: 128, ..GenerationDefaults::default() };
        let gallery = Gallery::open(dir).unwrap();
        let worker_gallery = gallery.clone();
        let worker_defaults = defaults.clone();
        let worker = PipelineWorker::spawn(
            move || {
                Ok(Orchestrator::new(
                    Box::new(PlaceholderGenerator::new()),
                    Box::new(ResampleUpscaler::new()),
                    Box::new(worker_gallery),
                    worker_defaults,
                ))
            },
            StageWeights::default(),
        )
        .unwrap();
        AppState::new(gallery, defaults, worker)
    }
}
