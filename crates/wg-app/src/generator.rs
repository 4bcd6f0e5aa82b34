use anyhow::Context;
use tracing::info;
use wg_core::Orchestrator;
use wg_core::executor::{BaseGenerator, Upscaler, UpscalerOptions};
use wg_core::gallery::Gallery;
use wg_core::settings::GenerationDefaults;
use wg_models::{
    InferenceClient, PlaceholderGenerator, RemoteDiffusion, RemoteUpscaler, ResampleUpscaler,
    WeightCache,
};

use crate::config::{AppConfig, ExecutorBackend};

pub fn generation_defaults(config: &AppConfig) -> GenerationDefaults {
    GenerationDefaults {
        base_size: config.base_size,
        ..GenerationDefaults::default()
    }
}

/// Wires the executors selected by the config into an orchestrator that
/// saves into the output directory. Runs on the worker thread.
pub fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let defaults = generation_defaults(config);
    let gallery = Gallery::open(&config.output_dir)
        .with_context(|| format!("Failed to open output directory {}", config.output_dir.display()))?;

    let (generator, upscaler): (Box<dyn BaseGenerator>, Box<dyn Upscaler>) = match config.backend {
        ExecutorBackend::Remote => {
            let client = InferenceClient::new(&config.inference_url)?;
            info!("Using inference service at {}", client.base_url());
            let weights = WeightCache::new(&config.model_dir)?;
            (
                Box::new(
                    RemoteDiffusion::new(client.clone())
                        .with_attention_slicing(defaults.enable_attention_slicing),
                ),
                Box::new(RemoteUpscaler::new(client, weights)),
            )
        }
        ExecutorBackend::Placeholder => {
            info!("Using placeholder executors");
            (Box::new(PlaceholderGenerator::new()), Box::new(ResampleUpscaler::new()))
        }
    };

    let options = UpscalerOptions {
        tile_size: config.upscaler_tile,
        half_precision: defaults.use_fp16,
    };
    Ok(Orchestrator::new(generator, upscaler, Box::new(gallery), defaults)
        .with_upscaler_options(options))
}
