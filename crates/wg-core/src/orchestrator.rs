//! The two-stage pipeline: base generation, model swap, upscale, save.
//!
//! Only one model is ever resident. The diffusion model is unloaded before
//! the upscaler is loaded, and on any failure both executors are asked to
//! unload before the error is reported.

use std::path::PathBuf;

use chrono::Utc;
use image::RgbImage;
use log::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::executor::{BaseGenerator, GenerateParams, Upscaler, UpscalerOptions};
use crate::gallery::{ArtifactStore, GenerationMetadata};
use crate::imaging::resize_exact;
use crate::model_types::UpscalerModel;
use crate::request::{GenerationRequest, RANDOM_SEED, Seed};
use crate::resolution::{Resolution, calculate_base_resolution, calculate_upscale_factor};
use crate::settings::GenerationDefaults;
use crate::stage::{PipelineStage, ProgressSink};

/// Outcome of one run. `error` is set exactly when the run failed; the
/// remaining fields hold whatever was produced before that point.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub base_image: Option<RgbImage>,
    /// Final image at the target size, upscaled or plainly resampled
    pub upscaled_image: Option<RgbImage>,
    pub output_path: Option<PathBuf>,
    pub base_resolution: Resolution,
    pub target_resolution: Resolution,
    pub seed_used: Option<i64>,
    pub error: Option<String>,
}

impl PipelineResult {
    fn new(base_resolution: Resolution, target_resolution: Resolution) -> Self {
        Self {
            base_image: None,
            upscaled_image: None,
            output_path: None,
            base_resolution,
            target_resolution,
            seed_used: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn final_image(&self) -> Option<&RgbImage> {
        self.upscaled_image.as_ref()
    }

    pub fn output_filename(&self) -> Option<String> {
        self.output_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

pub struct Orchestrator {
    generator: Box<dyn BaseGenerator>,
    upscaler: Box<dyn Upscaler>,
    store: Box<dyn ArtifactStore>,
    defaults: GenerationDefaults,
    upscaler_options: UpscalerOptions,
}

impl Orchestrator {
    pub fn new(
        generator: Box<dyn BaseGenerator>,
        upscaler: Box<dyn Upscaler>,
        store: Box<dyn ArtifactStore>,
        defaults: GenerationDefaults,
    ) -> Self {
        let upscaler_options = UpscalerOptions {
            half_precision: defaults.use_fp16,
            ..UpscalerOptions::default()
        };
        Self { generator, upscaler, store, defaults, upscaler_options }
    }

    pub fn with_upscaler_options(mut self, options: UpscalerOptions) -> Self {
        self.upscaler_options = options;
        self
    }

    /// Runs one generation end to end. Never fails: errors are reported at
    /// [`PipelineStage::Error`] and stored in [`PipelineResult::error`].
    pub fn run_pipeline(
        &mut self,
        request: &GenerationRequest,
        progress: &mut dyn ProgressSink,
    ) -> PipelineResult {
        let target = request.target;
        let base = calculate_base_resolution(target, self.defaults.base_size);
        let mut result = PipelineResult::new(base, target);

        info!("Starting pipeline: target {}, base {}", target, base);

        let outcome = match request.validate() {
            Ok(()) => {
                let outcome = self.execute(request, &mut result, progress);
                if outcome.is_err() {
                    self.release_all();
                }
                outcome
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => info!("Pipeline complete: {}", target),
            Err(err) => {
                let error = err.to_string();
                let message = match err {
                    PipelineError::ResourceExhausted => error.clone(),
                    _ => format!("Pipeline error: {}", error),
                };
                warn!("{}", message);
                progress.report(PipelineStage::Error, 0.0, &message);
                result.error = Some(error);
            }
        }
        result
    }

    fn execute(
        &mut self,
        request: &GenerationRequest,
        result: &mut PipelineResult,
        progress: &mut dyn ProgressSink,
    ) -> Result<()> {
        let base = result.base_resolution;
        let target = result.target_resolution;

        emit(progress, PipelineStage::LoadingModel, 0.0, "Loading SDXL model...");
        self.generator.load(&self.defaults.model_id, self.defaults.precision())?;
        emit(progress, PipelineStage::LoadingModel, 1.0, "Model loaded.");

        emit(
            progress,
            PipelineStage::Generating,
            0.0,
            &format!("Generating {} base image...", base),
        );
        let negative_prompt = request.negative_prompt_or(&self.defaults.negative_prompt);
        let params = GenerateParams {
            prompt: &request.prompt,
            negative_prompt,
            resolution: base,
            steps: request.num_inference_steps,
            guidance_scale: request.guidance_scale,
            seed: request.seed,
        };
        let total = request.num_inference_steps;
        let generation = self.generator.generate(&params, &mut |step: u32| {
            let done = (step + 1).min(total);
            progress.report(
                PipelineStage::Generating,
                done as f32 / total as f32,
                &format!("Step {}/{}", done, total),
            );
        })?;

        result.seed_used = Some(match request.seed {
            Seed::Fixed(seed) => seed as i64,
            Seed::Random => generation
                .seed
                .and_then(|s| i64::try_from(s).ok())
                .unwrap_or(RANDOM_SEED),
        });
        let base_image = result.base_image.insert(generation.image);
        emit(progress, PipelineStage::Generating, 1.0, "Base image generated.");

        emit(progress, PipelineStage::UnloadingModel, 0.0, "Freeing generation model VRAM...");
        self.generator.unload()?;
        emit(progress, PipelineStage::UnloadingModel, 1.0, "VRAM freed.");

        let final_image = if request.enable_upscaling {
            emit(progress, PipelineStage::LoadingUpscaler, 0.0, "Loading upscaler...");
            let model = self.upscaler.load(&request.upscale_model, &self.upscaler_options)?;
            emit(progress, PipelineStage::LoadingUpscaler, 1.0, "Upscaler loaded.");

            let required = calculate_upscale_factor(base, target);
            if model.scale() < required {
                warn!(
                    "{} upscales x{}, target needs x{} ({}); resampling covers the rest",
                    model.name(),
                    model.scale(),
                    required,
                    UpscalerModel::for_factor(required).name()
                );
            }

            emit(progress, PipelineStage::Upscaling, 0.0, &format!("Upscaling to {}...", target));
            let enhanced = self.upscaler.enhance(base_image, model.scale())?;
            let upscaled = resize_exact(&enhanced, target);
            emit(progress, PipelineStage::Upscaling, 1.0, "Upscaling complete.");

            self.upscaler.unload()?;
            upscaled
        } else {
            resize_exact(base_image, target)
        };
        let final_image = result.upscaled_image.insert(final_image);

        if request.save_output {
            emit(progress, PipelineStage::Saving, 0.0, "Saving wallpaper...");
            let metadata = GenerationMetadata {
                prompt: request.prompt.clone(),
                negative_prompt: negative_prompt.to_string(),
                seed: result.seed_used.unwrap_or(RANDOM_SEED),
                num_inference_steps: request.num_inference_steps,
                guidance_scale: request.guidance_scale,
                base_resolution: base,
                target_resolution: target,
                enable_upscaling: request.enable_upscaling,
                upscale_model: request.upscale_model.clone(),
                timestamp: Utc::now(),
            };
            let path = self.store.persist(final_image, &metadata)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            result.output_path = Some(path);
            emit(progress, PipelineStage::Saving, 1.0, &format!("Saved to {}", name));
        }

        emit(progress, PipelineStage::Complete, 1.0, "Pipeline complete.");
        Ok(())
    }

    /// Best-effort unload of both models. Errors are logged and dropped so
    /// they never replace the failure that triggered the cleanup.
    fn release_all(&mut self) {
        if let Err(e) = self.generator.unload() {
            warn!("Failed to unload generation model during cleanup: {}", e);
        }
        if let Err(e) = self.upscaler.unload() {
            warn!("Failed to unload upscaler during cleanup: {}", e);
        }
    }
}

fn emit(progress: &mut dyn ProgressSink, stage: PipelineStage, fraction: f32, message: &str) {
    debug!("[{}] {:.2} {}", stage, fraction, message);
    progress.report(stage, fraction, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutorError, OUT_OF_MEMORY_MESSAGE, StoreError};
    use crate::executor::{Generation, Precision, resolve_upscaler};
    use crate::model_types::UpscalerModel;
    use crate::stage::{ProgressAggregator, StageWeights};
    use image::imageops::{self, FilterType};
    use image::Rgb;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        GeneratorLoad,
        GeneratorUnload,
        UpscalerLoad,
        UpscalerUnload,
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    #[derive(Default, Clone, Copy)]
    enum Failure {
        #[default]
        None,
        OutOfMemory,
        UnloadError,
    }

    struct MockGenerator {
        calls: CallLog,
        loaded: bool,
        failure: Failure,
        reported_seed: Option<u64>,
        negative_prompts: Arc<Mutex<Vec<String>>>,
    }

    impl BaseGenerator for MockGenerator {
        fn load(&mut self, _model_id: &str, _precision: Precision) -> std::result::Result<(), ExecutorError> {
            self.calls.lock().unwrap().push(Call::GeneratorLoad);
            self.loaded = true;
            Ok(())
        }

        fn generate(
            &mut self,
            params: &GenerateParams<'_>,
            on_step: &mut dyn FnMut(u32),
        ) -> std::result::Result<Generation, ExecutorError> {
            assert!(self.loaded);
            self.negative_prompts.lock().unwrap().push(params.negative_prompt.to_string());
            for step in 0..params.steps {
                on_step(step);
                if step == 1 && matches!(self.failure, Failure::OutOfMemory) {
                    return Err(ExecutorError::OutOfMemory);
                }
            }
            let image = RgbImage::from_pixel(
                params.resolution.width,
                params.resolution.height,
                Rgb([40, 80, 120]),
            );
            Ok(Generation { image, seed: self.reported_seed })
        }

        fn unload(&mut self) -> std::result::Result<(), ExecutorError> {
            self.calls.lock().unwrap().push(Call::GeneratorUnload);
            self.loaded = false;
            match self.failure {
                Failure::UnloadError => Err(ExecutorError::Backend("driver hiccup".into())),
                _ => Ok(()),
            }
        }

        fn is_loaded(&self) -> bool {
            self.loaded
        }
    }

    struct MockUpscaler {
        calls: CallLog,
        model: Option<UpscalerModel>,
        options: Arc<Mutex<Vec<UpscalerOptions>>>,
    }

    impl Upscaler for MockUpscaler {
        fn load(
            &mut self,
            model_name: &str,
            options: &UpscalerOptions,
        ) -> std::result::Result<UpscalerModel, ExecutorError> {
            self.calls.lock().unwrap().push(Call::UpscalerLoad);
            self.options.lock().unwrap().push(*options);
            let model = resolve_upscaler(model_name)?;
            self.model = Some(model);
            Ok(model)
        }

        fn enhance(&mut self, image: &RgbImage, scale: u32) -> std::result::Result<RgbImage, ExecutorError> {
            if self.model.is_none() {
                return Err(ExecutorError::NotLoaded);
            }
            let (w, h) = image.dimensions();
            Ok(imageops::resize(image, w * scale, h * scale, FilterType::Nearest))
        }

        fn unload(&mut self) -> std::result::Result<(), ExecutorError> {
            self.calls.lock().unwrap().push(Call::UpscalerUnload);
            self.model = None;
            Ok(())
        }

        fn is_loaded(&self) -> bool {
            self.model.is_some()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Arc<Mutex<Vec<GenerationMetadata>>>,
        broken: bool,
    }

    impl ArtifactStore for MemoryStore {
        fn persist(
            &self,
            image: &RgbImage,
            metadata: &GenerationMetadata,
        ) -> std::result::Result<PathBuf, StoreError> {
            if self.broken {
                return Err(StoreError::NotFound("outputs".into()));
            }
            assert_eq!(image.dimensions(), (metadata.target_resolution.width, metadata.target_resolution.height));
            self.saved.lock().unwrap().push(metadata.clone());
            Ok(PathBuf::from(format!("memory/{}.png", metadata.target_resolution)))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        calls: CallLog,
        saved: Arc<Mutex<Vec<GenerationMetadata>>>,
        negative_prompts: Arc<Mutex<Vec<String>>>,
        upscaler_options: Arc<Mutex<Vec<UpscalerOptions>>>,
    }

    fn harness(failure: Failure, reported_seed: Option<u64>, broken_store: bool) -> Harness {
        let calls = CallLog::default();
        let store = MemoryStore { broken: broken_store, ..MemoryStore::default() };
        let saved = store.saved.clone();
        let negative_prompts = Arc::new(Mutex::new(Vec::new()));
        let upscaler_options = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = Orchestrator::new(
            Box::new(MockGenerator {
                calls: calls.clone(),
                loaded: false,
                failure,
                reported_seed,
                negative_prompts: negative_prompts.clone(),
            }),
            Box::new(MockUpscaler {
                calls: calls.clone(),
                model: None,
                options: upscaler_options.clone(),
            }),
            Box::new(store),
            GenerationDefaults { base_size: 256, ..GenerationDefaults::default() },
        );
        Harness { orchestrator, calls, saved, negative_prompts, upscaler_options }
    }

    fn run(
        orchestrator: &mut Orchestrator,
        request: &GenerationRequest,
    ) -> (PipelineResult, Vec<(PipelineStage, f32, String)>) {
        let mut reports = Vec::new();
        let mut sink = |stage: PipelineStage, fraction: f32, message: &str| {
            reports.push((stage, fraction, message.to_string()))
        };
        let result = orchestrator.run_pipeline(request, &mut sink);
        (result, reports)
    }

    fn stage_sequence(reports: &[(PipelineStage, f32, String)]) -> Vec<PipelineStage> {
        let mut stages: Vec<PipelineStage> = reports.iter().map(|r| r.0).collect();
        stages.dedup();
        stages
    }

    fn count(calls: &CallLog, call: Call) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("lighthouse in a storm", Resolution::new(640, 360)).steps(4)
    }

    #[test]
    fn test_upscaling_disabled_skips_upscaler() {
        let mut h = harness(Failure::None, None, false);
        let (result, reports) = run(&mut h.orchestrator, &request().upscaling(false));

        assert!(result.is_success());
        assert_eq!(
            stage_sequence(&reports),
            vec![
                PipelineStage::LoadingModel,
                PipelineStage::Generating,
                PipelineStage::UnloadingModel,
                PipelineStage::Saving,
                PipelineStage::Complete,
            ]
        );
        assert_eq!(count(&h.calls, Call::UpscalerLoad), 0);
        assert_eq!(result.final_image().unwrap().dimensions(), (640, 360));
        assert_eq!(result.output_filename().as_deref(), Some("640x360.png"));
    }

    #[test]
    fn test_empty_negative_prompt_uses_default() {
        let mut h = harness(Failure::None, None, false);
        let (result, _) = run(&mut h.orchestrator, &request().upscaling(false).negative_prompt(""));
        assert!(result.is_success());

        let (result, _) = run(&mut h.orchestrator, &request().upscaling(false).negative_prompt("fog"));
        assert!(result.is_success());

        let default = GenerationDefaults::default().negative_prompt;
        assert_eq!(*h.negative_prompts.lock().unwrap(), vec![default.clone(), "fog".to_string()]);
        assert_eq!(h.saved.lock().unwrap()[0].negative_prompt, default);
    }

    #[test]
    fn test_full_run_messages_and_result() {
        let mut h = harness(Failure::None, None, false);
        let (result, reports) = run(&mut h.orchestrator, &request());

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.base_resolution, Resolution::new(256, 144));
        assert_eq!(result.base_image.as_ref().unwrap().dimensions(), (256, 144));
        assert_eq!(result.final_image().unwrap().dimensions(), (640, 360));

        let messages: Vec<&str> = reports.iter().map(|r| r.2.as_str()).collect();
        assert_eq!(messages[0], "Loading SDXL model...");
        assert!(messages.contains(&"Generating 256x144 base image..."));
        assert!(messages.contains(&"Step 4/4"));
        assert!(messages.contains(&"Upscaling to 640x360..."));
        assert!(messages.contains(&"Saved to 640x360.png"));
        assert_eq!(*messages.last().unwrap(), "Pipeline complete.");

        assert_eq!(count(&h.calls, Call::UpscalerLoad), 1);
        assert_eq!(count(&h.calls, Call::UpscalerUnload), 1);
        let saved = h.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].base_resolution, Resolution::new(256, 144));
        assert_eq!(saved[0].upscale_model, "RealESRGAN_x4plus");
    }

    #[test]
    fn test_out_of_memory_during_generation() {
        let mut h = harness(Failure::OutOfMemory, None, false);
        let (result, reports) = run(&mut h.orchestrator, &request());

        assert_eq!(result.error.as_deref(), Some(OUT_OF_MEMORY_MESSAGE));
        let (stage, _, message) = reports.last().unwrap();
        assert_eq!(*stage, PipelineStage::Error);
        assert!(message.contains("Try a smaller resolution"));

        assert_eq!(count(&h.calls, Call::GeneratorUnload), 1);
        assert_eq!(count(&h.calls, Call::UpscalerUnload), 1);
        assert_eq!(count(&h.calls, Call::UpscalerLoad), 0);
        assert!(result.base_image.is_none());
        assert!(h.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_models_never_resident_together() {
        let mut h = harness(Failure::None, None, false);
        let (result, _) = run(&mut h.orchestrator, &request());
        assert!(result.is_success());

        let (mut generator, mut upscaler) = (false, false);
        for call in h.calls.lock().unwrap().iter() {
            match call {
                Call::GeneratorLoad => generator = true,
                Call::GeneratorUnload => generator = false,
                Call::UpscalerLoad => upscaler = true,
                Call::UpscalerUnload => upscaler = false,
            }
            assert!(!(generator && upscaler), "both models resident after {call:?}");
        }
        assert!(!generator && !upscaler);
    }

    #[test]
    fn test_aggregated_progress_is_monotonic() {
        let mut h = harness(Failure::None, None, false);
        let mut aggregator = ProgressAggregator::new(StageWeights::default());
        let mut values = Vec::new();
        let mut sink = |stage: PipelineStage, fraction: f32, _: &str| {
            values.push(aggregator.update(stage, fraction));
        };
        let result = h.orchestrator.run_pipeline(&request().steps(12), &mut sink);

        assert!(result.is_success());
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_upscaler_options_reach_load() {
        let h = harness(Failure::None, None, false);
        let tiled = UpscalerOptions { tile_size: 256, half_precision: false };
        let mut orchestrator = h.orchestrator.with_upscaler_options(tiled);
        let (result, _) = run(&mut orchestrator, &request());
        assert!(result.is_success());
        assert_eq!(*h.upscaler_options.lock().unwrap(), vec![tiled]);
    }

    #[test]
    fn test_default_upscaler_options_follow_precision() {
        let h = harness(Failure::None, None, false);
        let mut orchestrator = h.orchestrator;
        run(&mut orchestrator, &request());
        let options = h.upscaler_options.lock().unwrap();
        assert_eq!(options[0].tile_size, 0);
        assert_eq!(options[0].half_precision, GenerationDefaults::default().use_fp16);
    }

    #[test]
    fn test_unknown_upscaler_model() {
        let mut h = harness(Failure::None, None, false);
        let (result, reports) = run(&mut h.orchestrator, &request().upscale_model("bogus"));

        let error = result.error.unwrap();
        assert!(error.starts_with("Unknown upscaler model: bogus"));
        assert!(error.contains("RealESRGAN_x2plus"));
        let (stage, _, message) = reports.last().unwrap();
        assert_eq!(*stage, PipelineStage::Error);
        assert_eq!(*message, format!("Pipeline error: {error}"));
        assert!(result.base_image.is_some());
        assert!(result.upscaled_image.is_none());
    }

    #[test]
    fn test_fixed_seed_is_echoed() {
        let mut h = harness(Failure::None, Some(999), false);
        let (result, _) = run(&mut h.orchestrator, &request().seed(Seed::Fixed(42)));
        assert_eq!(result.seed_used, Some(42));
        assert_eq!(h.saved.lock().unwrap()[0].seed, 42);
    }

    #[test]
    fn test_random_seed_records_draw_or_sentinel() {
        let mut h = harness(Failure::None, Some(31337), false);
        let (result, _) = run(&mut h.orchestrator, &request());
        assert_eq!(result.seed_used, Some(31337));

        let mut h = harness(Failure::None, None, false);
        let (result, _) = run(&mut h.orchestrator, &request());
        assert_eq!(result.seed_used, Some(RANDOM_SEED));
    }

    #[test]
    fn test_validation_failure_loads_nothing() {
        let mut h = harness(Failure::None, None, false);
        let bad = GenerationRequest::new("valid prompt", Resolution::new(1921, 1080));
        let (result, reports) = run(&mut h.orchestrator, &bad);

        assert_eq!(result.error.as_deref(), Some("Resolution must be divisible by 8"));
        assert!(h.calls.lock().unwrap().is_empty());
        assert_eq!(stage_sequence(&reports), vec![PipelineStage::Error]);
    }

    #[test]
    fn test_save_disabled_has_no_output() {
        let mut h = harness(Failure::None, None, false);
        let (result, reports) = run(&mut h.orchestrator, &request().save_output(false));
        assert!(result.is_success());
        assert!(result.output_path.is_none());
        assert!(!stage_sequence(&reports).contains(&PipelineStage::Saving));
        assert!(h.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_triggers_cleanup() {
        let mut h = harness(Failure::None, None, true);
        let (result, reports) = run(&mut h.orchestrator, &request());
        assert!(!result.is_success());
        assert!(result.upscaled_image.is_some());
        assert!(reports.last().unwrap().2.starts_with("Pipeline error: "));
        // once in the normal flow, once more during cleanup
        assert_eq!(count(&h.calls, Call::GeneratorUnload), 2);
        assert_eq!(count(&h.calls, Call::UpscalerUnload), 2);
    }

    #[test]
    fn test_cleanup_error_does_not_mask_failure() {
        let mut h = harness(Failure::UnloadError, None, false);
        let (result, _) = run(&mut h.orchestrator, &request());
        // the first unload fails the run, the cleanup unload fails again and is swallowed
        assert_eq!(result.error.as_deref(), Some("driver hiccup"));
        assert_eq!(count(&h.calls, Call::UpscalerUnload), 1);
    }
}
