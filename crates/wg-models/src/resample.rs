use image::RgbImage;
use image::imageops::{self, FilterType};
use log::info;
use wg_core::executor::{Upscaler, UpscalerOptions, resolve_upscaler};
use wg_core::{ExecutorError, UpscalerModel};

/// CPU Lanczos upscaler that stands in for Real-ESRGAN when no GPU service
/// is available. Honours the registry and the native factor of the model.
#[derive(Default)]
pub struct ResampleUpscaler {
    loaded: Option<UpscalerModel>,
}

impl ResampleUpscaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Upscaler for ResampleUpscaler {
    fn load(
        &mut self,
        model_name: &str,
        _options: &UpscalerOptions,
    ) -> Result<UpscalerModel, ExecutorError> {
        let model = resolve_upscaler(model_name)?;
        info!("Resample upscaler standing in for {}", model.name());
        self.loaded = Some(model);
        Ok(model)
    }

    fn enhance(&mut self, image: &RgbImage, scale: u32) -> Result<RgbImage, ExecutorError> {
        if self.loaded.is_none() {
            return Err(ExecutorError::NotLoaded);
        }
        let (width, height) = image.dimensions();
        Ok(imageops::resize(image, width * scale, height * scale, FilterType::Lanczos3))
    }

    fn unload(&mut self) -> Result<(), ExecutorError> {
        self.loaded = None;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}
