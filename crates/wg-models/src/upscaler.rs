use image::RgbImage;
use log::info;
use serde::{Deserialize, Serialize};
use wg_core::executor::{Upscaler, UpscalerOptions, resolve_upscaler};
use wg_core::{ExecutorError, UpscalerModel};

use crate::service::{InferenceClient, image_from_base64, image_to_base64};
use crate::weights::WeightCache;

#[derive(Serialize)]
struct LoadRequest<'a> {
    model_name: &'a str,
    weights_path: String,
    scale: u32,
    num_block: u32,
    tile: u32,
    half: bool,
}

#[derive(Serialize)]
struct EnhanceRequest {
    png: String,
    outscale: u32,
}

#[derive(Deserialize)]
struct EnhanceResponse {
    png: String,
}

/// Real-ESRGAN running inside the inference service.
pub struct RemoteUpscaler {
    client: InferenceClient,
    weights: WeightCache,
    loaded: Option<UpscalerModel>,
}

impl RemoteUpscaler {
    pub fn new(client: InferenceClient, weights: WeightCache) -> Self {
        Self { client, weights, loaded: None }
    }
}

impl Upscaler for RemoteUpscaler {
    fn load(
        &mut self,
        model_name: &str,
        options: &UpscalerOptions,
    ) -> Result<UpscalerModel, ExecutorError> {
        let model = resolve_upscaler(model_name)?;
        if self.loaded == Some(model) {
            return Ok(model);
        }
        self.unload()?;

        let weights_path = self.weights.ensure(model)?;
        info!("Loading upscaler {}", model.name());
        let body = LoadRequest {
            model_name: model.name(),
            weights_path: weights_path.to_string_lossy().into_owned(),
            scale: model.scale(),
            num_block: model.num_block(),
            tile: options.tile_size,
            half: options.half_precision,
        };
        self.client.post("upscaler/load", &body)?;
        self.loaded = Some(model);
        Ok(model)
    }

    fn enhance(&mut self, image: &RgbImage, scale: u32) -> Result<RgbImage, ExecutorError> {
        if self.loaded.is_none() {
            return Err(ExecutorError::NotLoaded);
        }
        let body = EnhanceRequest { png: image_to_base64(image)?, outscale: scale };
        let response: EnhanceResponse = self.client.post_json("upscaler/enhance", &body)?;
        image_from_base64(&response.png)
    }

    fn unload(&mut self) -> Result<(), ExecutorError> {
        let Some(model) = self.loaded else {
            return Ok(());
        };
        info!("Unloading upscaler {}", model.name());
        self.client.post("upscaler/unload", &serde_json::json!({}))?;
        self.loaded = None;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}
