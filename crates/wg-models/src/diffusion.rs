use std::io::BufRead;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use wg_core::ExecutorError;
use wg_core::executor::{BaseGenerator, GenerateParams, Generation, Precision};

use crate::service::{InferenceClient, ServiceError, image_from_base64};

#[derive(Serialize)]
struct LoadRequest<'a> {
    model_id: &'a str,
    precision: Precision,
    attention_slicing: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
    seed: Option<u64>,
}

impl<'a> From<&GenerateParams<'a>> for GenerateRequest<'a> {
    fn from(params: &GenerateParams<'a>) -> Self {
        Self {
            prompt: params.prompt,
            negative_prompt: params.negative_prompt,
            width: params.resolution.width,
            height: params.resolution.height,
            num_inference_steps: params.steps,
            guidance_scale: params.guidance_scale,
            seed: params.seed.fixed(),
        }
    }
}

/// One line of the `/diffusion/generate` stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    Progress {
        step: u32,
    },
    Image {
        png: String,
        #[serde(default)]
        seed: Option<u64>,
    },
    Error {
        error: String,
        #[serde(default)]
        kind: Option<String>,
    },
}

/// SDXL running inside the inference service.
pub struct RemoteDiffusion {
    client: InferenceClient,
    attention_slicing: bool,
    loaded: Option<String>,
}

impl RemoteDiffusion {
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            attention_slicing: true,
            loaded: None,
        }
    }

    pub fn with_attention_slicing(mut self, enabled: bool) -> Self {
        self.attention_slicing = enabled;
        self
    }
}

impl BaseGenerator for RemoteDiffusion {
    fn load(&mut self, model_id: &str, precision: Precision) -> Result<(), ExecutorError> {
        if self.loaded.as_deref() == Some(model_id) {
            return Ok(());
        }
        info!("Loading diffusion model {} ({:?})", model_id, precision);
        let body = LoadRequest {
            model_id,
            precision,
            attention_slicing: self.attention_slicing,
        };
        self.client.post("diffusion/load", &body)?;
        self.loaded = Some(model_id.to_string());
        Ok(())
    }

    fn generate(
        &mut self,
        params: &GenerateParams<'_>,
        on_step: &mut dyn FnMut(u32),
    ) -> Result<Generation, ExecutorError> {
        if self.loaded.is_none() {
            return Err(ExecutorError::NotLoaded);
        }
        let reader = self
            .client
            .post_stream("diffusion/generate", &GenerateRequest::from(params))?;
        read_generation(reader, on_step)
    }

    fn unload(&mut self) -> Result<(), ExecutorError> {
        let Some(model_id) = self.loaded.as_deref() else {
            return Ok(());
        };
        info!("Unloading diffusion model {}", model_id);
        self.client.post("diffusion/unload", &serde_json::json!({}))?;
        self.loaded = None;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}

/// Consumes newline-delimited events until the image (or an error) arrives.
fn read_generation<R: BufRead>(
    reader: R,
    on_step: &mut dyn FnMut(u32),
) -> Result<Generation, ExecutorError> {
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: StreamEvent = serde_json::from_str(&line)
            .map_err(|e| ExecutorError::Backend(format!("Malformed stream event: {}", e)))?;
        match event {
            StreamEvent::Progress { step } => on_step(step),
            StreamEvent::Image { png, seed } => {
                debug!("Received base image (seed {:?})", seed);
                return Ok(Generation { image: image_from_base64(&png)?, seed });
            }
            StreamEvent::Error { error, kind } => return Err(ServiceError { error, kind }.into()),
        }
    }
    Err(ExecutorError::Backend(
        "Inference service closed the stream without an image".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::image_to_base64;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use wg_core::Resolution;
    use wg_core::request::Seed;

    fn image_line(seed: Option<u64>) -> String {
        let png = image_to_base64(&RgbImage::from_pixel(8, 4, Rgb([9, 9, 9]))).unwrap();
        serde_json::json!({ "type": "image", "png": png, "seed": seed }).to_string()
    }

    #[test]
    fn test_stream_forwards_steps_then_image() {
        let stream = format!(
            "{}\n\n{}\n{}\n",
            r#"{"type": "progress", "step": 0}"#,
            r#"{"type": "progress", "step": 1}"#,
            image_line(Some(1234)),
        );
        let mut steps = Vec::new();
        let generation = read_generation(Cursor::new(stream), &mut |s| steps.push(s)).unwrap();

        assert_eq!(steps, vec![0, 1]);
        assert_eq!(generation.image.dimensions(), (8, 4));
        assert_eq!(generation.seed, Some(1234));
    }

    #[test]
    fn test_stream_error_maps_out_of_memory() {
        let stream = concat!(
            r#"{"type": "progress", "step": 0}"#,
            "\n",
            r#"{"type": "error", "error": "CUDA out of memory", "kind": "out_of_memory"}"#,
        );
        let err = read_generation(Cursor::new(stream), &mut |_| {}).unwrap_err();
        assert!(matches!(err, ExecutorError::OutOfMemory));
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let stream = r#"{"type": "progress", "step": 0}"#;
        let err = read_generation(Cursor::new(stream), &mut |_| {}).unwrap_err();
        assert!(err.to_string().contains("without an image"));

        let err = read_generation(Cursor::new("garbage\n"), &mut |_| {}).unwrap_err();
        assert!(err.to_string().starts_with("Malformed stream event"));
    }

    #[test]
    fn test_request_carries_fixed_seed_only() {
        let mut params = GenerateParams {
            prompt: "aurora",
            negative_prompt: "blurry",
            resolution: Resolution::new(1024, 576),
            steps: 30,
            guidance_scale: 7.5,
            seed: Seed::Fixed(42),
        };
        let json = serde_json::to_value(GenerateRequest::from(&params)).unwrap();
        assert_eq!(json["seed"], 42);
        assert_eq!(json["width"], 1024);

        params.seed = Seed::Random;
        let json = serde_json::to_value(GenerateRequest::from(&params)).unwrap();
        assert!(json["seed"].is_null());
    }

    #[test]
    fn test_unload_without_load_is_noop() {
        let client = InferenceClient::new("http://127.0.0.1:9").unwrap();
        let mut diffusion = RemoteDiffusion::new(client);
        assert!(diffusion.unload().is_ok());
        assert!(diffusion.unload().is_ok());
        assert!(!diffusion.is_loaded());
    }

    #[test]
    fn test_generate_requires_load() {
        let client = InferenceClient::new("http://127.0.0.1:9").unwrap();
        let mut diffusion = RemoteDiffusion::new(client);
        let params = GenerateParams {
            prompt: "aurora",
            negative_prompt: "",
            resolution: Resolution::new(64, 64),
            steps: 1,
            guidance_scale: 7.5,
            seed: Seed::Random,
        };
        let err = diffusion.generate(&params, &mut |_| {}).unwrap_err();
        assert!(matches!(err, ExecutorError::NotLoaded));
    }
}
