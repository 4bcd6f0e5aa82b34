//! Blocking client for the local Python inference service that hosts the
//! diffusion and super-resolution models.

use std::io::BufReader;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wg_core::ExecutorError;
use wg_core::imaging::{decode_rgb, encode_png};

pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:5000";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceError {
    pub error: String,
    #[serde(default)]
    pub kind: Option<String>,
}

impl From<ServiceError> for ExecutorError {
    fn from(err: ServiceError) -> Self {
        match err.kind.as_deref() {
            Some("out_of_memory") => ExecutorError::OutOfMemory,
            Some("unknown_model") => ExecutorError::UnknownModel(err.error),
            _ => ExecutorError::Backend(format!("Service error: {}", err.error)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    client: Client,
}

impl InferenceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecutorError> {
        // generation and upscaling can take minutes, only connecting is bounded
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ExecutorError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POSTs a JSON body and returns the raw successful response.
    pub fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ExecutorError> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().map_err(|e| {
            ExecutorError::Backend(format!(
                "Failed to connect to inference service at {}: {}. Make sure the Python service is running",
                url, e
            ))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(error_from_body(status.as_u16(), &body))
    }

    pub fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ExecutorError> {
        self.post(path, body)?
            .json()
            .map_err(|e| ExecutorError::Backend(format!("Failed to parse response: {}", e)))
    }

    /// POSTs a JSON body and hands back the response as a line reader.
    pub fn post_stream<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<BufReader<Response>, ExecutorError> {
        Ok(BufReader::new(self.post(path, body)?))
    }
}

pub(crate) fn error_from_body(status: u16, body: &str) -> ExecutorError {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(err) => err.into(),
        Err(_) => ExecutorError::Backend(format!("HTTP {}: {}", status, body)),
    }
}

pub(crate) fn image_to_base64(image: &RgbImage) -> Result<String, ExecutorError> {
    Ok(STANDARD.encode(encode_png(image)?))
}

pub(crate) fn image_from_base64(data: &str) -> Result<RgbImage, ExecutorError> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| ExecutorError::Backend(format!("Invalid image payload: {}", e)))?;
    Ok(decode_rgb(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_out_of_memory_kind() {
        let err = error_from_body(500, r#"{"error": "CUDA out of memory", "kind": "out_of_memory"}"#);
        assert!(matches!(err, ExecutorError::OutOfMemory));
    }

    #[test]
    fn test_unstructured_error_body() {
        let err = error_from_body(502, "Bad Gateway");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");

        let err = error_from_body(500, r#"{"error": "weights corrupt"}"#);
        assert_eq!(err.to_string(), "Service error: weights corrupt");
    }

    #[test]
    fn test_url_joining() {
        let client = InferenceClient::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(client.url("/diffusion/load"), "http://127.0.0.1:5000/diffusion/load");
    }

    #[test]
    fn test_base64_image_round_trip() {
        let image = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let encoded = image_to_base64(&image).unwrap();
        assert_eq!(image_from_base64(&encoded).unwrap(), image);
        assert!(image_from_base64("not base64 at all!").is_err());
    }
}
