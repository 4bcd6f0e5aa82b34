use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use wg_core::resolution::{DEFAULT_BASE_SIZE, validate_resolution};
use wg_models::DEFAULT_INFERENCE_URL;

/// Which executors drive the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorBackend {
    /// Models hosted by the local Python inference service
    Remote,
    /// Synthetic images and CPU resampling, no GPU needed
    Placeholder,
}

impl FromStr for ExecutorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "placeholder" => Ok(Self::Placeholder),
            other => bail!("EXECUTOR_BACKEND must be 'remote' or 'placeholder', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub output_dir: PathBuf,
    pub model_dir: PathBuf,
    pub inference_url: String,
    pub backend: ExecutorBackend,
    pub base_size: u32,
    /// Upscaler tile edge in pixels, 0 upscales the whole image at once
    pub upscaler_tile: u32,
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("Failed to read .env");
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("PORT", "8000").parse().context("PORT must be a number")?;
        let base_size: u32 = var("BASE_SIZE", &DEFAULT_BASE_SIZE.to_string())
            .parse()
            .context("BASE_SIZE must be a number")?;
        validate_resolution(base_size, base_size)
            .with_context(|| format!("BASE_SIZE {} is not a usable generation size", base_size))?;
        let upscaler_tile: u32 = var("UPSCALER_TILE", "0")
            .parse()
            .context("UPSCALER_TILE must be a number")?;
        let backend = var("EXECUTOR_BACKEND", "remote").parse()?;

        Ok(Self {
            port,
            output_dir: PathBuf::from(var("OUTPUT_DIR", "outputs")),
            model_dir: PathBuf::from(var("MODEL_DIR", "models")),
            inference_url: var("INFERENCE_URL", DEFAULT_INFERENCE_URL),
            backend,
            base_size,
            upscaler_tile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert_eq!(config.inference_url, "http://127.0.0.1:5000");
        assert_eq!(config.backend, ExecutorBackend::Remote);
        assert_eq!(config.base_size, 1024);
        assert_eq!(config.upscaler_tile, 0);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[("PORT", "9000"), ("EXECUTOR_BACKEND", "Placeholder"), ("OUTPUT_DIR", "/tmp/wg")])
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.backend, ExecutorBackend::Placeholder);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/wg"));
        assert_eq!(self::config(&[("UPSCALER_TILE", "400")]).unwrap().upscaler_tile, 400);
        assert!(self::config(&[("UPSCALER_TILE", "-1")]).is_err());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("PORT", "70000")]).is_err());
        assert!(config(&[("EXECUTOR_BACKEND", "cuda")]).is_err());
        assert!(config(&[("BASE_SIZE", "1000x")]).is_err());
        assert!(config(&[("BASE_SIZE", "1020")]).is_err());
        assert_eq!(config(&[("BASE_SIZE", "768")]).unwrap().base_size, 768);
    }
}
