use std::fs::{self, File};
use std::path::PathBuf;
use std::time::Duration;

use log::info;
use reqwest::blocking::Client;
use uuid::Uuid;
use wg_core::{ExecutorError, UpscalerModel};

/// Pretrained upscaler weights, downloaded on first use and kept under the
/// model directory.
#[derive(Debug, Clone)]
pub struct WeightCache {
    dir: PathBuf,
    client: Client,
}

impl WeightCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ExecutorError::Backend(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { dir: dir.into(), client })
    }

    pub fn path_for(&self, model: UpscalerModel) -> PathBuf {
        self.dir.join(model.weights_file_name())
    }

    pub fn is_cached(&self, model: UpscalerModel) -> bool {
        self.path_for(model).is_file()
    }

    /// Path to the weights, fetching them first if they are not cached.
    ///
    /// Downloads go to a unique temporary file that is renamed into place,
    /// so a failed transfer never leaves a truncated weight file behind.
    pub fn ensure(&self, model: UpscalerModel) -> Result<PathBuf, ExecutorError> {
        let path = self.path_for(model);
        if path.is_file() {
            return Ok(path);
        }
        fs::create_dir_all(&self.dir)?;

        info!("Downloading {} weights from {}", model.name(), model.weights_url());
        let mut response = self
            .client
            .get(model.weights_url())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                ExecutorError::Backend(format!("Failed to download {} weights: {}", model.name(), e))
            })?;

        let partial = self
            .dir
            .join(format!(".{}.{}.part", model.weights_file_name(), Uuid::new_v4()));
        let written = File::create(&partial)
            .and_then(|mut file| response.copy_to(&mut file).map_err(std::io::Error::other));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        fs::rename(&partial, &path)?;
        info!("Cached {} at {}", model.name(), path.display());
        Ok(path)
    }
}
