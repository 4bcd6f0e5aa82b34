//! On-disk artifact store: generated PNGs with JSON sidecars in one flat
//! output directory.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, Utc};
use image::RgbImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::archive::batch_export_zip;
use crate::error::StoreError;
use crate::resolution::Resolution;

pub const DEFAULT_PER_PAGE: usize = 9;
pub const MAX_PER_PAGE: usize = 50;

const IMAGE_EXTENSION: &str = "png";
const SIDECAR_EXTENSION: &str = "json";
const MAX_PROMPT_CHARS: usize = 50;

/// Sidecar record written next to every saved wallpaper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub seed: i64,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub base_resolution: Resolution,
    pub target_resolution: Resolution,
    pub enable_upscaling: bool,
    pub upscale_model: String,
    pub timestamp: DateTime<Utc>,
}

/// Where finished images go. The orchestrator only needs this one call.
pub trait ArtifactStore: Send {
    fn persist(
        &self,
        image: &RgbImage,
        metadata: &GenerationMetadata,
    ) -> Result<PathBuf, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub filename: String,
    pub path: PathBuf,
    pub metadata: Option<GenerationMetadata>,
    /// Sidecar timestamp, or the file mtime when there is no sidecar
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn target_resolution(&self) -> Option<Resolution> {
        self.metadata.as_ref().map(|m| m.target_resolution)
    }

    fn matches_search(&self, needle: &str) -> bool {
        self.filename.to_lowercase().contains(needle)
            || self
                .metadata
                .as_ref()
                .is_some_and(|m| m.prompt.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone)]
pub struct Gallery {
    root: PathBuf,
}

impl Gallery {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Fresh output path for a prompt and target, stamped with local time.
    pub fn output_path(&self, prompt: &str, target: Resolution) -> PathBuf {
        self.root.join(output_file_name(prompt, target, Local::now()))
    }

    pub fn save_metadata(
        &self,
        image_path: &Path,
        metadata: &GenerationMetadata,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(sidecar_path(image_path), json)?;
        Ok(())
    }

    pub fn load_metadata(&self, image_path: &Path) -> Result<Option<GenerationMetadata>, StoreError> {
        let path = sidecar_path(image_path);
        if !path.is_file() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// All PNGs in the output directory, newest first.
    pub fn list_outputs(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut outputs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
                continue;
            }
            let Some(modified) = modified_time(&path)? else {
                continue;
            };
            outputs.push((modified, path));
        }
        outputs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(outputs.into_iter().map(|(_, path)| path).collect())
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut history = Vec::new();
        for path in self.list_outputs()? {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            let metadata = match self.load_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Ignoring unreadable sidecar for {}: {}", filename, e);
                    None
                }
            };
            let timestamp = match &metadata {
                Some(m) => m.timestamp,
                None => match modified_time(&path)? {
                    Some(modified) => DateTime::<Utc>::from(modified),
                    None => continue,
                },
            };
            history.push(HistoryEntry { filename, path, metadata, timestamp });
        }
        Ok(history)
    }

    /// Maps a bare file name to its path inside the output directory.
    /// Anything that could escape the directory is rejected.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let bare = Path::new(filename).file_name().and_then(|n| n.to_str());
        if filename.is_empty() || bare != Some(filename) {
            return Err(StoreError::InvalidName(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }

    /// Removes an image and its sidecar.
    pub fn delete(&self, filename: &str) -> Result<(), StoreError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(filename.to_string()));
        }
        fs::remove_file(&path)?;
        let sidecar = sidecar_path(&path);
        if sidecar.is_file() {
            fs::remove_file(sidecar)?;
        }
        info!("Deleted {}", filename);
        Ok(())
    }

    /// Distinct target resolutions across the history, sorted.
    pub fn resolutions(&self) -> Result<Vec<String>, StoreError> {
        let resolutions: BTreeSet<String> = self
            .history()?
            .iter()
            .filter_map(HistoryEntry::target_resolution)
            .map(|r| r.to_string())
            .collect();
        Ok(resolutions.into_iter().collect())
    }

    /// ZIP of the named images that exist. Invalid names are skipped.
    pub fn export_zip<S: AsRef<str>>(&self, filenames: &[S]) -> Result<Vec<u8>, StoreError> {
        let paths: Vec<PathBuf> = filenames
            .iter()
            .filter_map(|name| self.resolve(name.as_ref()).ok())
            .collect();
        batch_export_zip(&paths)
    }
}

impl ArtifactStore for Gallery {
    fn persist(
        &self,
        image: &RgbImage,
        metadata: &GenerationMetadata,
    ) -> Result<PathBuf, StoreError> {
        let path = self.output_path(&metadata.prompt, metadata.target_resolution);
        image.save(&path)?;
        self.save_metadata(&path, metadata)?;
        Ok(path)
    }
}

/// `None` when the file vanished after being listed, e.g. by a concurrent
/// delete.
fn modified_time(path: &Path) -> Result<Option<SystemTime>, StoreError> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => Ok(Some(modified)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Skipping {}: {}", path.display(), e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(SIDECAR_EXTENSION)
}

/// Keeps alphanumerics, space, `-` and `_`, trims, turns spaces into `_` and
/// caps the result at 50 characters.
pub fn sanitize_prompt(prompt: &str) -> String {
    let kept: String = prompt
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim().replace(' ', "_").chars().take(MAX_PROMPT_CHARS).collect()
}

/// `{YYYYmmdd_HHMMSS}_{prompt}_{w}x{h}.png`
pub fn output_file_name(prompt: &str, target: Resolution, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        sanitize_prompt(prompt),
        target,
        IMAGE_EXTENSION
    )
}

/// Case-insensitive substring match on prompt or filename, then an exact
/// `"{w}x{h}"` match on the target resolution. Empty filters match all.
pub fn filter_history(history: Vec<HistoryEntry>, search: &str, resolution: &str) -> Vec<HistoryEntry> {
    let needle = search.to_lowercase();
    history
        .into_iter()
        .filter(|e| needle.is_empty() || e.matches_search(&needle))
        .filter(|e| {
            resolution.is_empty()
                || e.target_resolution().is_some_and(|r| r.to_string() == resolution)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// One-based pagination. `page` is floored at 1 and `per_page` clamped to
/// `1..=50`; a page past the end is empty.
pub fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Page<T> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();
    Page { items, total, page, per_page, total_pages }
}
