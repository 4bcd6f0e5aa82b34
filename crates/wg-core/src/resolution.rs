//! Resolution planning: bounds validation, aspect-matched base resolution
//! and the discrete upscale factor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 8192;
pub const ALIGNMENT: u32 = 8;
pub const DEFAULT_BASE_SIZE: u32 = 1024;

/// Pixel dimensions. Serialized as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn validate(&self) -> Result<(), ResolutionError> {
        validate_resolution(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| ResolutionError::Malformed(s.to_string()))?;
        let width = w.trim().parse().map_err(|_| ResolutionError::Malformed(s.to_string()))?;
        let height = h.trim().parse().map_err(|_| ResolutionError::Malformed(s.to_string()))?;
        Ok(Self { width, height })
    }
}

impl From<[u32; 2]> for Resolution {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for [u32; 2] {
    fn from(r: Resolution) -> Self {
        [r.width, r.height]
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Minimum resolution is 64x64")]
    TooSmall,

    #[error("Maximum resolution is 8192x8192")]
    TooLarge,

    #[error("Resolution must be divisible by 8")]
    Misaligned,

    #[error("Malformed resolution '{0}', expected WIDTHxHEIGHT")]
    Malformed(String),
}

/// Checks a target resolution against the supported bounds.
///
/// Bounds are checked before alignment, so `(63, 1080)` reports the minimum
/// rather than the divisibility rule.
pub fn validate_resolution(width: u32, height: u32) -> Result<(), ResolutionError> {
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(ResolutionError::TooSmall);
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ResolutionError::TooLarge);
    }
    if width % ALIGNMENT != 0 || height % ALIGNMENT != 0 {
        return Err(ResolutionError::Misaligned);
    }
    Ok(())
}

/// `(valid, error_message)` form of [`validate_resolution`]; the message is
/// empty when valid.
pub fn check_resolution(width: u32, height: u32) -> (bool, String) {
    match validate_resolution(width, height) {
        Ok(()) => (true, String::new()),
        Err(e) => (false, e.to_string()),
    }
}

/// Base generation resolution for a target: same aspect ratio, longer side
/// equal to `base_size`, both sides floored to a multiple of 8 and at least 64.
///
/// Keeps the diffusion stage at a fixed cost regardless of the final size.
pub fn calculate_base_resolution(target: Resolution, base_size: u32) -> Resolution {
    let aspect = target.aspect_ratio();
    let (width, height) = if aspect >= 1.0 {
        (base_size, (base_size as f64 / aspect).round() as u32)
    } else {
        ((base_size as f64 * aspect).round() as u32, base_size)
    };
    Resolution::new(quantize(width), quantize(height))
}

fn quantize(dimension: u32) -> u32 {
    ((dimension / ALIGNMENT) * ALIGNMENT).max(MIN_DIMENSION)
}

/// Smallest supported upscaler factor (2 or 4) that covers the target.
pub fn calculate_upscale_factor(base: Resolution, target: Resolution) -> u32 {
    let factor_w = target.width as f64 / base.width as f64;
    let factor_h = target.height as f64 / base.height as f64;
    if factor_w.max(factor_h) <= 2.0 { 2 } else { 4 }
}
