use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, ImageReader, ImageResult, RgbImage};
use serde::Serialize;

use crate::resolution::Resolution;

pub const THUMBNAIL_SIZE: u32 = 512;

/// Exact-size Lanczos3 resample. A no-op copy when the size already matches.
pub fn resize_exact(image: &RgbImage, target: Resolution) -> RgbImage {
    if image.dimensions() == (target.width, target.height) {
        return image.clone();
    }
    imageops::resize(image, target.width, target.height, FilterType::Lanczos3)
}

/// Shrinks to fit inside `max_size` x `max_size`, keeping the aspect ratio.
/// Never enlarges.
pub fn thumbnail(image: &RgbImage, max_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= max_size && height <= max_size {
        return image.clone();
    }
    let ratio = (max_size as f64 / width as f64).min(max_size as f64 / height as f64);
    let fitted = Resolution::new(
        ((width as f64 * ratio).round() as u32).clamp(1, max_size),
        ((height as f64 * ratio).round() as u32).clamp(1, max_size),
    );
    resize_exact(image, fitted)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub file_size_kb: f64,
}

/// Reads dimensions from the header only, without decoding pixels.
pub fn image_info(path: &Path) -> ImageResult<ImageInfo> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().map(|f| format!("{f:?}").to_uppercase());
    let (width, height) = reader.into_dimensions()?;
    let file_size_kb = fs::metadata(path)?.len() as f64 / 1024.0;
    Ok(ImageInfo { width, height, format, file_size_kb })
}

pub fn encode_png(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decodes any supported format and converts to 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> ImageResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resize_exact() {
        let image = RgbImage::from_pixel(1024, 576, Rgb([10, 20, 30]));
        let resized = resize_exact(&image, Resolution::new(1600, 904));
        assert_eq!(resized.dimensions(), (1600, 904));
    }

    #[test]
    fn test_thumbnail_fits_and_keeps_aspect() {
        let wide = RgbImage::new(3840, 2160);
        assert_eq!(thumbnail(&wide, THUMBNAIL_SIZE).dimensions(), (512, 288));

        let tall = RgbImage::new(1080, 1920);
        assert_eq!(thumbnail(&tall, THUMBNAIL_SIZE).dimensions(), (288, 512));
    }

    #[test]
    fn test_thumbnail_never_enlarges() {
        let small = RgbImage::new(100, 50);
        assert_eq!(thumbnail(&small, THUMBNAIL_SIZE).dimensions(), (100, 50));
    }

    #[test]
    fn test_png_round_trip_and_info() {
        let image = RgbImage::from_pixel(64, 32, Rgb([200, 100, 50]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(decode_rgb(&bytes).unwrap(), image);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.png");
        fs::write(&path, &bytes).unwrap();
        let info = image_info(&path).unwrap();
        assert_eq!((info.width, info.height), (64, 32));
        assert_eq!(info.format.as_deref(), Some("PNG"));
        assert!(info.file_size_kb > 0.0);
    }
}
