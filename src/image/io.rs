//! I/O helpers for stills, grayscale images and JSON.
//!
//! - `decode_still`: decode an encoded capture (JPEG/PNG) into RGB.
//! - `load_rgb_image` / `load_grayscale_image`: read a file from disk.
//! - `save_rgb_image`: write an RGB buffer, format chosen by extension.
//! - `read_json_file` / `write_json_file`: JSON values on disk.
use super::u8::GrayImageU8;
use crate::error::{CaptureError, Result};
use image::RgbImage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Decode an encoded still held in memory.
pub fn decode_still(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes).map_err(CaptureError::Decode)?;
    Ok(img.into_rgb8())
}

/// Load an image from disk as 8-bit RGB.
pub fn load_rgb_image(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).map_err(|source| CaptureError::ImageOpen {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.into_rgb8())
}

/// Load an image from disk and convert to 8-bit grayscale.
pub fn load_grayscale_image(path: &Path) -> Result<GrayImageU8> {
    let rgb = load_rgb_image(path)?;
    Ok(GrayImageU8::from_rgb(&rgb))
}

/// Save an RGB image; the format follows the file extension.
pub fn save_rgb_image(image: &RgbImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    image.save(path).map_err(|source| CaptureError::ImageSave {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(CaptureError::Encode)?;
    Ok(out.into_inner())
}

/// Read and deserialize a JSON file.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| CaptureError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| CaptureError::JsonRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value).map_err(|source| CaptureError::JsonWrite {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| CaptureError::io(path, e))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CaptureError::io(parent, e))?;
        }
    }
    Ok(())
}
