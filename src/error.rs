//! Error types for infrastructure failures (configuration, image and JSON I/O).
//!
//! Negative outcomes of the capture pipeline itself (no document, rejected
//! capture, failed gate) are ordinary values and never go through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for fallible I/O-facing operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse JSON {path}: {source}")]
    JsonRead {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize JSON for {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to open image {path}: {source}")]
    ImageOpen {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to save image {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid buffer: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}

impl CaptureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
