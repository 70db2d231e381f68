//! facefind-core — Face detection, recognition and gallery matching.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime. The [`FaceFinder`] and [`CropWriter`] traits are
//! the seams the line-protocol service is written against.

pub mod alignment;
pub mod crop;
pub mod detector;
pub mod finder;
pub mod gallery;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use crop::{CropError, CropWriter, JpegCropWriter};
pub use detector::FaceDetector;
pub use finder::{
    Detect, Embed, EmbeddingFaceFinder, FaceFinder, FindError, FindOptions, OnnxFaceFinder,
};
pub use gallery::{GalleryEntry, GalleryIndex};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Detection, Embedding, MatchRow, Region};

/// Default ONNX model directory: `$XDG_DATA_HOME/facefind/models`, falling
/// back to `$HOME/.local/share/facefind/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facefind")
        .join("models")
}
