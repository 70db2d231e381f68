//! Image-encode capability: persist a face crop to disk.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("cannot create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Writes an 8-bit image to a file path.
pub trait CropWriter {
    /// Overwrites `path` if it already exists. Parent directories are not created.
    fn write(&self, image: &DynamicImage, path: &Path) -> Result<(), CropError>;
}

/// Baseline JPEG writer.
#[derive(Debug, Clone)]
pub struct JpegCropWriter {
    quality: u8,
}

impl JpegCropWriter {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCropWriter {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl CropWriter for JpegCropWriter {
    fn write(&self, image: &DynamicImage, path: &Path) -> Result<(), CropError> {
        let file = File::create(path).map_err(|source| CropError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let result = encode_jpeg(image, file, self.quality, path);
        if result.is_err() {
            // Never leave a truncated crop behind.
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial crop");
            }
        }
        result
    }
}

fn encode_jpeg(image: &DynamicImage, file: File, quality: u8, path: &Path) -> Result<(), CropError> {
    let mut out = BufWriter::new(file);

    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|source| CropError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    out.flush().map_err(|source| CropError::Io {
        path: path.to_path_buf(),
        source,
    })
}
