//! Response assembly: persist each face crop, then render the job's
//! detections as a single JSON array line.

use facefind_core::{CropError, CropWriter, Detection, MatchRow, Region};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array3;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("normalized face must have 1 or 3 channels, got {0}")]
    UnsupportedChannels(usize),
    #[error("normalized face of shape {0:?} does not fit an image buffer")]
    BadShape(Vec<usize>),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error("serializing response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("writing response: {0}")]
    Output(#[from] std::io::Error),
}

/// Wire form of one detection. Field order is the protocol's key order.
#[derive(Serialize)]
struct FaceRecord<'a> {
    confidence: f32,
    region: &'a Region,
    file_name: String,
    #[serde(rename = "match")]
    matches: &'a [MatchRow],
}

pub struct ResponseEncoder<W> {
    writer: W,
}

impl<W: CropWriter> ResponseEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Save every crop and build the response line.
    ///
    /// A detection whose crop cannot be saved is left out of the array, so
    /// every reported `file_name` exists on disk. Surviving detections keep
    /// the name derived from their original index.
    pub fn encode(&self, detections: &[Detection], cache_directory: &str) -> Result<String, EncodeError> {
        self.render(detections, cache_directory).map(|(line, _)| line)
    }

    /// Encode, then write the line to `out` and flush it.
    ///
    /// Returns the number of faces reported.
    pub fn emit<O: Write>(
        &self,
        out: &mut O,
        detections: &[Detection],
        cache_directory: &str,
    ) -> Result<usize, EncodeError> {
        let (line, faces) = self.render(detections, cache_directory)?;
        write_line(out, &line)?;
        Ok(faces)
    }

    fn render(&self, detections: &[Detection], cache_directory: &str) -> Result<(String, usize), EncodeError> {
        let mut records = Vec::with_capacity(detections.len());

        for (index, detection) in detections.iter().enumerate() {
            let file_name = crop_file_name(cache_directory, index);

            if let Err(e) = self.persist(detection, &file_name) {
                tracing::warn!(file_name = %file_name, error = %e, "dropping detection: crop not saved");
                continue;
            }

            records.push(FaceRecord {
                confidence: detection.confidence,
                region: &detection.region,
                file_name,
                matches: &detection.match_table,
            });
        }

        let line = serde_json::to_string(&records)?.replace('\n', " ");
        Ok((line, records.len()))
    }

    fn persist(&self, detection: &Detection, file_name: &str) -> Result<(), EncodeError> {
        let image = to_image(&detection.normalized_pixels)?;
        self.writer.write(&image, Path::new(file_name))?;
        Ok(())
    }
}

/// Write one protocol line and flush so the client sees it immediately.
pub fn write_line<O: Write>(out: &mut O, line: &str) -> std::io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}

/// `<cache_directory>/face-<index>.jpg`
pub fn crop_file_name(cache_directory: &str, index: usize) -> String {
    format!("{cache_directory}/face-{index}.jpg")
}

/// Rescale a [0, 1] H×W×C array to an 8-bit image.
pub fn to_image(pixels: &Array3<f32>) -> Result<DynamicImage, EncodeError> {
    let (h, w, c) = pixels.dim();
    let bytes: Vec<u8> = pixels
        .iter()
        .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let bad_shape = || EncodeError::BadShape(pixels.shape().to_vec());

    match c {
        1 => GrayImage::from_raw(w as u32, h as u32, bytes)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(bad_shape),
        3 => RgbImage::from_raw(w as u32, h as u32, bytes)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(bad_shape),
        other => Err(EncodeError::UnsupportedChannels(other)),
    }
}
