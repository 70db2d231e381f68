//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional embeddings from aligned 112×112 RGB crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::ALIGNED_SIZE;
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // NOT 128.0 — ArcFace uses symmetric normalization
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("aligned face must be {expected}x{expected}, got {width}x{height}")]
    BadCropSize { expected: u32, width: u32, height: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an L2-normalized embedding from an aligned face crop.
    pub fn extract(&mut self, aligned: &RgbImage) -> Result<Embedding, RecognizerError> {
        if aligned.dimensions() != (ALIGNED_SIZE, ALIGNED_SIZE) {
            return Err(RecognizerError::BadCropSize {
                expected: ALIGNED_SIZE,
                width: aligned.width(),
                height: aligned.height(),
            });
        }

        let input = preprocess(aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
        })
    }
}

/// Convert an RGB crop into a normalized NCHW float tensor.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let (w, h) = (aligned.width() as usize, aligned.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));

    for (x, y, pixel) in aligned.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }

    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
