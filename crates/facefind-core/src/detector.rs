//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model on RGB images: 3-stride anchor-free decoding followed by
//! NMS.

use crate::types::BoundingBox;
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied by the letterbox resize, used to map
/// detections back to source pixels.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Detect faces in an RGB image, highest confidence first.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        threshold: f32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };

            let scores = extract(score_idx, "scores")?;
            let bboxes = extract(bbox_idx, "bboxes")?;
            let kps = extract(kps_idx, "kps")?;

            all_detections.extend(decode_stride(
                StrideOutputs { scores, bboxes, kps },
                stride,
                &letterbox,
                threshold,
            ));
        }

        // nms() returns its survivors in descending confidence order.
        Ok(nms(all_detections, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB image into the square SCRFD input as a normalized NCHW tensor.
fn preprocess(image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = (image.width().max(1) as f32, image.height().max(1) as f32);
    let size = SCRFD_INPUT_SIZE;

    let scale = (size as f32 / width).min(size as f32 / height);
    let new_w = ((width * scale).round() as usize).clamp(1, size);
    let new_h = ((height * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    let resized = imageops::resize(
        image,
        new_w as u32,
        new_h as u32,
        imageops::FilterType::Triangle,
    );

    // Padding stays at 0.0, which is SCRFD_MEAN after normalization.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let (off_x, off_y) = (pad_x.floor() as usize, pad_y.floor() as usize);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Discover output tensor ordering by name.
///
/// Named exports ("score_8", "bbox_16", "kps_32", ...) are mapped by name.
/// Anything else falls back to the standard positional ordering:
///   [0-2] = scores, [3-5] = bboxes, [6-8] = kps (strides 8, 16, 32).
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw output slices for one stride level.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode detections for a single stride level.
fn decode_stride(
    out: StrideOutputs<'_>,
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = out.scores.get(idx).copied().unwrap_or(0.0);
        if score < threshold {
            continue;
        }

        let Some(offsets) = out.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (anchor_idx % grid_w) as f32 * s;
        let anchor_y = (anchor_idx / grid_w) as f32 * s;

        let (x1, y1) =
            letterbox.to_source(anchor_x - offsets[0] * s, anchor_y - offsets[1] * s);
        let (x2, y2) =
            letterbox.to_source(anchor_x + offsets[2] * s, anchor_y + offsets[3] * s);

        let landmarks: Option<[(f32, f32); 5]> = out.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.to_source(anchor_x + k[i * 2] * s, anchor_y + k[i * 2 + 1] * s)
            })
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression. Survivors come back sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 50, union 150.
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping_and_sorts() {
        let detections = vec![
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_preprocess_letterbox_wide_image() {
        let image = RgbImage::from_pixel(320, 160, Rgb([255, 255, 255]));
        let (tensor, letterbox) = preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE]);
        assert!((letterbox.scale - 2.0).abs() < 1e-6);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 160.0);

        // Top padding band is neutral, the image band is white.
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        let white = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 2, 320, 320]] - white).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 160.0 };
        let (x, y) = letterbox.to_source(200.0, 260.0);
        assert!((x - 100.0).abs() < 1e-6);
        assert!((y - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

        // Anchor cell (x=2, y=1), first anchor of the cell.
        let idx = (grid + 2) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[idx] = 0.95;
        let mut bboxes = vec![0.0f32; anchors * 4];
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);
        let kps = vec![0.0f32; anchors * 10];

        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(
            StrideOutputs { scores: &scores, bboxes: &bboxes, kps: &kps },
            stride,
            &letterbox,
            DEFAULT_CONFIDENCE_THRESHOLD,
        );

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x, d.y, d.width, d.height), (32.0, 0.0, 64.0, 64.0));
        assert_eq!(d.landmarks.map(|l| l[0]), Some((64.0, 32.0)));
    }

    #[test]
    fn test_decode_stride_respects_threshold() {
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let scores = vec![0.3f32; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let dets = decode_stride(
            StrideOutputs { scores: &scores, bboxes: &bboxes, kps: &[] },
            stride,
            &letterbox,
            0.5,
        );
        assert!(dets.is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }
}
