//! Recognition capability: find the faces of a query image in a gallery.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::gallery::{GalleryError, GalleryIndex};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Detection, Embedding, Region};
use image::{imageops, RgbImage};
use ndarray::Array3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Cosine distance cut-off for ArcFace matches.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.68;

#[derive(Error, Debug)]
pub enum FindError {
    #[error("cannot read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face detected in {0}")]
    NoFaceDetected(PathBuf),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
}

/// Per-call model configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub detection_threshold: f32,
    pub distance_threshold: f32,
    /// When false, an image without a detectable face is treated as one
    /// face covering the whole image.
    pub enforce_detection: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            enforce_detection: false,
        }
    }
}

/// Anything that can locate faces in a query image and match them
/// against a gallery directory.
pub trait FaceFinder {
    /// Detections in the order the engine reports them.
    fn find(
        &mut self,
        query: &Path,
        gallery: &Path,
        options: &FindOptions,
    ) -> Result<Vec<Detection>, FindError>;
}

/// Face localisation stage of [`EmbeddingFaceFinder`].
pub trait Detect {
    /// Faces in `image` scoring at least `threshold`, highest confidence first.
    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Embedding stage of [`EmbeddingFaceFinder`]. Takes an aligned 112×112 crop.
pub trait Embed {
    fn extract(&mut self, crop: &RgbImage) -> Result<Embedding, RecognizerError>;
}

impl Detect for FaceDetector {
    fn detect(&mut self, image: &RgbImage, threshold: f32) -> Result<Vec<BoundingBox>, DetectorError> {
        FaceDetector::detect(self, image, threshold)
    }
}

impl Embed for FaceRecognizer {
    fn extract(&mut self, crop: &RgbImage) -> Result<Embedding, RecognizerError> {
        FaceRecognizer::extract(self, crop)
    }
}

/// A detected, aligned and embedded face.
struct FaceSample {
    confidence: f32,
    region: Region,
    crop: RgbImage,
    embedding: Embedding,
}

/// Detect-align-embed engine with a per-directory gallery cache.
pub struct EmbeddingFaceFinder<D, R> {
    detector: D,
    recognizer: R,
    galleries: HashMap<PathBuf, GalleryIndex>,
}

/// SCRFD + ArcFace over ONNX Runtime.
pub type OnnxFaceFinder = EmbeddingFaceFinder<FaceDetector, FaceRecognizer>;

impl OnnxFaceFinder {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, FindError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;

        Ok(Self::new(detector, recognizer))
    }
}

impl<D: Detect, R: Embed> EmbeddingFaceFinder<D, R> {
    pub fn new(detector: D, recognizer: R) -> Self {
        Self {
            detector,
            recognizer,
            galleries: HashMap::new(),
        }
    }

    /// Index `dir` on first use; later calls reuse the cached index.
    fn ensure_gallery(&mut self, dir: &Path, options: &FindOptions) -> Result<PathBuf, FindError> {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if self.galleries.contains_key(&key) {
            return Ok(key);
        }

        let reference_options = FindOptions {
            enforce_detection: false,
            ..options.clone()
        };
        let (detector, recognizer) = (&mut self.detector, &mut self.recognizer);

        let index = GalleryIndex::build(dir, |path| {
            let image = open_rgb(path)?;
            let faces = embed_faces(detector, recognizer, &image, path, &reference_options)?;
            Ok::<_, FindError>(faces.into_iter().next().map(|f| (f.region, f.embedding)))
        })?;

        self.galleries.insert(key.clone(), index);
        Ok(key)
    }
}

impl<D: Detect, R: Embed> FaceFinder for EmbeddingFaceFinder<D, R> {
    fn find(
        &mut self,
        query: &Path,
        gallery: &Path,
        options: &FindOptions,
    ) -> Result<Vec<Detection>, FindError> {
        let key = self.ensure_gallery(gallery, options)?;

        let image = open_rgb(query)?;
        let faces = embed_faces(
            &mut self.detector,
            &mut self.recognizer,
            &image,
            query,
            options,
        )?;

        let index = &self.galleries[&key];
        let detections: Vec<Detection> = faces
            .into_iter()
            .map(|face| Detection {
                confidence: face.confidence,
                match_table: index.rank(&face.embedding, &face.region, options.distance_threshold),
                normalized_pixels: normalize_crop(&face.crop),
                region: face.region,
            })
            .collect();

        tracing::debug!(
            query = %query.display(),
            faces = detections.len(),
            gallery_size = index.len(),
            "find complete"
        );

        Ok(detections)
    }
}

fn open_rgb(path: &Path) -> Result<RgbImage, FindError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| FindError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Detect, align and embed every face in `image`, highest confidence first.
fn embed_faces<D: Detect, R: Embed>(
    detector: &mut D,
    recognizer: &mut R,
    image: &RgbImage,
    path: &Path,
    options: &FindOptions,
) -> Result<Vec<FaceSample>, FindError> {
    let boxes = detector.detect(image, options.detection_threshold)?;

    if boxes.is_empty() {
        if options.enforce_detection {
            return Err(FindError::NoFaceDetected(path.to_path_buf()));
        }
        tracing::debug!(path = %path.display(), "no face detected; using the whole image");
        let crop = alignment::resize_face(image);
        let embedding = recognizer.extract(&crop)?;
        return Ok(vec![FaceSample {
            confidence: 0.0,
            region: Region::full(image.width(), image.height()),
            crop,
            embedding,
        }]);
    }

    let mut faces = Vec::with_capacity(boxes.len());
    for bbox in &boxes {
        let region = Region::from_box(bbox, image.width(), image.height());
        let crop = match &bbox.landmarks {
            Some(landmarks) => alignment::align_face(image, landmarks),
            None => alignment::resize_face(
                &imageops::crop_imm(image, region.x, region.y, region.w.max(1), region.h.max(1))
                    .to_image(),
            ),
        };
        let embedding = recognizer.extract(&crop)?;
        faces.push(FaceSample {
            confidence: bbox.confidence,
            region,
            crop,
            embedding,
        });
    }
    Ok(faces)
}

/// Scale an 8-bit crop into an H×W×3 array with values in [0, 1].
pub fn normalize_crop(crop: &RgbImage) -> Array3<f32> {
    let (w, h) = crop.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        crop.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_default_options_do_not_enforce_detection() {
        let options = FindOptions::default();
        assert!(!options.enforce_detection);
        assert_eq!(options.detection_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(options.distance_threshold, DEFAULT_DISTANCE_THRESHOLD);
    }

    #[test]
    fn test_normalize_crop_layout_and_range() {
        let mut crop = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        crop.put_pixel(2, 1, Rgb([255, 51, 0]));

        let arr = normalize_crop(&crop);
        assert_eq!(arr.shape(), &[2, 3, 3]);
        assert_eq!(arr[[1, 2, 0]], 1.0);
        assert!((arr[[1, 2, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(arr[[0, 0, 0]], 0.0);
    }

    #[test]
    fn test_load_reports_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxFaceFinder::load(dir.path()).err().unwrap();
        assert!(matches!(
            err,
            FindError::Detector(DetectorError::ModelNotFound(ref p)) if p.ends_with(DETECTOR_MODEL_FILE)
        ));
    }

    #[test]
    fn test_open_rgb_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jpg");
        let err = open_rgb(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.jpg"));
    }

    /// Reports the same boxes for every image.
    struct FixedDetector {
        boxes: Vec<BoundingBox>,
    }

    impl Detect for FixedDetector {
        fn detect(&mut self, _image: &RgbImage, threshold: f32) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.boxes.iter().filter(|b| b.confidence >= threshold).cloned().collect())
        }
    }

    /// Returns one fixed embedding and counts how often it was asked.
    #[derive(Default)]
    struct CountingRecognizer {
        calls: usize,
    }

    impl Embed for CountingRecognizer {
        fn extract(&mut self, crop: &RgbImage) -> Result<Embedding, RecognizerError> {
            assert_eq!(crop.dimensions(), (alignment::ALIGNED_SIZE, alignment::ALIGNED_SIZE));
            self.calls += 1;
            Ok(Embedding { values: vec![1.0, 0.0] })
        }
    }

    fn finder(boxes: Vec<BoundingBox>) -> EmbeddingFaceFinder<FixedDetector, CountingRecognizer> {
        EmbeddingFaceFinder::new(FixedDetector { boxes }, CountingRecognizer::default())
    }

    /// A gallery of two images plus a 40×30 query image.
    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let gallery = dir.path().join("gallery");
        std::fs::create_dir(&gallery).unwrap();
        for name in ["alice.png", "bob.png"] {
            RgbImage::from_pixel(20, 20, Rgb([90, 90, 90])).save(gallery.join(name)).unwrap();
        }
        let query = dir.path().join("query.png");
        RgbImage::from_pixel(40, 30, Rgb([200, 10, 10])).save(&query).unwrap();
        (dir, gallery, query)
    }

    #[test]
    fn test_no_face_falls_back_to_whole_image() {
        let (_dir, gallery, query) = fixture();
        let mut finder = finder(Vec::new());

        let detections = finder.find(&query, &gallery, &FindOptions::default()).unwrap();

        assert_eq!(detections.len(), 1);
        let face = &detections[0];
        assert_eq!(face.confidence, 0.0);
        assert_eq!(face.region, Region::full(40, 30));
        assert_eq!(face.normalized_pixels.shape(), &[112, 112, 3]);
        assert_eq!(face.match_table.len(), 2);
        assert!(face.match_table[0].identity.ends_with("alice.png"));
    }

    #[test]
    fn test_no_face_with_enforcement_is_an_error() {
        let (_dir, gallery, query) = fixture();
        let mut finder = finder(Vec::new());
        let options = FindOptions {
            enforce_detection: true,
            ..FindOptions::default()
        };

        let err = finder.find(&query, &gallery, &options).unwrap_err();
        assert!(matches!(err, FindError::NoFaceDetected(ref p) if p == &query));
    }

    #[test]
    fn test_detected_face_uses_box_region() {
        let (_dir, gallery, query) = fixture();
        let mut finder = finder(vec![BoundingBox {
            x: 4.0,
            y: 5.0,
            width: 10.0,
            height: 12.0,
            confidence: 0.9,
            landmarks: None,
        }]);

        let detections = finder.find(&query, &gallery, &FindOptions::default()).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].region, Region::new(4, 5, 10, 12));
        assert_eq!(detections[0].match_table[0].source_w, 10);
    }

    #[test]
    fn test_gallery_is_indexed_once() {
        let (_dir, gallery, query) = fixture();
        let mut finder = finder(Vec::new());
        let options = FindOptions::default();

        finder.find(&query, &gallery, &options).unwrap();
        assert_eq!(finder.recognizer.calls, 3);

        finder.find(&query, &gallery, &options).unwrap();
        assert_eq!(finder.recognizer.calls, 4);
        assert_eq!(finder.galleries.len(), 1);
    }
}
