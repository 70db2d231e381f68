use ndarray::Array3;
use serde::Serialize;

/// Raw detector output in source-image coordinates, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer face rectangle as reported to clients.
///
/// Serializes to `{"x":..,"y":..,"w":..,"h":..}`; eye points are only
/// present when the detector produced landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_eye: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_eye: Option<(u32, u32)>,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            left_eye: None,
            right_eye: None,
        }
    }

    /// Region covering a whole `width` × `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Round a detector box to pixels, clamped to the image bounds.
    pub fn from_box(bbox: &BoundingBox, width: u32, height: u32) -> Self {
        let clamp_x = |v: f32| v.round().clamp(0.0, width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, height as f32) as u32;

        let x1 = clamp_x(bbox.x);
        let y1 = clamp_y(bbox.y);
        let x2 = clamp_x(bbox.x + bbox.width);
        let y2 = clamp_y(bbox.y + bbox.height);

        let point = |(px, py): (f32, f32)| (clamp_x(px), clamp_y(py));

        Self {
            x: x1,
            y: y1,
            w: x2.saturating_sub(x1),
            h: y2.saturating_sub(y1),
            left_eye: bbox.landmarks.map(|lm| point(lm[0])),
            right_eye: bbox.landmarks.map(|lm| point(lm[1])),
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// One candidate identity from the gallery, as a match-table row.
///
/// Field order is the column order of the serialized record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRow {
    /// Path of the gallery image this row refers to.
    pub identity: String,
    pub target_x: u32,
    pub target_y: u32,
    pub target_w: u32,
    pub target_h: u32,
    pub source_x: u32,
    pub source_y: u32,
    pub source_w: u32,
    pub source_h: u32,
    pub threshold: f32,
    pub distance: f32,
}

/// One face found in a query image.
#[derive(Debug, Clone)]
pub struct Detection {
    pub confidence: f32,
    pub region: Region,
    /// Aligned face crop, height × width × channels, values in [0, 1].
    pub normalized_pixels: Array3<f32>,
    /// Gallery candidates, ascending by distance.
    pub match_table: Vec<MatchRow>,
}
