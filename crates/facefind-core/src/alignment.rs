//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace layout using the
//! five InsightFace reference landmarks and a least-squares fit.

use image::{imageops, Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Estimate the similarity transform (scale, rotation, translation) mapping
/// `src` onto `dst`.
///
/// Returns `[a, -b, tx, b, a, ty]`:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for the overdetermined system, one pair of rows per point:
    //   [sx, -sy, 1, 0] . [a, b, tx, ty] = dx
    //   [sy,  sx, 0, 1] . [a, b, tx, ty] = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: [[f32; 4]; 4], atb: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| {
                m[r1][col]
                    .abs()
                    .partial_cmp(&m[r2][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            // Degenerate landmarks: unit scale, no rotation.
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    x
}

/// Inverse-map every output pixel through `matrix` and sample the source
/// bilinearly. Out-of-bounds samples are black.
fn warp_affine(src: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;

    let (src_w, src_h) = (src.width() as i64, src.height() as i64);
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < src_w && y >= 0 && y < src_h {
            src.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut px = [0u8; 3];
        for (c, out) in px.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *out = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    })
}

/// Align a detected face to a canonical 112×112 RGB crop using its landmarks.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}

/// Squash an image (or region without landmarks) into the 112×112 input.
pub fn resize_face(image: &RgbImage) -> RgbImage {
    imageops::resize(image, ALIGNED_SIZE, ALIGNED_SIZE, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Landmarks at 2x the reference scale.
        let src: [(f32, f32); 5] = [
            (76.5892, 103.3926),
            (147.0636, 103.0028),
            (112.0504, 143.4732),
            (83.0986, 184.7310),
            (141.4598, 184.4082),
        ];
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 64, 32]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        // Interior pixels sample the uniform source.
        assert_eq!(aligned.get_pixel(56, 56), &Rgb([128, 64, 32]));
    }

    #[test]
    fn test_warp_keeps_channels_separate() {
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 0, 10]));
        let m = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let out = warp_affine(&image, &m, 112);
        assert_eq!(out.get_pixel(10, 10), &Rgb([255, 0, 10]));
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the left eye should land near the reference left eye.
        let mut image = RgbImage::new(200, 200);
        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for dy in 0..5 {
            for dx in 0..5 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src_landmarks);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }

    #[test]
    fn test_resize_face_output_size() {
        let image = RgbImage::new(37, 91);
        assert_eq!(resize_face(&image).dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }
}
