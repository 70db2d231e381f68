use facefind_core::crop::DEFAULT_JPEG_QUALITY;
use facefind_core::detector::DEFAULT_CONFIDENCE_THRESHOLD;
use facefind_core::finder::DEFAULT_DISTANCE_THRESHOLD;
use facefind_core::FindOptions;
use std::path::PathBuf;
use std::str::FromStr;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    /// Minimum detector score for a face to be reported.
    pub detection_threshold: f32,
    /// Maximum cosine distance for a gallery row to be reported.
    pub distance_threshold: f32,
    /// Treat "no face in the query image" as a recognition failure.
    pub enforce_detection: bool,
    /// JPEG quality for saved crops (1–100).
    pub jpeg_quality: u8,
}

impl Config {
    /// Load configuration from `FACEFIND_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: lookup("FACEFIND_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facefind_core::default_model_dir),
            detection_threshold: parse_var(&lookup, "FACEFIND_DETECTION_THRESHOLD")
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            distance_threshold: parse_var(&lookup, "FACEFIND_DISTANCE_THRESHOLD")
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            enforce_detection: lookup("FACEFIND_ENFORCE_DETECTION")
                .map(|v| v.trim() == "1")
                .unwrap_or(false),
            jpeg_quality: parse_var(&lookup, "FACEFIND_JPEG_QUALITY")
                .filter(|q: &u8| (1..=100).contains(q))
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }

    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            detection_threshold: self.detection_threshold,
            distance_threshold: self.distance_threshold,
            enforce_detection: self.enforce_detection,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.model_dir, facefind_core::default_model_dir());
        assert_eq!(cfg.detection_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(cfg.distance_threshold, DEFAULT_DISTANCE_THRESHOLD);
        assert!(!cfg.enforce_detection);
        assert_eq!(cfg.jpeg_quality, DEFAULT_JPEG_QUALITY);
        assert_eq!(cfg.find_options(), FindOptions::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("FACEFIND_MODEL_DIR", "/opt/models"),
            ("FACEFIND_DETECTION_THRESHOLD", "0.7"),
            ("FACEFIND_DISTANCE_THRESHOLD", " 0.4 "),
            ("FACEFIND_ENFORCE_DETECTION", "1"),
            ("FACEFIND_JPEG_QUALITY", "80"),
        ]);
        assert_eq!(cfg.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(cfg.detection_threshold, 0.7);
        assert_eq!(cfg.distance_threshold, 0.4);
        assert!(cfg.enforce_detection);
        assert_eq!(cfg.jpeg_quality, 80);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = config(&[
            ("FACEFIND_DETECTION_THRESHOLD", "high"),
            ("FACEFIND_ENFORCE_DETECTION", "yes"),
            ("FACEFIND_JPEG_QUALITY", "0"),
        ]);
        assert_eq!(cfg.detection_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(!cfg.enforce_detection);
        assert_eq!(cfg.jpeg_quality, DEFAULT_JPEG_QUALITY);
    }
}
