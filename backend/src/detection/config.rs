use serde::{Deserialize, Serialize};
use std::path::Path;

pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Debug, thiserror::Error)]
pub enum DetectorConfigError {
    #[error("Failed to read detector config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse detector config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid detector config: {0}")]
    Invalid(String),
}

/// Settings for the object detector, optionally read from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,
    /// Longer side of the model input, rounded up to the stride.
    pub image_size: u32,
    pub iou_threshold: f32,
    pub default_confidence: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "yolo11s.onnx".to_string(),
            image_size: 1280,
            iou_threshold: 0.45,
            default_confidence: 0.5,
            max_detections: 300,
            intra_threads: 4,
            class_names: COCO_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DetectorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectorConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, DetectorConfigError> {
        let config: DetectorConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        if !is_unit_threshold(self.iou_threshold) {
            return Err(DetectorConfigError::Invalid(format!(
                "iou_threshold must be in (0, 1], got {}",
                self.iou_threshold
            )));
        }
        if !is_unit_threshold(self.default_confidence) {
            return Err(DetectorConfigError::Invalid(format!(
                "default_confidence must be in (0, 1], got {}",
                self.default_confidence
            )));
        }
        if self.image_size < 32 {
            return Err(DetectorConfigError::Invalid(format!(
                "image_size must be at least 32, got {}",
                self.image_size
            )));
        }
        if self.class_names.is_empty() {
            return Err(DetectorConfigError::Invalid(
                "class_names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

/// Thresholds accepted by the detector lie in (0, 1].
pub fn is_unit_threshold(value: f32) -> bool {
    value > 0.0 && value <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = DetectorConfig::from_yaml("model_path: models/custom.onnx\nimage_size: 640\n")
            .unwrap();
        assert_eq!(config.model_path, "models/custom.onnx");
        assert_eq!(config.image_size, 640);
        assert_eq!(config.iou_threshold, 0.45);
        assert_eq!(config.class_names.len(), 80);
    }

    #[test]
    fn custom_class_names_replace_coco() {
        let config =
            DetectorConfig::from_yaml("class_names:\n  - screw\n  - bolt\n").unwrap();
        assert_eq!(config.class_name(1), "bolt");
        assert_eq!(config.class_name(7), "7");
    }

    #[test]
    fn rejects_out_of_range_iou() {
        let err = DetectorConfig::from_yaml("iou_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, DetectorConfigError::Invalid(_)));
    }

    #[test]
    fn unit_threshold_excludes_zero() {
        assert!(!is_unit_threshold(0.0));
        assert!(is_unit_threshold(1.0));
        assert!(is_unit_threshold(0.25));
        assert!(!is_unit_threshold(1.01));
    }
}
