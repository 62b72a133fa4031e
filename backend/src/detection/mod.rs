pub mod annotate;
pub mod config;
pub mod postprocess;
pub mod preprocess;
pub mod yolo;

use shared::Detection;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Model error: {0}")]
    Model(String),
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("Failed to write annotated image: {0}")]
    Annotate(String),
    #[error("Invalid detection parameters: {0}")]
    InvalidParams(String),
}

/// Input for one detection run.
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
}

impl DetectRequest {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !config::is_unit_threshold(self.conf_threshold) {
            return Err(DetectionError::InvalidParams(format!(
                "conf_threshold must be in (0, 1], got {}",
                self.conf_threshold
            )));
        }
        if !config::is_unit_threshold(self.iou_threshold) {
            return Err(DetectionError::InvalidParams(format!(
                "iou_threshold must be in (0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.image_size == 0 {
            return Err(DetectionError::InvalidParams(
                "image_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub detections: Vec<Detection>,
    pub avg_confidence: f32,
}

impl DetectionOutcome {
    pub fn new(detections: Vec<Detection>) -> Self {
        let avg_confidence = average_confidence(&detections);
        Self {
            detections,
            avg_confidence,
        }
    }
}

/// Runs object detection over an image on disk and writes an annotated copy
/// to `request.output_path`. Implementations are shared across request
/// workers, so they must be usable through `&self` from many threads.
pub trait Detector: Send + Sync {
    fn detect(&self, request: &DetectRequest) -> Result<DetectionOutcome, DetectionError>;
}

/// Mean of the detection confidences, 0.0 for an empty list.
pub fn average_confidence(detections: &[Detection]) -> f32 {
    if detections.is_empty() {
        return 0.0;
    }
    let sum: f64 = detections.iter().map(|d| d.confidence as f64).sum();
    (sum / detections.len() as f64) as f32
}
