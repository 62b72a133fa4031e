use image::ImageReader;
use ndarray::{Array2, Ix3};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Value;
use shared::Detection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::annotate::write_annotated;
use super::config::DetectorConfig;
use super::postprocess::{decode, non_max_suppression, to_image_space};
use super::preprocess::preprocess;
use super::{DetectRequest, DetectionError, DetectionOutcome, Detector};

/// YOLO (v8/11 head layout) object detector backed by an ONNX Runtime session.
#[derive(Clone)]
pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    config: DetectorConfig,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("model_path", &self.config.model_path)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    pub fn load(config: DetectorConfig) -> Result<Self, DetectionError> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(DetectionError::Model(format!(
                "model not found: {}",
                model_path.display()
            )));
        }

        log::info!("Loading detection model from {}", model_path.display());
        let session = Session::builder()
            .map_err(model_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error)?
            .with_intra_threads(config.intra_threads)
            .map_err(model_error)?
            .commit_from_file(model_path)
            .map_err(model_error)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());
        log::info!("Detection model loaded, input tensor: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            config,
        })
    }

    /// Run the network and return the `[4 + classes, anchors]` head.
    fn infer(&self, input: ndarray::Array4<f32>) -> Result<Array2<f32>, DetectionError> {
        let input_value = Value::from_array(input).map_err(model_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Model("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(model_error)?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(model_error)?;
        let output = output
            .into_dimensionality::<Ix3>()
            .map_err(|e| DetectionError::Model(format!("unexpected output shape: {}", e)))?;
        Ok(output.index_axis(ndarray::Axis(0), 0).to_owned())
    }
}

impl Detector for YoloDetector {
    fn detect(&self, request: &DetectRequest) -> Result<DetectionOutcome, DetectionError> {
        request.validate()?;

        let image = ImageReader::open(&request.image_path)
            .map_err(|e| DetectionError::ImageDecode(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| DetectionError::ImageDecode(e.to_string()))?
            .decode()
            .map_err(|e| DetectionError::ImageDecode(e.to_string()))?;

        let (tensor, letterbox) = preprocess(&image, request.image_size);
        let head = self.infer(tensor)?;

        let candidates = decode(head.view(), request.conf_threshold);
        let kept = non_max_suppression(
            candidates,
            request.iou_threshold,
            self.config.max_detections,
        );
        let detections: Vec<Detection> = to_image_space(kept, &letterbox)
            .into_iter()
            .map(|c| Detection {
                class_id: c.class_id as i64,
                class_name: self.config.class_name(c.class_id),
                confidence: c.confidence,
                xyxy: c.xyxy,
            })
            .collect();
        log::debug!(
            "Detected {} objects in {}",
            detections.len(),
            request.image_path.display()
        );

        write_annotated(&image, &detections, &request.output_path)?;
        Ok(DetectionOutcome::new(detections))
    }
}

fn model_error(err: impl std::fmt::Display) -> DetectionError {
    DetectionError::Model(err.to_string())
}
