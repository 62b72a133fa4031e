use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One object reported by the detector. `xyxy` is `[xmin, ymin, xmax, ymax]`
/// in pixel coordinates of the uploaded image.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Detection {
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f32,
    pub xyxy: [f32; 4],
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub fullname: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadResponse {
    pub id: i64,
    pub detections: Vec<Detection>,
    pub output_image_endpoint: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HistoryEntry {
    pub id: i64,
    pub filename: String,
    pub output_path: String,
    pub avg_confidence: Option<f32>,
    pub uploaded_at: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_uses_xyxy_array_on_the_wire() {
        let detection = Detection {
            class_id: 16,
            class_name: "dog".into(),
            confidence: 0.5,
            xyxy: [1.0, 2.0, 3.0, 4.0],
        };
        let value = serde_json::to_value(&detection).unwrap();
        assert_eq!(value["class_name"], "dog");
        assert_eq!(value["xyxy"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn history_entry_timestamp_is_iso8601() {
        let entry = HistoryEntry {
            id: 1,
            filename: "cat.jpg".into(),
            output_path: "out/cat_annotated.jpg".into(),
            avg_confidence: None,
            uploaded_at: DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            detections: vec![],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["uploaded_at"], "2025-01-02T03:04:05Z");
        assert!(value["avg_confidence"].is_null());
    }
}
