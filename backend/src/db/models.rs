use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Detection, HistoryEntry};

use super::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub id: i64,
    pub filename: String,
    pub output_path: String,
    pub detections: Vec<Detection>,
    pub avg_confidence: Option<f32>,
    pub user_id: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedImage {
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            filename: self.filename.clone(),
            output_path: self.output_path.clone(),
            avg_confidence: self.avg_confidence,
            uploaded_at: self.uploaded_at,
            detections: self.detections.clone(),
        }
    }
}

/// Raw `uploaded_images` row before the detections column is decoded.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UploadedImageRow {
    pub id: i64,
    pub filename: String,
    pub output_path: String,
    pub detections_json: String,
    pub avg_confidence: Option<f32>,
    pub user_id: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl TryFrom<UploadedImageRow> for UploadedImage {
    type Error = RepositoryError;

    fn try_from(row: UploadedImageRow) -> Result<Self, Self::Error> {
        let detections = StoredDetections::decode(&row.detections_json)?;
        Ok(Self {
            id: row.id,
            filename: row.filename,
            output_path: row.output_path,
            detections,
            avg_confidence: row.avg_confidence,
            user_id: row.user_id,
            uploaded_at: row.uploaded_at,
        })
    }
}

/// Versioned envelope stored in the `detections_json` column.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredDetections {
    pub version: u32,
    pub detections: Vec<Detection>,
}

impl StoredDetections {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn encode(detections: &[Detection]) -> Result<String, RepositoryError> {
        let envelope = StoredDetections {
            version: Self::CURRENT_VERSION,
            detections: detections.to_vec(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn decode(raw: &str) -> Result<Vec<Detection>, RepositoryError> {
        let envelope: StoredDetections = serde_json::from_str(raw)?;
        if envelope.version != Self::CURRENT_VERSION {
            return Err(RepositoryError::InvalidData(format!(
                "unsupported detections version {}",
                envelope.version
            )));
        }
        Ok(envelope.detections)
    }
}
