use chrono::Utc;
use shared::Detection;
use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::{StoredDetections, UploadedImage, UploadedImageRow};

const UPLOAD_COLUMNS: &str =
    "id, filename, output_path, detections_json, avg_confidence, user_id, uploaded_at";

#[derive(Clone)]
pub struct UploadRepository {
    pool: SqlitePool,
}

impl UploadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        filename: &str,
        output_path: &str,
        detections: &[Detection],
        avg_confidence: Option<f32>,
        user_id: i64,
    ) -> Result<UploadedImage, RepositoryError> {
        let detections_json = StoredDetections::encode(detections)?;
        let sql = format!(
            r#"
            INSERT INTO uploaded_images
                (filename, output_path, detections_json, avg_confidence, user_id, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            UPLOAD_COLUMNS
        );
        let row = sqlx::query_as::<_, UploadedImageRow>(&sql)
            .bind(filename)
            .bind(output_path)
            .bind(detections_json)
            .bind(avg_confidence)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        log::info!("Recorded upload {} for user {}", row.id, user_id);
        row.try_into()
    }

    pub async fn get(&self, id: i64) -> Result<Option<UploadedImage>, RepositoryError> {
        let sql = format!("SELECT {} FROM uploaded_images WHERE id = $1", UPLOAD_COLUMNS);
        let row = sqlx::query_as::<_, UploadedImageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UploadedImage::try_from).transpose()
    }

    /// Uploads owned by `user_id`, newest first. Rows sharing a timestamp are
    /// ordered by descending id so the order is total.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<UploadedImage>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM uploaded_images WHERE user_id = $1 ORDER BY uploaded_at DESC, id DESC",
            UPLOAD_COLUMNS
        );
        let rows = sqlx::query_as::<_, UploadedImageRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UploadedImage::try_from).collect()
    }
}
