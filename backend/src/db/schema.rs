//! Table definitions, applied at startup with `CREATE TABLE IF NOT EXISTS`.

use sqlx::SqlitePool;

use super::RepositoryError;

pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fullname TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL
    )",
    // detections_json holds a versioned envelope, see models::StoredDetections
    "CREATE TABLE IF NOT EXISTS uploaded_images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        output_path TEXT NOT NULL,
        detections_json TEXT NOT NULL,
        avg_confidence REAL,
        user_id INTEGER NOT NULL REFERENCES users(id),
        uploaded_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_uploaded_images_user
        ON uploaded_images (user_id, uploaded_at)",
];

pub async fn initialize(pool: &SqlitePool) -> Result<(), RepositoryError> {
    for statement in CREATE_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
