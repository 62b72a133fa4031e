pub mod models;
pub mod schema;
pub mod upload_repository;
pub mod user_repository;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("User already exists: {0}")]
    DuplicateUser(String),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Open the pool and make sure the tables exist.
///
/// In-memory databases are private to a connection, so the pool is pinned to
/// a single connection for `sqlite::memory:` URLs.
pub async fn connect(database_url: &str) -> Result<SqlitePool, RepositoryError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let in_memory = database_url.contains(":memory:");
    if !in_memory {
        create_parent_dir(database_url)?;
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
    if in_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;
    schema::initialize(&pool).await?;
    log::info!("Database ready at {}", database_url);
    Ok(pool)
}

fn create_parent_dir(database_url: &str) -> Result<(), RepositoryError> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RepositoryError::InvalidData(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    connect("sqlite::memory:").await.unwrap()
}
