use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::User;

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, fullname, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Insert a user. The UNIQUE constraint on `username` is the final word,
    /// so two concurrent signups for the same name cannot both succeed.
    pub async fn create(
        &self,
        fullname: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (fullname, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, fullname, username, password_hash
            "#,
        )
        .bind(fullname)
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => {
                log::info!("Created user {} (id {})", user.username, user.id);
                Ok(user)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                log::warn!("Signup rejected, username {} already exists", username);
                Err(RepositoryError::DuplicateUser(username.to_string()))
            }
            Err(e) => {
                log::error!("Failed to insert user {}: {:?}", username, e);
                Err(e.into())
            }
        }
    }
}
