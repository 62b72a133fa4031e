use crate::db::RepositoryError;
use crate::db::models::User;
use crate::db::user_repository::UserRepository;

use super::password::{PasswordError, PasswordHasher};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Password error: {0}")]
    Password(#[from] PasswordError),
}

/// Signup and credential checks on top of the user table.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(users: UserRepository, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// Returns `false` when the username is taken.
    pub async fn signup(
        &self,
        fullname: &str,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        if self.users.find_by_username(username).await?.is_some() {
            return Ok(false);
        }

        let password_hash = self.hasher.hash(password.to_string()).await?;
        match self.users.create(fullname, username, &password_hash).await {
            Ok(_) => Ok(true),
            Err(RepositoryError::DuplicateUser(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// `None` for an unknown user and for a wrong password alike.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            log::info!("Login failed for unknown user {}", username);
            return Ok(None);
        };

        let matches = self
            .hasher
            .verify(password.to_string(), user.password_hash.clone())
            .await?;
        if matches {
            Ok(Some(user))
        } else {
            log::info!("Login failed for user {}: wrong password", username);
            Ok(None)
        }
    }
}
