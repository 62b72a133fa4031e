use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Password hashing task failed: {0}")]
    Task(String),
}

/// Argon2id password hashing. Hashes are PHC strings carrying their own salt
/// and parameters, so verification does not need this hasher's settings.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    const MEMORY_COST: u32 = 19_456;
    const TIME_COST: u32 = 2;
    const PARALLELISM: u32 = 1;

    pub fn new() -> Self {
        Self {
            params: Params::new(Self::MEMORY_COST, Self::TIME_COST, Self::PARALLELISM, None)
                .unwrap_or_default(),
        }
    }

    /// Cheaper parameters, for tests and constrained hosts.
    pub fn with_params(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            params: Params::new(memory_cost, time_cost, parallelism, None).unwrap_or_default(),
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// `false` for a mismatch and for a hash that cannot be parsed.
    pub fn verify_password(&self, password: &str, password_hash: &str) -> bool {
        match PasswordHash::new(password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::error!("Stored password hash is not a valid PHC string: {}", e);
                false
            }
        }
    }

    /// Hash on the blocking pool so request workers are not stalled.
    pub async fn hash(&self, password: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    pub async fn verify(&self, password: String, password_hash: String) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &password_hash))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::with_params(1024, 1, 1)
    }

    #[test]
    fn verifies_own_hash_only() {
        let hasher = fast_hasher();
        let hash = hasher.hash_password("pw1").unwrap();
        assert!(hasher.verify_password("pw1", &hash));
        assert!(!hasher.verify_password("pw2", &hash));
        assert!(!hasher.verify_password("", &hash));
    }

    #[test]
    fn hashes_are_salted_argon2id() {
        let hasher = fast_hasher();
        let first = hasher.hash_password("same").unwrap();
        let second = hasher.hash_password("same").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
    }

    #[test]
    fn garbage_hash_does_not_verify() {
        assert!(!fast_hasher().verify_password("pw", "not-a-phc-string"));
    }

    #[test]
    fn default_params_round_trip() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash_password("correct horse").unwrap();
        assert!(hasher.verify_password("correct horse", &hash));
    }

    #[actix_web::test]
    async fn async_helpers_use_blocking_pool() {
        let hasher = fast_hasher();
        let hash = hasher.hash("pw".to_string()).await.unwrap();
        assert!(hasher.verify("pw".to_string(), hash.clone()).await.unwrap());
        assert!(!hasher.verify("nope".to_string(), hash).await.unwrap());
    }
}
