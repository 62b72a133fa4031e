use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub user_id: i64,
    pub exp: usize,
    pub iat: usize,
}

/// Identity carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub username: String,
    pub user_id: i64,
}

impl From<Claims> for TokenIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            username: claims.sub,
            user_id: claims.user_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupParams {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}
