use super::models::{Claims, TokenIdentity};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 4;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            ttl,
        }
    }

    pub fn issue_token(&self, user_id: i64, username: &str) -> Result<String, JwtError> {
        self.issue_token_at(user_id, username, Utc::now())
    }

    pub(crate) fn issue_token_at(
        &self,
        user_id: i64,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        let expiration = issued_at + self.ttl;
        let claims = Claims {
            sub: username.to_string(),
            user_id,
            exp: expiration.timestamp().max(0) as usize,
            iat: issued_at.timestamp().max(0) as usize,
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }

    /// Signature, `exp` and `sub` are all checked by `jsonwebtoken`; with zero
    /// leeway a token is rejected as soon as `exp` has passed.
    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(JwtError::TokenExpired),
                jsonwebtoken::errors::ErrorKind::InvalidToken => Err(JwtError::InvalidToken),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => Err(JwtError::InvalidToken),
                _ => Err(JwtError::Decoding(err.to_string())),
            },
        }
    }

    /// Fail-closed decode: any verification problem yields `None`.
    pub fn decode_token(&self, token: &str) -> Option<TokenIdentity> {
        match self.verify_token(token) {
            Ok(claims) => Some(claims.into()),
            Err(e) => {
                log::debug!("Rejected token: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_decodes_to_same_identity() {
        let jwt = JwtService::new(SECRET);
        let token = jwt.issue_token(7, "alice").unwrap();
        assert_eq!(
            jwt.decode_token(&token),
            Some(TokenIdentity {
                username: "alice".into(),
                user_id: 7
            })
        );
    }

    #[test]
    fn default_window_is_four_hours() {
        let jwt = JwtService::new(SECRET);
        let token = jwt.issue_token(1, "alice").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 4 * 3600);
    }

    #[test]
    fn expired_token_decodes_to_nothing() {
        let jwt = JwtService::new(SECRET);
        let issued_at = Utc::now() - Duration::hours(4) - Duration::seconds(1);
        let token = jwt.issue_token_at(7, "alice", issued_at).unwrap();
        assert!(matches!(jwt.verify_token(&token), Err(JwtError::TokenExpired)));
        assert_eq!(jwt.decode_token(&token), None);
    }

    #[test]
    fn token_just_inside_window_is_valid() {
        let jwt = JwtService::new(SECRET);
        let issued_at = Utc::now() - Duration::hours(4) + Duration::minutes(1);
        let token = jwt.issue_token_at(7, "alice", issued_at).unwrap();
        assert!(jwt.decode_token(&token).is_some());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = JwtService::new("other").issue_token(7, "alice").unwrap();
        assert!(matches!(
            JwtService::new(SECRET).verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
        assert_eq!(JwtService::new(SECRET).decode_token(&token), None);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let jwt = JwtService::new(SECRET);
        let token = jwt.issue_token(7, "alice").unwrap();
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let forged = JwtService::new("other").issue_token(1, "mallory").unwrap();
        parts[1] = forged.split('.').nth(1).unwrap().to_string();
        assert_eq!(jwt.decode_token(&parts.join(".")), None);
    }

    #[test]
    fn malformed_tokens_decode_to_nothing() {
        let jwt = JwtService::new(SECRET);
        assert_eq!(jwt.decode_token(""), None);
        assert_eq!(jwt.decode_token("not-a-token"), None);
        assert_eq!(jwt.decode_token("a.b.c"), None);
    }
}
