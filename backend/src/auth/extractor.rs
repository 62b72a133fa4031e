use actix_web::http::header::Header;
use actix_web::{FromRequest, HttpRequest, web};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{Ready, ready};

use super::jwt::JwtService;
use super::models::{TokenIdentity, TokenQuery};
use crate::error::ApiError;

/// Caller identity taken from a valid token.
///
/// The token is read from `Authorization: Bearer <token>` first and from the
/// `token` query parameter otherwise. Every failure (missing, malformed,
/// expired, bad signature) is the same 401.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub TokenIdentity);

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.0.user_id
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }
}

fn request_token(req: &HttpRequest) -> Option<String> {
    if let Ok(auth) = Authorization::<Bearer>::parse(req) {
        return Some(auth.into_scheme().token().to_string());
    }
    web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().token)
        .filter(|token| !token.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let Some(jwt_service) = req.app_data::<web::Data<JwtService>>() else {
        return Err(ApiError::Internal("JwtService is not registered".to_string()));
    };
    let Some(token) = request_token(req) else {
        log::debug!("No token found for path: {}", req.path());
        return Err(ApiError::Unauthorized);
    };
    match jwt_service.decode_token(&token) {
        Some(identity) => Ok(AuthenticatedUser(identity)),
        None => {
            log::warn!("Token verification failed for path: {}", req.path());
            Err(ApiError::Unauthorized)
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn jwt() -> JwtService {
        JwtService::new("extractor-secret")
    }

    #[test]
    fn bearer_header_wins_over_query() {
        let jwt = jwt();
        let header_token = jwt.issue_token(1, "alice").unwrap();
        let query_token = jwt.issue_token(2, "bob").unwrap();
        let req = TestRequest::get()
            .uri(&format!("/history?token={}", query_token))
            .insert_header(("Authorization", format!("Bearer {}", header_token)))
            .app_data(web::Data::new(jwt))
            .to_http_request();

        let user = authenticate(&req).unwrap();
        assert_eq!(user.user_id(), 1);
        assert_eq!(user.username(), "alice");
    }

    #[test]
    fn query_token_is_accepted() {
        let jwt = jwt();
        let token = jwt.issue_token(2, "bob").unwrap();
        let req = TestRequest::get()
            .uri(&format!("/history?token={}", token))
            .app_data(web::Data::new(jwt))
            .to_http_request();

        assert_eq!(authenticate(&req).unwrap().user_id(), 2);
    }

    #[test]
    fn missing_or_bad_token_is_unauthorized() {
        let req = TestRequest::get()
            .uri("/history")
            .app_data(web::Data::new(jwt()))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Unauthorized)));

        let req = TestRequest::get()
            .uri("/history?token=garbage")
            .app_data(web::Data::new(jwt()))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Unauthorized)));
    }
}
