use actix_web::{HttpResponse, web};
use serde::de::DeserializeOwned;
use shared::{LoginResponse, MessageResponse};

use super::jwt::JwtService;
use super::models::{LoginParams, SignupParams};
use super::service::AuthService;
use crate::error::ApiError;

/// Parameters may arrive as an urlencoded body or in the query string.
pub type FormOrQuery<T> = web::Either<web::Form<T>, web::Query<T>>;

fn into_params<T: DeserializeOwned>(params: FormOrQuery<T>) -> T {
    match params {
        web::Either::Left(form) => form.into_inner(),
        web::Either::Right(query) => query.into_inner(),
    }
}

pub async fn signup(
    params: FormOrQuery<SignupParams>,
    auth_service: web::Data<AuthService>,
) -> Result<HttpResponse, ApiError> {
    let params = into_params(params);
    if params.fullname.is_empty() || params.username.is_empty() || params.password.is_empty() {
        return Err(ApiError::Validation("All fields required".to_string()));
    }
    if params.password != params.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }

    if auth_service
        .signup(&params.fullname, &params.username, &params.password)
        .await?
    {
        log::info!("Signup successful for {}", params.username);
        Ok(HttpResponse::Ok().json(MessageResponse {
            message: "Signup successful".to_string(),
        }))
    } else {
        Err(ApiError::Validation("User already exists".to_string()))
    }
}

pub async fn login(
    params: FormOrQuery<LoginParams>,
    auth_service: web::Data<AuthService>,
    jwt_service: web::Data<JwtService>,
) -> Result<HttpResponse, ApiError> {
    let params = into_params(params);
    let user = auth_service
        .authenticate(&params.username, &params.password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let access_token = jwt_service
        .issue_token(user.id, &user.username)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    log::info!("User {} logged in", user.username);

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        fullname: user.fullname,
    }))
}
