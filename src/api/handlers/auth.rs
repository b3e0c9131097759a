//! Session endpoints: register, login, refresh, logout and profile.
//!
//! Access tokens travel in the JSON body; refresh tokens only ever travel in
//! the `refreshToken` cookie.

use super::{
    MessageResponse, NAME_MAX, PASSWORD_MAX, PASSWORD_MIN, UserProfile, UserSummary, max_chars,
    require, valid_email,
};
use crate::api::ApiError;
use crate::auth::{
    AuthState, AuthUser, Registration, Role,
    cookie::{clear_refresh_cookie, extract_refresh_token, refresh_cookie},
};
use anyhow::Context;
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// `reader` or `author`; `admin` is downgraded to `reader`.
    pub role: Option<Role>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub access_token: String,
    pub user: UserSummary,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserProfile,
}

fn validate_register(request: &RegisterRequest) -> Result<(), ApiError> {
    require(&request.name, "Name is required")?;
    max_chars(request.name.trim(), NAME_MAX, "Name cannot exceed 50 characters")?;
    if !valid_email(&request.email.trim().to_lowercase()) {
        return Err(ApiError::validation("Please provide a valid email"));
    }
    if request.password.chars().count() < PASSWORD_MIN {
        return Err(ApiError::validation(
            "Password must be at least 6 characters",
        ));
    }
    max_chars(
        &request.password,
        PASSWORD_MAX,
        "Password cannot exceed 50 characters",
    )
}

fn validate_login(request: &LoginRequest) -> Result<(), ApiError> {
    if !valid_email(&request.email.trim().to_lowercase()) {
        return Err(ApiError::validation("Please provide a valid email"));
    }
    if request.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }
    Ok(())
}

fn set_refresh_cookie(auth_state: &AuthState, token: &str) -> Result<HeaderMap, ApiError> {
    let cookie = refresh_cookie(auth_state.config(), token)
        .context("refresh token is not a valid cookie value")?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok(headers)
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; refresh cookie set", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered", body = crate::api::error::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    validate_register(&request)?;

    let session = auth_state
        .sessions()
        .register(Registration {
            name: request.name,
            email: request.email,
            password: request.password,
            role: request.role,
        })
        .await?;

    let headers = set_refresh_cookie(&auth_state, &session.tokens.refresh_token)?;
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            success: true,
            access_token: session.tokens.access_token,
            user: UserSummary::from(&session.user),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh cookie set", body = AuthResponse),
        (status = 400, description = "Malformed input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Invalid email or password", body = crate::api::error::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    validate_login(&request)?;

    let session = auth_state
        .sessions()
        .login(&request.email, &request.password)
        .await?;

    let headers = set_refresh_cookie(&auth_state, &session.tokens.refresh_token)?;
    Ok((
        headers,
        Json(AuthResponse {
            success: true,
            access_token: session.tokens.access_token,
            user: UserSummary::from(&session.user),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Tokens rotated; new refresh cookie set", body = RefreshResponse),
        (status = 401, description = "No refresh cookie", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Refresh token invalid, expired or revoked", body = crate::api::error::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    let presented = extract_refresh_token(&headers);
    let tokens = auth_state.sessions().refresh(presented.as_deref()).await?;

    let response_headers = set_refresh_cookie(&auth_state, &tokens.refresh_token)?;
    Ok((
        response_headers,
        Json(RefreshResponse {
            success: true,
            access_token: tokens.access_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Refresh token revoked and cookie cleared", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    user: AuthUser,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, ApiError> {
    auth_state.sessions().logout(user.id).await?;

    let mut headers = HeaderMap::new();
    let cookie = clear_refresh_cookie(auth_state.config())
        .context("failed to build clearing cookie")?;
    headers.insert(SET_COOKIE, cookie);
    Ok((headers, Json(MessageResponse::ok("Logged out successfully"))))
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current user's profile", body = ProfileResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 404, description = "User no longer exists", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn profile(
    user: AuthUser,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let stored = auth_state.sessions().profile(user.id).await?;
    Ok(Json(ProfileResponse {
        success: true,
        user: UserProfile::from(&stored),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: None,
        }
    }

    #[test]
    fn register_validation_messages() {
        let cases = [
            (register_request("", "a@b.co", "secret1"), "Name is required"),
            (
                register_request(&"n".repeat(51), "a@b.co", "secret1"),
                "Name cannot exceed 50 characters",
            ),
            (
                register_request("Ana", "nope", "secret1"),
                "Please provide a valid email",
            ),
            (
                register_request("Ana", "a@b.co", "12345"),
                "Password must be at least 6 characters",
            ),
            (
                register_request("Ana", "a@b.co", &"p".repeat(51)),
                "Password cannot exceed 50 characters",
            ),
        ];
        for (request, expected) in cases {
            match validate_register(&request) {
                Err(ApiError::Validation(message)) => assert_eq!(message, expected),
                other => panic!("expected validation error {expected:?}, got {other:?}"),
            }
        }
        assert!(validate_register(&register_request("Ana", " Ana@X.com ", "secret1")).is_ok());
    }

    #[test]
    fn login_requires_email_and_password() {
        let missing_password = LoginRequest {
            email: "ana@x.com".to_string(),
            password: String::new(),
        };
        assert!(validate_login(&missing_password).is_err());
        let bad_email = LoginRequest {
            email: "ana".to_string(),
            password: "secret1".to_string(),
        };
        assert!(validate_login(&bad_email).is_err());
    }
}
