//! One error type for every handler, rendered as `{ "success": false, "message": ... }`.

use crate::auth::AuthError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, (*message).to_string()),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, (*message).to_string()),
            Self::Auth(err) => auth_status_and_message(err),
            Self::Internal(_) => internal(),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// The refresh-path failures share one message so clients cannot tell them apart.
fn auth_status_and_message(err: &AuthError) -> (StatusCode, String) {
    let (status, message) = match err {
        AuthError::DuplicateEmail => (StatusCode::BAD_REQUEST, "User already exists"),
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid email or password"),
        AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authorized"),
        AuthError::Forbidden => (
            StatusCode::FORBIDDEN,
            "Not authorized to access this resource",
        ),
        AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Refresh token required"),
        AuthError::InvalidRefresh | AuthError::RefreshExpired | AuthError::RefreshRevoked => {
            (StatusCode::FORBIDDEN, "Invalid refresh token")
        }
        AuthError::NotFound => (StatusCode::NOT_FOUND, "User not found"),
        AuthError::Internal(_) => return internal(),
    };
    (status, message.to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Request failed: {self:#}");
        } else {
            debug!(status = status.as_u16(), "Request rejected: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        Self::validation("Invalid id")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn rendered(err: ApiError) -> anyhow::Result<(StatusCode, ErrorResponse)> {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn refresh_failures_are_opaque() -> anyhow::Result<()> {
        let mut messages = Vec::new();
        for err in [
            AuthError::InvalidRefresh,
            AuthError::RefreshExpired,
            AuthError::RefreshRevoked,
        ] {
            let (status, body) = rendered(err.into()).await?;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(!body.success);
            messages.push(body.message);
        }
        messages.dedup();
        assert_eq!(messages.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn status_codes_follow_taxonomy() -> anyhow::Result<()> {
        let cases = [
            (ApiError::validation("bad"), StatusCode::BAD_REQUEST),
            (AuthError::DuplicateEmail.into(), StatusCode::BAD_REQUEST),
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (AuthError::Unauthorized.into(), StatusCode::UNAUTHORIZED),
            (AuthError::MissingToken.into(), StatusCode::UNAUTHORIZED),
            (AuthError::Forbidden.into(), StatusCode::FORBIDDEN),
            (AuthError::NotFound.into(), StatusCode::NOT_FOUND),
            (ApiError::NotFound("Post not found"), StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            let (status, _) = rendered(err).await?;
            assert_eq!(status, expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn internal_errors_hide_details() -> anyhow::Result<()> {
        let err = ApiError::from(anyhow::anyhow!("connection refused to 10.0.0.7"));
        let (status, body) = rendered(err).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");

        let err = ApiError::from(AuthError::Internal(anyhow::anyhow!("disk full")));
        let (status, body) = rendered(err).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("disk"));
        Ok(())
    }
}
