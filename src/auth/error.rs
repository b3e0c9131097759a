use super::TokenError;

/// Failures of the session authority and the access guard.
///
/// The refresh-path variants stay distinct here for logging even though the
/// HTTP layer reports them with one opaque message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing or invalid access token")]
    Unauthorized,
    #[error("role not allowed")]
    Forbidden,
    #[error("refresh token missing")]
    MissingToken,
    #[error("refresh token invalid")]
    InvalidRefresh,
    #[error("refresh token expired")]
    RefreshExpired,
    #[error("refresh token superseded or revoked")]
    RefreshRevoked,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.into())
    }
}
