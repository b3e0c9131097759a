//! Access guard: bearer-token authentication and role authorization.
//!
//! The identity comes from the signed access token alone; the user row is not
//! re-read, so a role change reaches already-issued tokens only when they expire.

use super::{AuthError, AuthState, Role, TokenCodec, TokenKind};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// An empty `allowed` slice admits any authenticated user.
    ///
    /// # Errors
    /// [`AuthError::Forbidden`] if the role is not in `allowed`.
    pub fn authorize(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.is_empty() || allowed.contains(&self.role) {
            Ok(())
        } else {
            debug!(user_id = %self.id, role = %self.role, "role not allowed");
            Err(AuthError::Forbidden)
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    #[must_use]
    pub fn owns_or_admin(&self, owner_id: Uuid) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

/// Only the exact `Bearer ` scheme prefix is accepted.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Resolve the request's bearer token into an identity.
///
/// # Errors
/// [`AuthError::Unauthorized`] for a missing, malformed, expired or foreign token.
pub fn authenticate(codec: &TokenCodec, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthorized)?;
    let claims = codec.verify(token, TokenKind::Access).map_err(|err| {
        debug!("access token rejected: {err}");
        AuthError::Unauthorized
    })?;
    Ok(AuthUser {
        id: claims.sub,
        role: claims.role,
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(auth_state) = parts.extensions.get::<Arc<AuthState>>() else {
            error!("AuthState extension is not installed");
            return Err(AuthError::Internal(anyhow::anyhow!(
                "auth state missing from request extensions"
            )));
        };
        authenticate(auth_state.codec(), &parts.headers)
    }
}
