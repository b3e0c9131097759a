//! Signed bearer tokens (HS256 JWTs).
//!
//! Access and refresh tokens are signed with different keys, so a token of one
//! kind never verifies as the other. Verification keeps expiry apart from every
//! other failure: expiry is routine, anything else means the token was tampered
//! with or minted elsewhere.

use super::Role;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so two tokens minted in the same second still differ.
    pub jti: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is missing")]
    MissingSecret,
    #[error("access and refresh tokens must use different secrets")]
    SharedSecret,
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl SigningKey {
    fn from_secret(secret: &SecretString, ttl_seconds: i64) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl_seconds,
        })
    }
}

pub struct TokenCodec {
    access: SigningKey,
    refresh: SigningKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl_seconds", &self.access.ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the two signing secrets with default lifetimes.
    ///
    /// # Errors
    /// Returns [`TokenError::MissingSecret`] if either secret is empty and
    /// [`TokenError::SharedSecret`] if both are the same.
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
    ) -> Result<Self, TokenError> {
        if access_secret.expose_secret() == refresh_secret.expose_secret() {
            if access_secret.expose_secret().is_empty() {
                return Err(TokenError::MissingSecret);
            }
            return Err(TokenError::SharedSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            access: SigningKey::from_secret(access_secret, DEFAULT_ACCESS_TTL_SECONDS)?,
            refresh: SigningKey::from_secret(refresh_secret, DEFAULT_REFRESH_TTL_SECONDS)?,
            validation,
        })
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self, kind: TokenKind) -> i64 {
        self.key(kind).ttl_seconds
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign a token for `user_id` carrying `role`, expiring per `kind`.
    ///
    /// # Errors
    /// Returns [`TokenError::Sign`] if encoding fails.
    pub fn issue(&self, user_id: Uuid, role: Role, kind: TokenKind) -> Result<String, TokenError> {
        let key = self.key(kind);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now,
            exp: now + key.ttl_seconds,
            jti: Uuid::new_v4(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &key.encoding).map_err(TokenError::Sign)
    }

    /// Check signature and expiry of `token` against the key for `kind`.
    ///
    /// # Errors
    /// Returns [`TokenError::Expired`] for a well-signed token past its expiry and
    /// [`TokenError::Invalid`] for anything else.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.key(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}
