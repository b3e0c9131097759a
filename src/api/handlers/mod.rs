pub mod auth;
pub mod comments;
pub mod health;
pub mod posts;
pub mod users;

// Shared validation and response shapes for the handlers.
use super::ApiError;
use crate::auth::Role;
use crate::store::User;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::ToSchema;
use uuid::Uuid;

pub(crate) const NAME_MAX: usize = 50;
pub(crate) const BIO_MAX: usize = 250;
pub(crate) const PASSWORD_MIN: usize = 6;
pub(crate) const PASSWORD_MAX: usize = 50;

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    email_pattern().is_some_and(|regex| regex.is_match(email_normalized))
}

/// Reject blank input.
pub(crate) fn require(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::validation(message))
    } else {
        Ok(())
    }
}

/// Lengths are counted in characters, not bytes.
pub(crate) fn max_chars(value: &str, max: usize, message: &str) -> Result<(), ApiError> {
    if value.chars().count() > max {
        Err(ApiError::validation(message))
    } else {
        Ok(())
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Account summary returned by auth and role endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Full profile of the signed-in user.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub bio: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
        }
    }
}
