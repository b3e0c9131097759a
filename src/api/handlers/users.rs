use super::{BIO_MAX, NAME_MAX, UserProfile, UserSummary, max_chars};
use crate::api::ApiError;
use crate::auth::{AuthUser, Role};
use crate::store::{ProfileUpdate, Store, User};
use axum::{
    Json,
    extract::{
        Extension, Path,
        rejection::{JsonRejection, PathRejection},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Public byline shown on the authors page.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: Uuid,
    pub name: String,
    pub bio: String,
    pub avatar_url: String,
}

impl From<&User> for AuthorProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// Public view of any user; never includes the email.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub bio: String,
    pub avatar_url: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthorsResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<AuthorProfile>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PublicUserResponse {
    pub success: bool,
    pub data: PublicUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserProfileResponse {
    pub success: bool,
    pub data: UserProfile,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummaryResponse {
    pub success: bool,
    pub data: UserSummary,
}

/// Only the fields present are changed. An empty name is ignored.
#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ChangeRoleRequest {
    pub role: Option<String>,
}

/// Apply a profile update to `user`, validating lengths first.
fn profile_update(request: UpdateProfileRequest) -> Result<ProfileUpdate, ApiError> {
    let name = request
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    if let Some(name) = &name {
        max_chars(name, NAME_MAX, "Name cannot exceed 50 characters")?;
    }
    if let Some(bio) = &request.bio {
        max_chars(bio, BIO_MAX, "Bio cannot exceed 250 characters")?;
    }
    Ok(ProfileUpdate {
        name,
        bio: request.bio,
        avatar_url: request.avatar_url,
    })
}

#[utoipa::path(
    get,
    path = "/api/users/authors",
    responses(
        (status = 200, description = "Users who can publish, by name", body = AuthorsResponse)
    ),
    tag = "users"
)]
pub async fn authors(store: Extension<Arc<dyn Store>>) -> Result<Json<AuthorsResponse>, ApiError> {
    let data: Vec<AuthorProfile> = store
        .list_authors()
        .await?
        .iter()
        .map(AuthorProfile::from)
        .collect();
    Ok(Json(AuthorsResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicUserResponse),
        (status = 400, description = "Malformed id", body = crate::api::error::ErrorResponse),
        (status = 404, description = "No such user", body = crate::api::error::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<PublicUserResponse>, ApiError> {
    let Path(id) = id?;
    let user = store
        .find_by_id(id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(PublicUserResponse {
        success: true,
        data: PublicUser::from(&user),
    }))
}

#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfileResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 404, description = "User no longer exists", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_profile(
    user: AuthUser,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let Json(request) = payload?;
    let update = profile_update(request)?;
    let stored = store
        .update_profile(user.id, &update)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(UserProfileResponse {
        success: true,
        data: UserProfile::from(&stored),
    }))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/role",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserSummaryResponse),
        (status = 400, description = "Missing or unknown role", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::api::error::ErrorResponse),
        (status = 404, description = "No such user", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn change_role(
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> Result<Json<UserSummaryResponse>, ApiError> {
    user.authorize(&[Role::Admin])?;
    let Path(id) = id?;
    let Json(request) = payload?;

    let role: Role = request
        .role
        .as_deref()
        .and_then(|role| role.parse().ok())
        .ok_or_else(|| ApiError::validation("Valid role is required"))?;

    let target = store
        .set_role(id, role)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!(admin_id = %user.id, user_id = %target.id, role = %role, "role changed");
    Ok(Json(UserSummaryResponse {
        success: true,
        data: UserSummary::from(&target),
    }))
}
