//! Threaded comments. Any signed-in user may comment; only the author may
//! edit, and the author or an admin may delete (replies go with it).

use super::{MessageResponse, max_chars, require};
use crate::api::ApiError;
use crate::auth::AuthUser;
use crate::store::{Author, Comment, NewComment, Store};
use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const COMMENT_MAX: usize = 1000;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: Author,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author: comment.author,
            content: comment.content,
            parent_id: comment.parent_id,
            is_edited: comment.is_edited,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CommentResponse {
    pub success: bool,
    pub data: CommentView,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CommentListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<CommentView>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct CommentRequest {
    pub content: String,
    /// Comment being replied to; must belong to the same post.
    pub parent: Option<Uuid>,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct CommentListQuery {
    /// List replies of this comment instead of top-level comments.
    pub parent: Option<Uuid>,
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    require(content, "Comment content is required")?;
    max_chars(content, COMMENT_MAX, "Comment cannot exceed 1000 characters")
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Post or parent comment not found", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "comments"
)]
pub async fn create_comment(
    user: AuthUser,
    post_id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let Path(post_id) = post_id?;
    let Json(request) = payload?;
    validate_content(&request.content)?;

    if store.find_post(post_id).await?.is_none() {
        return Err(ApiError::NotFound("Post not found"));
    }
    if let Some(parent_id) = request.parent {
        let parent = store.find_comment(parent_id).await?;
        if parent.is_none_or(|parent| parent.post_id != post_id) {
            return Err(ApiError::NotFound("Parent comment not found"));
        }
    }

    let comment = store
        .create_comment(NewComment {
            post_id,
            author_id: user.id,
            content: request.content,
            parent_id: request.parent,
        })
        .await?;
    info!(comment_id = %comment.id, post_id = %post_id, "comment created");

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            success: true,
            data: comment.into(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Post id"), CommentListQuery),
    responses(
        (status = 200, description = "Comments, newest first", body = CommentListResponse),
        (status = 400, description = "Malformed id", body = crate::api::error::ErrorResponse)
    ),
    tag = "comments"
)]
pub async fn list_comments(
    post_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<CommentListQuery>, QueryRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<CommentListResponse>, ApiError> {
    let Path(post_id) = post_id?;
    let Query(query) = query?;
    let data: Vec<CommentView> = store
        .list_comments(post_id, query.parent)
        .await?
        .into_iter()
        .map(CommentView::from)
        .collect();
    Ok(Json(CommentListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

#[utoipa::path(
    put,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Comment updated", body = CommentResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller did not write the comment", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "comments"
)]
pub async fn update_comment(
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<CommentResponse>, ApiError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    validate_content(&request.content)?;

    let comment = store
        .find_comment(id)
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;
    // Admins may delete other people's comments but never rewrite them.
    if comment.author.id != user.id {
        return Err(ApiError::Forbidden("Not authorized to update this comment"));
    }

    let updated = store
        .save_comment(id, &request.content)
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;
    Ok(Json(CommentResponse {
        success: true,
        data: updated.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment and its replies removed", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller is neither the author nor an admin", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "comments"
)]
pub async fn delete_comment(
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    let comment = store
        .find_comment(id)
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;
    if !user.owns_or_admin(comment.author.id) {
        return Err(ApiError::Forbidden("Not authorized to delete this comment"));
    }

    if !store.delete_comment(id).await? {
        return Err(ApiError::NotFound("Comment not found"));
    }
    info!(comment_id = %id, user_id = %user.id, "comment removed");
    Ok(Json(MessageResponse::ok("Comment removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_rules() {
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"c".repeat(1001)).is_err());
        assert!(validate_content(&"c".repeat(1000)).is_ok());
    }

    #[test]
    fn view_uses_camel_case() -> anyhow::Result<()> {
        let now = Utc::now();
        let view = CommentView::from(Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            author: Author {
                id: Uuid::new_v4(),
                name: "Ana".to_string(),
                avatar_url: String::new(),
            },
            content: "Nice".to_string(),
            parent_id: None,
            is_edited: false,
            created_at: now,
            updated_at: now,
        });
        let value = serde_json::to_value(view)?;
        assert!(value.get("postId").is_some());
        assert_eq!(value.get("isEdited"), Some(&serde_json::Value::Bool(false)));
        assert!(value.get("parentId").is_some_and(serde_json::Value::is_null));
        Ok(())
    }
}
