//! Post endpoints.
//!
//! Authors and admins write posts; everyone reads published ones. Slug,
//! excerpt and reading time are derived here before the post reaches the
//! store, and slug collisions are retried with a numeric suffix.

mod content;
mod slug;

use super::{MessageResponse, comments::CommentView, require};
use crate::api::ApiError;
use crate::auth::{AuthUser, Role};
use crate::store::{Author, Post, PostDraft, PostQuery, PostStatus, PostWrite, Store};
use anyhow::anyhow;
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
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const TITLE_MAX: usize = 200;
const EXCERPT_MAX: usize = 300;
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;
const SLUG_ATTEMPTS: usize = 50;
const PUBLISHERS: &[Role] = &[Role::Author, Role::Admin];

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    /// Omitted in list views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub excerpt: String,
    pub author: Author,
    pub tags: Vec<String>,
    pub cover_image: String,
    pub status: PostStatus,
    pub read_time: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Top-level comments; only present on the single-post view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<CommentView>>,
}

impl PostView {
    fn full(post: Post) -> Self {
        let content = post.content.clone();
        Self {
            content: Some(content),
            ..Self::summary(post)
        }
    }

    fn summary(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            slug: post.slug,
            content: None,
            excerpt: post.excerpt,
            author: post.author,
            tags: post.tags,
            cover_image: post.cover_image,
            status: post.status,
            read_time: post.read_time,
            published_at: post.published_at,
            created_at: post.created_at,
            updated_at: post.updated_at,
            comments: None,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PostResponse {
    pub success: bool,
    pub data: PostView,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub pages: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PostListResponse {
    pub success: bool,
    pub count: usize,
    pub pagination: Pagination,
    pub data: Vec<PostView>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MyPostsResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<PostView>,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PostRequest {
    pub title: String,
    pub content: String,
    /// Derived from the content when empty.
    pub excerpt: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cover_image: Option<String>,
    /// Defaults to `draft` on create and to the current status on update.
    pub status: Option<PostStatus>,
}

/// Unparseable or non-positive numbers fall back to the defaults.
#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct PostListParams {
    /// 1-based page, default 1.
    pub page: Option<String>,
    /// Page size, default 10, capped at 100.
    pub limit: Option<String>,
    /// Only posts carrying this tag.
    pub tag: Option<String>,
    /// Case-insensitive match on title, content or excerpt.
    pub search: Option<String>,
}

impl PostListParams {
    fn into_query(self) -> PostQuery {
        let positive = |value: Option<String>| {
            value
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .filter(|value| *value > 0)
        };
        let non_empty = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        PostQuery {
            page: positive(self.page).unwrap_or(1),
            limit: positive(self.limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            tag: non_empty(self.tag),
            search: non_empty(self.search),
        }
    }
}

fn pagination(query: &PostQuery, total: u64) -> Pagination {
    Pagination {
        total,
        pages: total.div_ceil(u64::from(query.limit.max(1))),
        page: query.page,
        limit: query.limit,
    }
}

fn validate(request: &PostRequest) -> Result<(), ApiError> {
    require(&request.title, "Title is required")?;
    if request.title.trim().chars().count() > TITLE_MAX {
        return Err(ApiError::validation("Title cannot exceed 200 characters"));
    }
    require(&request.content, "Content is required")?;
    if let Some(excerpt) = &request.excerpt
        && excerpt.trim().chars().count() > EXCERPT_MAX
    {
        return Err(ApiError::validation("Excerpt cannot exceed 300 characters"));
    }
    Ok(())
}

/// Builds the stored fields from a validated request. `existing` is the post
/// being updated, if any; it keeps its slug while the title is unchanged and
/// keeps its first publication time.
fn draft_from_request(request: PostRequest, existing: Option<&Post>) -> PostDraft {
    let title = request.title.trim().to_string();
    let slug = match existing {
        Some(post) if post.title == title => post.slug.clone(),
        _ => slug::slug_from_title(&title),
    };
    let excerpt = request
        .excerpt
        .map(|excerpt| excerpt.trim().to_string())
        .filter(|excerpt| !excerpt.is_empty())
        .unwrap_or_else(|| content::excerpt(&request.content));
    let status = request
        .status
        .or(existing.map(|post| post.status))
        .unwrap_or_default();
    let published_at = existing.and_then(|post| post.published_at).or_else(|| {
        (status == PostStatus::Published).then(Utc::now)
    });
    let tags = request
        .tags
        .unwrap_or_default()
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    PostDraft {
        read_time: content::read_time(&request.content),
        title,
        slug,
        content: request.content,
        excerpt,
        tags,
        cover_image: request.cover_image.unwrap_or_default(),
        status,
        published_at,
    }
}

#[derive(Clone, Copy)]
enum WriteTarget {
    Create { author_id: Uuid },
    Update { post_id: Uuid },
}

/// Writes the draft, retrying with `-2`, `-3`, ... while the slug is taken.
/// Returns `None` when the target vanished.
async fn write_post(
    store: &dyn Store,
    target: WriteTarget,
    mut draft: PostDraft,
) -> Result<Option<Post>, ApiError> {
    let base = draft.slug.clone();
    for attempt in 1..=SLUG_ATTEMPTS {
        if attempt > 1 {
            draft.slug = slug::with_suffix(&base, attempt, slug::SLUG_MAX)
                .ok_or_else(|| anyhow!("cannot derive a suffixed slug from {base}"))?;
        }
        let outcome = match target {
            WriteTarget::Create { author_id } => store.create_post(author_id, &draft).await?,
            WriteTarget::Update { post_id } => store.save_post(post_id, &draft).await?,
        };
        match outcome {
            PostWrite::Stored(post) => return Ok(Some(post)),
            PostWrite::Missing => return Ok(None),
            PostWrite::SlugTaken => debug!(slug = %draft.slug, "slug taken, retrying"),
        }
    }
    Err(anyhow!("no free slug for {base} after {SLUG_ATTEMPTS} attempts").into())
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = PostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller cannot publish", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "posts"
)]
pub async fn create_post(
    user: AuthUser,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    user.authorize(PUBLISHERS)?;
    let Json(request) = payload?;
    validate(&request)?;

    let draft = draft_from_request(request, None);
    let post = write_post(
        &**store,
        WriteTarget::Create { author_id: user.id },
        draft,
    )
    .await?
    .ok_or(ApiError::NotFound("User not found"))?;
    info!(post_id = %post.id, slug = %post.slug, "post created");

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            success: true,
            data: PostView::full(post),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/posts",
    params(PostListParams),
    responses(
        (status = 200, description = "Published posts, newest first, without content", body = PostListResponse)
    ),
    tag = "posts"
)]
pub async fn list_posts(
    params: Result<Query<PostListParams>, QueryRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<PostListResponse>, ApiError> {
    let Query(params) = params?;
    let query = params.into_query();
    let page = store.list_published(&query).await?;

    let data: Vec<PostView> = page.items.into_iter().map(PostView::summary).collect();
    Ok(Json(PostListResponse {
        success: true,
        count: data.len(),
        pagination: pagination(&query, page.total),
        data,
    }))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post}",
    params(("post" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Published post with its top-level comments", body = PostResponse),
        (status = 404, description = "No published post with this slug", body = crate::api::error::ErrorResponse)
    ),
    tag = "posts"
)]
pub async fn get_post(
    slug: Result<Path<String>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<PostResponse>, ApiError> {
    let Path(slug) = slug?;
    let post = store
        .find_published_by_slug(&slug)
        .await?
        .ok_or(ApiError::NotFound("Post not found"))?;
    let comments = store
        .list_comments(post.id, None)
        .await?
        .into_iter()
        .map(CommentView::from)
        .collect();

    Ok(Json(PostResponse {
        success: true,
        data: PostView {
            comments: Some(comments),
            ..PostView::full(post)
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/posts/user/me",
    responses(
        (status = 200, description = "All of the caller's posts, newest first, without content", body = MyPostsResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller cannot publish", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "posts"
)]
pub async fn my_posts(
    user: AuthUser,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<MyPostsResponse>, ApiError> {
    user.authorize(PUBLISHERS)?;
    let data: Vec<PostView> = store
        .list_by_author(user.id)
        .await?
        .into_iter()
        .map(PostView::summary)
        .collect();
    Ok(Json(MyPostsResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

#[utoipa::path(
    put,
    path = "/api/posts/{post}",
    params(("post" = Uuid, Path, description = "Post id")),
    request_body = PostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 400, description = "Invalid input", body = crate::api::error::ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller is neither the author nor an admin", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "posts"
)]
pub async fn update_post(
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    validate(&request)?;

    let existing = store
        .find_post(id)
        .await?
        .ok_or(ApiError::NotFound("Post not found"))?;
    if !user.owns_or_admin(existing.author.id) {
        return Err(ApiError::Forbidden("Not authorized to update this post"));
    }

    let draft = draft_from_request(request, Some(&existing));
    let post = write_post(&**store, WriteTarget::Update { post_id: id }, draft)
        .await?
        .ok_or(ApiError::NotFound("Post not found"))?;
    info!(post_id = %post.id, user_id = %user.id, "post updated");

    Ok(Json(PostResponse {
        success: true,
        data: PostView::full(post),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{post}",
    params(("post" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post and its comments removed", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::api::error::ErrorResponse),
        (status = 403, description = "Caller is neither the author nor an admin", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::api::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "posts"
)]
pub async fn delete_post(
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    store: Extension<Arc<dyn Store>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    let existing = store
        .find_post(id)
        .await?
        .ok_or(ApiError::NotFound("Post not found"))?;
    if !user.owns_or_admin(existing.author.id) {
        return Err(ApiError::Forbidden("Not authorized to delete this post"));
    }

    if !store.delete_post(id).await? {
        return Err(ApiError::NotFound("Post not found"));
    }
    info!(post_id = %id, user_id = %user.id, "post removed");
    Ok(Json(MessageResponse::ok("Post removed")))
}
