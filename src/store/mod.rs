//! Persistence seams for users, posts and comments.
//!
//! Handlers and the session authority only see the [`Store`] trait. Two backends exist:
//! [`PgStore`] for Postgres and [`MemoryStore`] for tests and DSN-less runs.
//! Expected conflicts (duplicate email, taken slug) are outcomes, not errors.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::auth::Role;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Stored account, including credential material that never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub bio: String,
    pub avatar_url: String,
    /// SHA-256 of the only refresh token currently accepted for this user.
    pub refresh_token_hash: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a user; the id is chosen by the caller so tokens can be minted first.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub refresh_token_hash: Option<Vec<u8>>,
}

/// Profile columns to change; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug)]
pub enum CreateOutcome<T> {
    Created(T),
    Conflict,
}

/// Public identity embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Self {
        if value == "published" {
            Self::Published
        } else {
            Self::Draft
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub author: Author,
    pub tags: Vec<String>,
    pub cover_image: String,
    pub status: PostStatus,
    pub read_time: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable post fields, already validated and derived (slug, excerpt, read time).
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub cover_image: String,
    pub status: PostStatus,
    pub read_time: i32,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum PostWrite {
    Stored(Post),
    SlugTaken,
    Missing,
}

/// Filters for the public post listing. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub page: u32,
    pub limit: u32,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl PostQuery {
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: Author,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
}

/// Credential store consumed by the session authority.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by normalized (lowercase) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Insert a user; a taken email yields [`CreateOutcome::Conflict`].
    async fn create(&self, user: NewUser) -> Result<CreateOutcome<User>>;

    /// Replace only the refresh digest; `None` revokes the lineage.
    /// Returns `false` when the user no longer exists.
    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&[u8]>) -> Result<bool>;

    /// Swap the refresh digest from `current` to `next` in one conditional write.
    /// Returns `false` when the stored digest is no longer `current`.
    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &[u8],
        next: &[u8],
    ) -> Result<bool>;

    /// Change only the profile columns present in `update`.
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Option<User>>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>>;

    /// Users who can publish (author or admin), ordered by name.
    async fn list_authors(&self) -> Result<Vec<User>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, author_id: Uuid, draft: &PostDraft) -> Result<PostWrite>;

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>>;

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Published posts, newest publication first.
    async fn list_published(&self, query: &PostQuery) -> Result<Page<Post>>;

    /// Every post of one author regardless of status, newest first.
    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Post>>;

    async fn save_post(&self, id: Uuid, draft: &PostDraft) -> Result<PostWrite>;

    /// Delete a post and its comments. Returns `false` when nothing was deleted.
    async fn delete_post(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Comments of a post with the given parent (`None` for top level), newest first.
    async fn list_comments(&self, post_id: Uuid, parent_id: Option<Uuid>) -> Result<Vec<Comment>>;

    /// Replace the content and mark the comment as edited.
    async fn save_comment(&self, id: Uuid, content: &str) -> Result<Option<Comment>>;

    /// Delete a comment and its replies. Returns `false` when nothing was deleted.
    async fn delete_comment(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait Store: UserStore + PostStore + CommentStore {
    /// Round-trip to the backing storage, used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}
