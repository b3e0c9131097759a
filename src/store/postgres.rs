//! Postgres backend. Every query runs inside a `db.query` span.

use super::{
    Author, Comment, CommentStore, CreateOutcome, NewComment, NewUser, Page, Post, PostDraft,
    PostQuery, PostStatus, PostStore, PostWrite, ProfileUpdate, Store, User, UserStore,
};
use crate::auth::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    Connection, PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use std::time::Duration;
use tracing::{Instrument, Span, info_span};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const USER_COLUMNS: &str = "id, name, email, password_hash, role, bio, avatar_url, \
                            refresh_token_hash, created_at, updated_at";

const POST_SELECT: &str = r"
    SELECT p.id, p.title, p.slug, p.content, p.excerpt, p.tags, p.cover_image, p.status,
           p.read_time, p.published_at, p.created_at, p.updated_at,
           u.id AS author_id, u.name AS author_name, u.avatar_url AS author_avatar_url
    FROM posts p
    JOIN users u ON u.id = p.author_id
";

const COMMENT_SELECT: &str = r"
    SELECT c.id, c.post_id, c.content, c.parent_id, c.is_edited, c.created_at, c.updated_at,
           u.id AS author_id, u.name AS author_name, u.avatar_url AS author_avatar_url
    FROM comments c
    JOIN users u ON u.id = c.author_id
";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and apply the bundled schema.
    ///
    /// # Errors
    /// Returns an error if the connection or a schema statement fails.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute `sql/schema.sql` statement by statement.
    ///
    /// # Errors
    /// Returns an error naming the first statement that failed.
    pub async fn apply_schema(&self) -> Result<()> {
        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .instrument(db_span("DDL", statement))
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }
        Ok(())
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Escape `LIKE` metacharacters so user search text is matched literally.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>()?,
        bio: row.try_get("bio")?,
        avatar_url: row.try_get("avatar_url")?,
        refresh_token_hash: row.try_get("refresh_token_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn author_from_row(row: &PgRow) -> Result<Author> {
    Ok(Author {
        id: row.try_get("author_id")?,
        name: row.try_get("author_name")?,
        avatar_url: row.try_get("author_avatar_url")?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let status: String = row.try_get("status")?;
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        excerpt: row.try_get("excerpt")?,
        author: author_from_row(row)?,
        tags: row.try_get("tags")?,
        cover_image: row.try_get("cover_image")?,
        status: PostStatus::from_db(&status),
        read_time: row.try_get("read_time")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author: author_from_row(row)?,
        content: row.try_get("content")?,
        parent_id: row.try_get("parent_id")?,
        is_edited: row.try_get("is_edited")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome<User>> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role, refresh_token_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.refresh_token_hash.as_deref())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(user_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&[u8]>) -> Result<bool> {
        let query = "UPDATE users SET refresh_token_hash = $2, updated_at = now() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to store refresh token hash")?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &[u8],
        next: &[u8],
    ) -> Result<bool> {
        let query = r"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = now()
            WHERE id = $1 AND refresh_token_hash = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(current)
            .bind(next)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to rotate refresh token hash")?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET name = COALESCE($2, name), bio = COALESCE($3, bio), \
             avatar_url = COALESCE($4, avatar_url), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.name.as_deref())
            .bind(update.bio.as_deref())
            .bind(update.avatar_url.as_deref())
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update profile")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to change role")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_authors(&self) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role IN ('author', 'admin') ORDER BY name"
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list authors")?;
        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create_post(&self, author_id: Uuid, draft: &PostDraft) -> Result<PostWrite> {
        let query = r"
            INSERT INTO posts
                (id, title, slug, content, excerpt, author_id, tags, cover_image, status,
                 read_time, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
        ";
        let inserted = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&draft.title)
            .bind(&draft.slug)
            .bind(&draft.content)
            .bind(&draft.excerpt)
            .bind(author_id)
            .bind(&draft.tags)
            .bind(&draft.cover_image)
            .bind(draft.status.as_str())
            .bind(draft.read_time)
            .bind(draft.published_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        let id: Uuid = match inserted {
            Ok(row) => row.try_get("id")?,
            Err(err) if is_unique_violation(&err) => return Ok(PostWrite::SlugTaken),
            Err(err) => return Err(err).context("failed to insert post"),
        };

        match self.find_post(id).await? {
            Some(post) => Ok(PostWrite::Stored(post)),
            None => Ok(PostWrite::Missing),
        }
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>> {
        let query = format!("{POST_SELECT} WHERE p.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup post")?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let query = format!("{POST_SELECT} WHERE p.slug = $1 AND p.status = 'published'");
        let row = sqlx::query(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup post by slug")?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_published(&self, query: &PostQuery) -> Result<Page<Post>> {
        let filter = r"
            WHERE p.status = 'published'
              AND ($1::text IS NULL OR $1 = ANY(p.tags))
              AND ($2::text IS NULL OR p.title ILIKE $2 OR p.content ILIKE $2 OR p.excerpt ILIKE $2)
        ";
        let pattern = query.search.as_deref().map(like_pattern);

        let count_query = format!("SELECT COUNT(*) AS total FROM posts p {filter}");
        let total: i64 = sqlx::query(&count_query)
            .bind(query.tag.as_deref())
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", &count_query))
            .await
            .context("failed to count posts")?
            .try_get("total")?;

        let list_query = format!(
            "{POST_SELECT} {filter} ORDER BY p.published_at DESC NULLS LAST, p.id DESC \
             LIMIT $3 OFFSET $4"
        );
        let offset = i64::try_from(query.offset()).context("page offset out of range")?;
        let rows = sqlx::query(&list_query)
            .bind(query.tag.as_deref())
            .bind(pattern.as_deref())
            .bind(i64::from(query.limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &list_query))
            .await
            .context("failed to list posts")?;

        Ok(Page {
            items: rows.iter().map(post_from_row).collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Post>> {
        let query = format!("{POST_SELECT} WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.id DESC");
        let rows = sqlx::query(&query)
            .bind(author_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list author posts")?;
        rows.iter().map(post_from_row).collect()
    }

    async fn save_post(&self, id: Uuid, draft: &PostDraft) -> Result<PostWrite> {
        let query = r"
            UPDATE posts
            SET title = $2, slug = $3, content = $4, excerpt = $5, tags = $6, cover_image = $7,
                status = $8, read_time = $9, published_at = $10, updated_at = now()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(&draft.title)
            .bind(&draft.slug)
            .bind(&draft.content)
            .bind(&draft.excerpt)
            .bind(&draft.tags)
            .bind(&draft.cover_image)
            .bind(draft.status.as_str())
            .bind(draft.read_time)
            .bind(draft.published_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(PostWrite::Missing),
            Ok(_) => match self.find_post(id).await? {
                Some(post) => Ok(PostWrite::Stored(post)),
                None => Ok(PostWrite::Missing),
            },
            Err(err) if is_unique_violation(&err) => Ok(PostWrite::SlugTaken),
            Err(err) => Err(err).context("failed to update post"),
        }
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM posts WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete post")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let query = r"
            INSERT INTO comments (id, post_id, author_id, content, parent_id)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let id = Uuid::now_v7();
        sqlx::query(query)
            .bind(id)
            .bind(comment.post_id)
            .bind(comment.author_id)
            .bind(&comment.content)
            .bind(comment.parent_id)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert comment")?;

        self.find_comment(id)
            .await?
            .context("inserted comment is not readable")
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        let query = format!("{COMMENT_SELECT} WHERE c.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup comment")?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn list_comments(&self, post_id: Uuid, parent_id: Option<Uuid>) -> Result<Vec<Comment>> {
        let query = format!(
            "{COMMENT_SELECT} WHERE c.post_id = $1 AND c.parent_id IS NOT DISTINCT FROM $2 \
             ORDER BY c.created_at DESC, c.id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(post_id)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list comments")?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn save_comment(&self, id: Uuid, content: &str) -> Result<Option<Comment>> {
        let query = r"
            UPDATE comments SET content = $2, is_edited = true, updated_at = now()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update comment")?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_comment(id).await
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool> {
        // Replies go with it through ON DELETE CASCADE on parent_id.
        let query = "DELETE FROM comments WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete comment")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
