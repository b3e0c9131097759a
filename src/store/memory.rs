//! In-process store used by tests and when no database is configured.

use super::{
    Author, Comment, CommentStore, CreateOutcome, NewComment, NewUser, Page, Post, PostDraft,
    PostQuery, PostStatus, PostStore, PostWrite, ProfileUpdate, Store, User, UserStore,
};
use crate::auth::Role;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    draft: PostDraft,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    content: String,
    parent_id: Option<Uuid>,
    is_edited: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    posts: HashMap<Uuid, PostRow>,
    comments: HashMap<Uuid, CommentRow>,
}

/// All writes take the single write lock, so each one is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn author(&self, id: Uuid) -> Author {
        self.users.get(&id).map_or_else(
            || Author {
                id,
                name: String::new(),
                avatar_url: String::new(),
            },
            |user| Author {
                id: user.id,
                name: user.name.clone(),
                avatar_url: user.avatar_url.clone(),
            },
        )
    }

    fn post(&self, row: &PostRow) -> Post {
        Post {
            id: row.id,
            title: row.draft.title.clone(),
            slug: row.draft.slug.clone(),
            content: row.draft.content.clone(),
            excerpt: row.draft.excerpt.clone(),
            author: self.author(row.author_id),
            tags: row.draft.tags.clone(),
            cover_image: row.draft.cover_image.clone(),
            status: row.draft.status,
            read_time: row.draft.read_time,
            published_at: row.draft.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            post_id: row.post_id,
            author: self.author(row.author_id),
            content: row.content.clone(),
            parent_id: row.parent_id,
            is_edited: row.is_edited,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> bool {
        self.posts
            .values()
            .any(|row| row.draft.slug == slug && Some(row.id) != except)
    }

    /// Collects `root` and every transitive reply below it.
    fn comment_subtree(&self, root: Uuid) -> Vec<Uuid> {
        let mut ids = vec![root];
        let mut index = 0;
        while let Some(&current) = ids.get(index) {
            ids.extend(
                self.comments
                    .values()
                    .filter(|row| row.parent_id == Some(current))
                    .map(|row| row.id),
            );
            index += 1;
        }
        ids
    }
}

fn matches_query(draft: &PostDraft, query: &PostQuery) -> bool {
    if draft.status != PostStatus::Published {
        return false;
    }
    if let Some(tag) = &query.tag
        && !draft.tags.iter().any(|t| t == tag)
    {
        return false;
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        return [&draft.title, &draft.content, &draft.excerpt]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
    }
    true
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome<User>> {
        let mut inner = self.inner.write().await;
        if inner.users.contains_key(&user.id)
            || inner.users.values().any(|u| u.email == user.email)
        {
            return Ok(CreateOutcome::Conflict);
        }
        let now = Utc::now();
        let stored = User {
            id: user.id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            bio: String::new(),
            avatar_url: String::new(),
            refresh_token_hash: user.refresh_token_hash,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(CreateOutcome::Created(stored))
    }

    async fn set_refresh_token_hash(&self, id: Uuid, hash: Option<&[u8]>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        user.refresh_token_hash = hash.map(<[u8]>::to_vec);
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn rotate_refresh_token_hash(
        &self,
        id: Uuid,
        current: &[u8],
        next: &[u8],
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.refresh_token_hash.as_deref() != Some(current) {
            return Ok(false);
        }
        user.refresh_token_hash = Some(next.to_vec());
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            user.name.clone_from(name);
        }
        if let Some(bio) = &update.bio {
            user.bio.clone_from(bio);
        }
        if let Some(avatar_url) = &update.avatar_url {
            user.avatar_url.clone_from(avatar_url);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        user.role = role;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn list_authors(&self) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        let mut authors: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.role.can_publish())
            .cloned()
            .collect();
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(authors)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, author_id: Uuid, draft: &PostDraft) -> Result<PostWrite> {
        let mut inner = self.inner.write().await;
        if inner.slug_taken(&draft.slug, None) {
            return Ok(PostWrite::SlugTaken);
        }
        let now = Utc::now();
        let row = PostRow {
            id: Uuid::now_v7(),
            author_id,
            draft: draft.clone(),
            created_at: now,
            updated_at: now,
        };
        let post = inner.post(&row);
        inner.posts.insert(row.id, row);
        Ok(PostWrite::Stored(post))
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>> {
        let inner = self.inner.read().await;
        Ok(inner.posts.get(&id).map(|row| inner.post(row)))
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let inner = self.inner.read().await;
        Ok(inner
            .posts
            .values()
            .find(|row| row.draft.slug == slug && row.draft.status == PostStatus::Published)
            .map(|row| inner.post(row)))
    }

    async fn list_published(&self, query: &PostQuery) -> Result<Page<Post>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&PostRow> = inner
            .posts
            .values()
            .filter(|row| matches_query(&row.draft, query))
            .collect();
        rows.sort_by(|a, b| {
            (b.draft.published_at, b.id).cmp(&(a.draft.published_at, a.id))
        });
        let total = rows.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = rows
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .map(|row| inner.post(row))
            .collect();
        Ok(Page { items, total })
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Post>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&PostRow> = inner
            .posts
            .values()
            .filter(|row| row.author_id == author_id)
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows.into_iter().map(|row| inner.post(row)).collect())
    }

    async fn save_post(&self, id: Uuid, draft: &PostDraft) -> Result<PostWrite> {
        let mut inner = self.inner.write().await;
        if !inner.posts.contains_key(&id) {
            return Ok(PostWrite::Missing);
        }
        if inner.slug_taken(&draft.slug, Some(id)) {
            return Ok(PostWrite::SlugTaken);
        }
        let Some(row) = inner.posts.get_mut(&id) else {
            return Ok(PostWrite::Missing);
        };
        row.draft = draft.clone();
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(PostWrite::Stored(inner.post(&row)))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.posts.remove(&id).is_none() {
            return Ok(false);
        }
        inner.comments.retain(|_, row| row.post_id != id);
        Ok(true)
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let row = CommentRow {
            id: Uuid::now_v7(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            content: comment.content,
            parent_id: comment.parent_id,
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        let created = inner.comment(&row);
        inner.comments.insert(row.id, row);
        Ok(created)
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        let inner = self.inner.read().await;
        Ok(inner.comments.get(&id).map(|row| inner.comment(row)))
    }

    async fn list_comments(&self, post_id: Uuid, parent_id: Option<Uuid>) -> Result<Vec<Comment>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&CommentRow> = inner
            .comments
            .values()
            .filter(|row| row.post_id == post_id && row.parent_id == parent_id)
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows.into_iter().map(|row| inner.comment(row)).collect())
    }

    async fn save_comment(&self, id: Uuid, content: &str) -> Result<Option<Comment>> {
        let mut inner = self.inner.write().await;
        let Some(row) = inner.comments.get_mut(&id) else {
            return Ok(None);
        };
        row.content = content.to_string();
        row.is_edited = true;
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(Some(inner.comment(&row)))
    }

    async fn delete_comment(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.comments.contains_key(&id) {
            return Ok(false);
        }
        for doomed in inner.comment_subtree(id) {
            inner.comments.remove(&doomed);
        }
        Ok(true)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            refresh_token_hash: None,
        }
    }

    fn draft(slug: &str, status: PostStatus, tags: &[&str]) -> PostDraft {
        PostDraft {
            title: slug.replace('-', " "),
            slug: slug.to_string(),
            content: format!("content about {slug}"),
            excerpt: String::new(),
            tags: tags.iter().map(ToString::to_string).collect(),
            cover_image: String::new(),
            status,
            read_time: 1,
            published_at: (status == PostStatus::Published).then(Utc::now),
        }
    }

    async fn author(store: &MemoryStore) -> anyhow::Result<User> {
        match store.create(new_user("writer@example.com", Role::Author)).await? {
            CreateOutcome::Created(user) => Ok(user),
            CreateOutcome::Conflict => anyhow::bail!("unexpected conflict"),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create(new_user("ana@x.com", Role::Reader)).await?,
            CreateOutcome::Created(_)
        ));
        assert!(matches!(
            store.create(new_user("ana@x.com", Role::Reader)).await?,
            CreateOutcome::Conflict
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_hash_writes_touch_only_that_column() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let user = author(&store).await?;
        assert!(store.set_refresh_token_hash(user.id, Some(&[1, 2, 3][..])).await?);

        assert!(!store.rotate_refresh_token_hash(user.id, &[9], &[4]).await?);
        assert!(store.rotate_refresh_token_hash(user.id, &[1, 2, 3], &[4]).await?);
        let stored = store.find_by_id(user.id).await?;
        assert_eq!(stored.and_then(|u| u.refresh_token_hash), Some(vec![4]));

        assert!(store.set_refresh_token_hash(user.id, None).await?);
        assert!(!store.rotate_refresh_token_hash(user.id, &[4], &[5]).await?);
        assert!(!store.set_refresh_token_hash(Uuid::new_v4(), None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn profile_and_role_updates_keep_refresh_hash() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let user = author(&store).await?;
        store.set_refresh_token_hash(user.id, Some(&[7][..])).await?;

        let update = ProfileUpdate {
            bio: Some("hello".to_string()),
            ..ProfileUpdate::default()
        };
        let Some(updated) = store.update_profile(user.id, &update).await? else {
            anyhow::bail!("user missing");
        };
        assert_eq!(updated.bio, "hello");
        assert_eq!(updated.name, user.name);
        assert_eq!(updated.refresh_token_hash, Some(vec![7]));

        let Some(promoted) = store.set_role(user.id, Role::Admin).await? else {
            anyhow::bail!("user missing");
        };
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(promoted.bio, "hello");
        assert_eq!(promoted.refresh_token_hash, Some(vec![7]));

        assert!(store.set_role(Uuid::new_v4(), Role::Reader).await?.is_none());
        assert!(store.update_profile(Uuid::new_v4(), &update).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn list_authors_excludes_readers() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.create(new_user("zed@x.com", Role::Admin)).await?;
        store.create(new_user("amy@x.com", Role::Author)).await?;
        store.create(new_user("bob@x.com", Role::Reader)).await?;
        let names: Vec<String> = store
            .list_authors()
            .await?
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["amy".to_string(), "zed".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn published_listing_filters_and_paginates() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let writer = author(&store).await?;
        store
            .create_post(writer.id, &draft("rust-intro", PostStatus::Published, &["rust"]))
            .await?;
        store
            .create_post(writer.id, &draft("go-intro", PostStatus::Published, &["go"]))
            .await?;
        store
            .create_post(writer.id, &draft("secret-draft", PostStatus::Draft, &["rust"]))
            .await?;

        let all = store
            .list_published(&PostQuery {
                page: 1,
                limit: 10,
                ..PostQuery::default()
            })
            .await?;
        assert_eq!(all.total, 2);

        let tagged = store
            .list_published(&PostQuery {
                page: 1,
                limit: 10,
                tag: Some("rust".to_string()),
                search: None,
            })
            .await?;
        assert_eq!(tagged.total, 1);
        assert_eq!(tagged.items[0].slug, "rust-intro");

        let searched = store
            .list_published(&PostQuery {
                page: 1,
                limit: 10,
                tag: None,
                search: Some("GO INTRO".to_string()),
            })
            .await?;
        assert_eq!(searched.total, 1);

        let second_page = store
            .list_published(&PostQuery {
                page: 2,
                limit: 1,
                ..PostQuery::default()
            })
            .await?;
        assert_eq!(second_page.total, 2);
        assert_eq!(second_page.items.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn slugs_are_unique() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let writer = author(&store).await?;
        let first = draft("hello", PostStatus::Draft, &[]);
        let PostWrite::Stored(post) = store.create_post(writer.id, &first).await? else {
            anyhow::bail!("expected stored post");
        };
        assert!(matches!(
            store.create_post(writer.id, &first).await?,
            PostWrite::SlugTaken
        ));
        // Saving a post under its own slug is not a conflict.
        assert!(matches!(
            store.save_post(post.id, &first).await?,
            PostWrite::Stored(_)
        ));
        assert!(matches!(
            store.save_post(Uuid::new_v4(), &first).await?,
            PostWrite::Missing
        ));
        Ok(())
    }

    #[tokio::test]
    async fn deleting_comment_removes_replies() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let writer = author(&store).await?;
        let PostWrite::Stored(post) = store
            .create_post(writer.id, &draft("threads", PostStatus::Published, &[]))
            .await?
        else {
            anyhow::bail!("expected stored post");
        };
        let root = store
            .create_comment(NewComment {
                post_id: post.id,
                author_id: writer.id,
                content: "root".to_string(),
                parent_id: None,
            })
            .await?;
        let reply = store
            .create_comment(NewComment {
                post_id: post.id,
                author_id: writer.id,
                content: "reply".to_string(),
                parent_id: Some(root.id),
            })
            .await?;
        assert_eq!(store.list_comments(post.id, Some(root.id)).await?.len(), 1);

        assert!(store.delete_comment(root.id).await?);
        assert!(store.find_comment(reply.id).await?.is_none());
        assert!(!store.delete_comment(root.id).await?);
        Ok(())
    }
}
