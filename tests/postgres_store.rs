//! Runs against a real database only when `SCRIBE_TEST_DSN` is set.

use anyhow::{Context, Result};
use scribe::{
    auth::Role,
    store::{
        CommentStore, CreateOutcome, NewComment, NewUser, PgStore, PostDraft, PostStatus,
        PostStore, PostWrite, ProfileUpdate, Store, UserStore,
    },
};
use uuid::Uuid;

async fn store() -> Result<Option<PgStore>> {
    let Ok(dsn) = std::env::var("SCRIBE_TEST_DSN") else {
        return Ok(None);
    };
    Ok(Some(PgStore::connect(&dsn).await?))
}

fn new_user(role: Role) -> NewUser {
    let id = Uuid::new_v4();
    NewUser {
        id,
        name: format!("user-{id}"),
        email: format!("{id}@scribe.test"),
        password_hash: "hash".to_string(),
        role,
        refresh_token_hash: None,
    }
}

fn draft(title: &str, slug: &str) -> PostDraft {
    PostDraft {
        title: title.to_string(),
        slug: slug.to_string(),
        content: "Some content".to_string(),
        excerpt: "Some content".to_string(),
        tags: vec!["pg".to_string()],
        cover_image: String::new(),
        status: PostStatus::Published,
        read_time: 1,
        published_at: Some(chrono::Utc::now()),
    }
}

#[tokio::test]
async fn users_round_trip_and_conflict() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    store.ping().await?;

    let payload = new_user(Role::Author);
    let CreateOutcome::Created(user) = store.create(payload.clone()).await? else {
        anyhow::bail!("first insert should succeed");
    };
    assert!(matches!(
        store
            .create(NewUser {
                id: Uuid::new_v4(),
                ..payload
            })
            .await?,
        CreateOutcome::Conflict
    ));

    assert!(store.set_refresh_token_hash(user.id, Some(&[1, 2, 3][..])).await?);
    let updated = store
        .update_profile(
            user.id,
            &ProfileUpdate {
                bio: Some("bio".to_string()),
                ..ProfileUpdate::default()
            },
        )
        .await?
        .context("profile update")?;
    assert_eq!(updated.name, user.name);
    assert_eq!(updated.refresh_token_hash, Some(vec![1, 2, 3]));

    assert!(!store.rotate_refresh_token_hash(user.id, &[9], &[4]).await?);
    assert!(store.rotate_refresh_token_hash(user.id, &[1, 2, 3], &[4]).await?);
    assert!(store.set_refresh_token_hash(user.id, None).await?);
    assert!(!store.rotate_refresh_token_hash(user.id, &[4], &[5]).await?);

    let loaded = store
        .find_by_email(&user.email)
        .await?
        .context("user by email")?;
    assert_eq!(loaded.refresh_token_hash, None);
    assert_eq!(loaded.bio, "bio");
    let demoted = store
        .set_role(user.id, Role::Reader)
        .await?
        .context("role change")?;
    assert_eq!(demoted.bio, "bio");
    assert!(
        store
            .list_authors()
            .await?
            .iter()
            .all(|author| author.id != user.id)
    );
    Ok(())
}

#[tokio::test]
async fn posts_and_comments_cascade() -> Result<()> {
    let Some(store) = store().await? else {
        return Ok(());
    };
    let CreateOutcome::Created(author) = store.create(new_user(Role::Author)).await? else {
        anyhow::bail!("author insert should succeed");
    };

    let slug = format!("pg-{}", Uuid::new_v4());
    let PostWrite::Stored(post) = store.create_post(author.id, &draft("Pg", &slug)).await? else {
        anyhow::bail!("post insert should succeed");
    };
    assert!(matches!(
        store.create_post(author.id, &draft("Pg", &slug)).await?,
        PostWrite::SlugTaken
    ));
    assert_eq!(
        store
            .find_published_by_slug(&slug)
            .await?
            .map(|found| found.id),
        Some(post.id)
    );

    let root = store
        .create_comment(NewComment {
            post_id: post.id,
            author_id: author.id,
            content: "root".to_string(),
            parent_id: None,
        })
        .await?;
    let reply = store
        .create_comment(NewComment {
            post_id: post.id,
            author_id: author.id,
            content: "reply".to_string(),
            parent_id: Some(root.id),
        })
        .await?;
    assert_eq!(store.list_comments(post.id, Some(root.id)).await?.len(), 1);

    let edited = store
        .save_comment(root.id, "root!")
        .await?
        .context("comment exists")?;
    assert!(edited.is_edited);

    assert!(store.delete_post(post.id).await?);
    assert!(store.find_comment(reply.id).await?.is_none());
    assert!(store.find_post(post.id).await?.is_none());
    Ok(())
}
