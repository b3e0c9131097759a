//! Session authority: register, login, refresh rotation and logout.
//!
//! Each user has at most one live refresh token. Its SHA-256 is stored on the
//! user row and every issue overwrites it, so rotation and logout revoke older
//! tokens without a blocklist. Sessions write only that column, and a refresh
//! swaps it conditionally on the presented digest, so of two concurrent
//! refreshes (or a refresh racing a logout) exactly one wins.

use super::{AuthError, Role, TokenCodec, TokenError, TokenKind, password};
use crate::store::{CreateOutcome, NewUser, Store, User};
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Input for [`SessionAuthority::register`]; validated by the caller.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

/// Freshly minted access and refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of register/login: the stored user plus its new token pair.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Only the hash is stored; raw refresh tokens never reach the store.
pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub struct SessionAuthority {
    store: Arc<dyn Store>,
    codec: TokenCodec,
}

impl std::fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl SessionAuthority {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    #[must_use]
    pub const fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn issue_pair(&self, user_id: Uuid, role: Role) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.codec.issue(user_id, role, TokenKind::Access)?,
            refresh_token: self.codec.issue(user_id, role, TokenKind::Refresh)?,
        })
    }

    /// Issue a new pair for `user` and make its refresh token the only valid one.
    /// Only the refresh digest is written. Returns `None` if the user row vanished.
    async fn rotate(&self, mut user: User) -> Result<Option<Session>, AuthError> {
        let tokens = self.issue_pair(user.id, user.role)?;
        let digest = hash_refresh_token(&tokens.refresh_token);
        if !self
            .store
            .set_refresh_token_hash(user.id, Some(&digest))
            .await?
        {
            return Ok(None);
        }
        user.refresh_token_hash = Some(digest);
        Ok(Some(Session { user, tokens }))
    }

    /// Create an account and open its first session.
    ///
    /// # Errors
    /// [`AuthError::DuplicateEmail`] if the email is taken (case-insensitively),
    /// [`AuthError::Internal`] for store or hashing failures.
    #[instrument(skip_all)]
    pub async fn register(&self, registration: Registration) -> Result<Session, AuthError> {
        let email = normalize_email(&registration.email);
        if self.store.find_by_email(&email).await?.is_some() {
            debug!("registration rejected: email already present");
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = password::hash_password(&registration.password)?;
        let role = Role::for_registration(registration.role);
        let id = Uuid::now_v7();
        let tokens = self.issue_pair(id, role)?;

        let new_user = NewUser {
            id,
            name: registration.name.trim().to_string(),
            email,
            password_hash,
            role,
            refresh_token_hash: Some(hash_refresh_token(&tokens.refresh_token)),
        };

        match self.store.create(new_user).await? {
            CreateOutcome::Created(user) => {
                info!(user_id = %user.id, role = %user.role, "user registered");
                Ok(Session { user, tokens })
            }
            // Lost a race against a concurrent registration for the same email.
            CreateOutcome::Conflict => Err(AuthError::DuplicateEmail),
        }
    }

    /// Authenticate with email and password, rotating the refresh token.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredentials`] for an unknown email or wrong password alike.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            password::burn_verification(password);
            debug!("login rejected: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &user.password_hash)
            .context("stored password hash is unreadable")?
        {
            debug!(user_id = %user.id, "login rejected: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = user.id;
        let session = self
            .rotate(user)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        info!(user_id = %user_id, "user logged in");
        Ok(session)
    }

    /// Exchange the current refresh token for a new pair.
    ///
    /// # Errors
    /// [`AuthError::MissingToken`] without a token, [`AuthError::RefreshExpired`] or
    /// [`AuthError::InvalidRefresh`] if verification fails, and
    /// [`AuthError::RefreshRevoked`] if the token is not the one currently stored.
    #[instrument(skip_all)]
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, AuthError> {
        let token = presented
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self
            .codec
            .verify(token, TokenKind::Refresh)
            .map_err(|err| match err {
                TokenError::Expired => AuthError::RefreshExpired,
                _ => AuthError::InvalidRefresh,
            })
            .inspect_err(|err| debug!("refresh rejected: {err}"))?;

        let Some(user) = self.store.find_by_id(claims.sub).await? else {
            debug!(user_id = %claims.sub, "refresh rejected: user no longer exists");
            return Err(AuthError::RefreshRevoked);
        };

        let presented_digest = hash_refresh_token(token);
        if user.refresh_token_hash.as_deref() != Some(presented_digest.as_slice()) {
            debug!(user_id = %user.id, "refresh rejected: token superseded");
            return Err(AuthError::RefreshRevoked);
        }

        // Role comes from the store, so a role change applies from the next refresh on.
        let tokens = self.issue_pair(user.id, user.role)?;
        let next_digest = hash_refresh_token(&tokens.refresh_token);

        // A logout or another refresh may have landed since the read above.
        if !self
            .store
            .rotate_refresh_token_hash(user.id, &presented_digest, &next_digest)
            .await?
        {
            debug!(user_id = %user.id, "refresh rejected: token replaced concurrently");
            return Err(AuthError::RefreshRevoked);
        }
        info!(user_id = %user.id, "refresh token rotated");
        Ok(tokens)
    }

    /// Revoke the user's refresh lineage. Calling it again is a no-op.
    ///
    /// # Errors
    /// [`AuthError::Internal`] if the store fails.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        if !self.store.set_refresh_token_hash(user_id, None).await? {
            debug!(user_id = %user_id, "logout for a user that no longer exists");
            return Ok(());
        }
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    /// # Errors
    /// [`AuthError::NotFound`] if the user does not exist.
    pub async fn profile(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ProfileUpdate, UserStore};
    use anyhow::{Result, bail};
    use secrecy::SecretString;

    fn codec() -> Result<TokenCodec> {
        Ok(TokenCodec::new(
            &SecretString::from("session-access-secret"),
            &SecretString::from("session-refresh-secret"),
        )?)
    }

    fn authority() -> Result<(SessionAuthority, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        Ok((SessionAuthority::new(store.clone(), codec()?), store))
    }

    fn ana(role: Option<Role>) -> Registration {
        Registration {
            name: "Ana".to_string(),
            email: "ana@x.com".to_string(),
            password: "secret1".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn register_issues_tokens_and_stores_refresh_hash() -> Result<()> {
        let (authority, store) = authority()?;
        let session = authority.register(ana(None)).await?;
        assert_eq!(session.user.role, Role::Reader);
        assert_ne!(session.user.password_hash, "secret1");

        let claims = authority
            .codec()
            .verify(&session.tokens.access_token, TokenKind::Access)?;
        assert_eq!(claims.sub, session.user.id);

        let stored = store.find_by_id(session.user.id).await?;
        assert_eq!(
            stored.and_then(|u| u.refresh_token_hash),
            Some(hash_refresh_token(&session.tokens.refresh_token))
        );
        Ok(())
    }

    #[tokio::test]
    async fn register_downgrades_admin_and_keeps_author() -> Result<()> {
        let (authority, _) = authority()?;
        let admin = authority.register(ana(Some(Role::Admin))).await?;
        assert_eq!(admin.user.role, Role::Reader);

        let mut bob = ana(Some(Role::Author));
        bob.email = "bob@x.com".to_string();
        assert_eq!(authority.register(bob).await?.user.role, Role::Author);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_case_insensitively() -> Result<()> {
        let (authority, _) = authority()?;
        authority.register(ana(None)).await?;
        let mut again = ana(None);
        again.email = "  ANA@X.com ".to_string();
        assert!(matches!(
            authority.register(again).await,
            Err(AuthError::DuplicateEmail)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_checks_password_without_revealing_which_part_failed() -> Result<()> {
        let (authority, _) = authority()?;
        authority.register(ana(Some(Role::Author))).await?;

        let wrong_password = authority.login("ana@x.com", "nope").await;
        let unknown_email = authority.login("nobody@x.com", "secret1").await;
        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(AuthError::InvalidCredentials)));

        let session = authority.login("Ana@X.com", "secret1").await?;
        assert_eq!(session.user.role, Role::Author);
        Ok(())
    }

    #[tokio::test]
    async fn login_supersedes_previous_refresh_token() -> Result<()> {
        let (authority, _) = authority()?;
        let first = authority.register(ana(None)).await?;
        authority.login("ana@x.com", "secret1").await?;
        assert!(matches!(
            authority.refresh(Some(&first.tokens.refresh_token)).await,
            Err(AuthError::RefreshRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rotates_and_revokes_prior_token() -> Result<()> {
        let (authority, _) = authority()?;
        let session = authority.register(ana(None)).await?;
        let old = session.tokens.refresh_token;

        let rotated = authority.refresh(Some(&old)).await?;
        assert_ne!(rotated.refresh_token, old);
        authority
            .codec()
            .verify(&rotated.access_token, TokenKind::Access)?;

        assert!(matches!(
            authority.refresh(Some(&old)).await,
            Err(AuthError::RefreshRevoked)
        ));
        // The rotated token keeps working, indefinitely.
        let again = authority.refresh(Some(&rotated.refresh_token)).await?;
        authority.refresh(Some(&again.refresh_token)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn refresh_distinguishes_failure_kinds() -> Result<()> {
        let (authority, _) = authority()?;
        let session = authority.register(ana(None)).await?;

        assert!(matches!(
            authority.refresh(None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            authority.refresh(Some("")).await,
            Err(AuthError::MissingToken)
        ));
        // An access token is signed with the other key.
        assert!(matches!(
            authority.refresh(Some(&session.tokens.access_token)).await,
            Err(AuthError::InvalidRefresh)
        ));

        let expired = codec()?
            .with_refresh_ttl_seconds(-10)
            .issue(session.user.id, Role::Reader, TokenKind::Refresh)?;
        assert!(matches!(
            authority.refresh(Some(&expired)).await,
            Err(AuthError::RefreshExpired)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_picks_up_stored_role() -> Result<()> {
        let (authority, store) = authority()?;
        let session = authority.register(ana(None)).await?;
        if store.set_role(session.user.id, Role::Author).await?.is_none() {
            bail!("user missing");
        }

        let rotated = authority
            .refresh(Some(&session.tokens.refresh_token))
            .await?;
        let claims = authority
            .codec()
            .verify(&rotated.access_token, TokenKind::Access)?;
        assert_eq!(claims.role, Role::Author);
        Ok(())
    }

    #[tokio::test]
    async fn logout_revokes_and_is_idempotent() -> Result<()> {
        let (authority, _) = authority()?;
        let session = authority.register(ana(None)).await?;

        authority.logout(session.user.id).await?;
        authority.logout(session.user.id).await?;
        authority.logout(Uuid::new_v4()).await?;

        assert!(matches!(
            authority.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::RefreshRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stale_profile_write_cannot_restore_revoked_token() -> Result<()> {
        let (authority, store) = authority()?;
        let session = authority.register(ana(None)).await?;
        let Some(before_logout) = store.find_by_id(session.user.id).await? else {
            bail!("user missing");
        };

        authority.logout(session.user.id).await?;
        let update = ProfileUpdate {
            bio: Some(format!("{} and more", before_logout.bio)),
            ..ProfileUpdate::default()
        };
        store.update_profile(session.user.id, &update).await?;
        store.set_role(session.user.id, before_logout.role).await?;

        assert!(matches!(
            authority.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::RefreshRevoked)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_loses_to_logout_between_read_and_write() -> Result<()> {
        let (authority, store) = authority()?;
        let session = authority.register(ana(None)).await?;
        let presented = hash_refresh_token(&session.tokens.refresh_token);

        authority.logout(session.user.id).await?;
        assert!(
            !store
                .rotate_refresh_token_hash(session.user.id, &presented, &[1, 2, 3])
                .await?
        );
        let stored = store.find_by_id(session.user.id).await?;
        assert_eq!(stored.and_then(|u| u.refresh_token_hash), None);
        Ok(())
    }

    #[tokio::test]
    async fn profile_reports_missing_user() -> Result<()> {
        let (authority, _) = authority()?;
        let session = authority.register(ana(None)).await?;
        assert_eq!(authority.profile(session.user.id).await?.email, "ana@x.com");
        assert!(matches!(
            authority.profile(Uuid::new_v4()).await,
            Err(AuthError::NotFound)
        ));
        Ok(())
    }
}
