//! Auth configuration and the state shared with handlers.

use super::{SessionAuthority, TokenCodec, TokenError};
use crate::store::Store;
use secrecy::SecretString;
use std::sync::Arc;

use super::token::{DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS};

pub const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:5173";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub const fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    sessions: SessionAuthority,
}

impl AuthState {
    /// # Errors
    /// Returns an error if a secret is empty or both secrets are equal.
    pub fn new(
        config: AuthConfig,
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        store: Arc<dyn Store>,
    ) -> Result<Self, TokenError> {
        let codec = TokenCodec::new(access_secret, refresh_secret)?
            .with_access_ttl_seconds(config.access_ttl_seconds())
            .with_refresh_ttl_seconds(config.refresh_ttl_seconds());
        Ok(Self {
            config,
            sessions: SessionAuthority::new(store, codec),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionAuthority {
        &self.sessions
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        self.sessions.codec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_token_lifetimes() {
        let config = AuthConfig::default();
        assert_eq!(config.frontend_base_url(), "http://localhost:5173");
        assert_eq!(config.access_ttl_seconds(), 900);
        assert_eq!(config.refresh_ttl_seconds(), 604_800);
        assert!(!config.refresh_cookie_secure());
    }

    #[test]
    fn https_frontend_enables_secure_cookie() {
        let config = AuthConfig::new("https://blog.example.com".to_string());
        assert!(config.refresh_cookie_secure());
    }
}
