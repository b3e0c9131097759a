//! # Scribe (Blog Publishing API)
//!
//! `scribe` serves a blog: readers browse published posts, authors write and
//! publish them, and signed-in users discuss them in threaded comments.
//!
//! ## Sessions
//!
//! Every write is gated by the session authority in [`auth`]:
//!
//! - **Access tokens** are short-lived HS256 JWTs sent as `Authorization: Bearer`.
//!   They are never stored; the role they carry is trusted until they expire.
//! - **Refresh tokens** are longer-lived JWTs signed with a separate key and
//!   delivered only in an `HttpOnly`, `SameSite=Strict` cookie. Only the SHA-256
//!   of the current refresh token is stored on the user row, so each user has a
//!   single refresh lineage: rotating or logging out invalidates every older token.
//!
//! ## Roles
//!
//! Users are `reader`, `author` or `admin`. Self-registration can never yield
//! `admin`; only an admin can promote another account.
//!
//! ## Storage
//!
//! Handlers talk to the [`store::Store`] trait. Postgres is used when a DSN is
//! configured, otherwise the process falls back to an in-memory store.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
