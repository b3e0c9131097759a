//! Session/token authority.
//!
//! - [`token`]: signs and verifies access and refresh JWTs with separate keys.
//! - [`session`]: register, login, refresh rotation and logout over the user store.
//! - [`guard`]: per-request authentication ([`AuthUser`]) and role authorization.
//! - [`cookie`]: the `refreshToken` cookie.

pub mod cookie;
mod error;
pub mod guard;
pub mod password;
mod role;
pub mod session;
mod state;
pub mod token;

pub use error::AuthError;
pub use guard::{AuthUser, authenticate};
pub use role::{Role, UnknownRole};
pub use session::{Registration, Session, SessionAuthority, TokenPair};
pub use state::{AuthConfig, AuthState, DEFAULT_FRONTEND_BASE_URL};
pub use token::{Claims, TokenCodec, TokenError, TokenKind};
