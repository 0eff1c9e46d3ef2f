//! Authentication module for JWT bearer tokens with refresh token rotation.
//!
//! Access tokens are short-lived HS256 JWTs sent as `Authorization: Bearer`.
//! Refresh tokens are opaque random strings stored as keyed hashes, one
//! active token per user, and are single-use.

mod bearer;
mod errors;
mod extractors;
mod ip;
mod password;
mod service;
mod state;
mod types;

pub use bearer::{
    NEW_ACCESS_TOKEN_HEADER, NEW_REFRESH_TOKEN_HEADER, REFRESH_TOKEN_HEADER, get_bearer_token,
};
pub use errors::{AuthError, AuthErrorKind, AuthRejection};
pub use extractors::{BearerAuth, attach_rotated_tokens};
pub use ip::{UNKNOWN_CLIENT, extract_client_ip};
pub use password::{hash_password, verify_password};
pub use service::{REFRESH_TOKEN_DURATION_SECS, TokenPair, TokenService};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
