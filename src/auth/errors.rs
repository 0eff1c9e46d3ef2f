//! Authentication error types.

use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::jwt::JwtError;

/// Failures inside the token service that are not a client's fault.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Jwt(#[from] JwtError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing error: {0}")]
    Password(bcrypt::BcryptError),
    #[error("refresh token key is unusable")]
    InvalidKey,
}

/// Internal auth error kind used by the bearer extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    InvalidToken,
    MissingRefreshToken,
    RefreshFailed,
}

/// Rejection returned by the bearer extractor. Always a 401.
#[derive(Debug)]
pub struct AuthRejection {
    pub(super) kind: AuthErrorKind,
}

impl AuthRejection {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated.",
            AuthErrorKind::InvalidToken => "Invalid or expired token.",
            AuthErrorKind::MissingRefreshToken => "Unauthorized: No refresh token provided.",
            AuthErrorKind::RefreshFailed => "Unauthorized: Invalid or expired refresh token.",
        }
    }
}

impl From<AuthErrorKind> for AuthRejection {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        ApiError::unauthorized(self.message()).into_response()
    }
}
