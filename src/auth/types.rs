//! Authentication user types.

use crate::jwt::AccessClaims;

/// Authenticated user information extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Claims from the access token in effect for this request
    pub claims: AccessClaims,
    /// True when an expired access token was rotated during this request
    pub refreshed: bool,
}

impl AuthenticatedUser {
    pub fn username(&self) -> &str {
        &self.claims.sub
    }
}
