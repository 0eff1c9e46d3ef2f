//! Header parsing utilities for bearer authentication.

use axum::http::{HeaderMap, header};

/// Request header carrying the refresh token when an access token has expired.
pub const REFRESH_TOKEN_HEADER: &str = "refresh-token";

/// Response header carrying a rotated access token.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "new-access-token";

/// Response header carrying a rotated refresh token.
pub const NEW_REFRESH_TOKEN_HEADER: &str = "new-refresh-token";

/// Extract the token from an `Authorization: Bearer <token>` header.
/// The scheme is matched case-insensitively.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extract the refresh token header, ignoring blank values.
pub fn get_refresh_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(REFRESH_TOKEN_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}
