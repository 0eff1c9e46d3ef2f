//! Axum extractor and middleware for bearer authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};

use super::bearer::{
    NEW_ACCESS_TOKEN_HEADER, NEW_REFRESH_TOKEN_HEADER, get_bearer_token, get_refresh_token,
};
use super::errors::{AuthErrorKind, AuthRejection};
use super::service::TokenPair;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::jwt::JwtError;

tokio::task_local! {
    /// Task-local storage for a token pair issued while authenticating.
    /// Used to pass the pair from the extractor to the response middleware.
    pub static ROTATED_TOKENS: RefCell<Option<TokenPair>>;
}

/// Core authentication logic.
///
/// A valid access token passes. An expired one passes only if the request
/// also carries a refresh token and rotation succeeds; the new pair is left
/// in `ROTATED_TOKENS` for [`attach_rotated_tokens`].
async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let access_token = get_bearer_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;
    let tokens = state.tokens();

    match tokens.jwt().validate_access_token(access_token) {
        Ok(claims) => {
            return Ok(AuthenticatedUser {
                claims,
                refreshed: false,
            });
        }
        Err(JwtError::Expired) => {}
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            return Err(AuthErrorKind::InvalidToken);
        }
    }

    let refresh_token = get_refresh_token(&parts.headers).ok_or_else(|| {
        tracing::warn!("Expired access token without a refresh token");
        AuthErrorKind::MissingRefreshToken
    })?;

    let pair = tokens
        .refresh(access_token, refresh_token)
        .await
        .ok_or(AuthErrorKind::RefreshFailed)?;

    let claims = tokens
        .jwt()
        .validate_access_token(&pair.token)
        .map_err(|_| AuthErrorKind::InvalidToken)?;

    tracing::info!(username = %claims.sub, "Issued new token pair via refresh token");

    let _ = ROTATED_TOKENS.try_with(|cell| {
        cell.borrow_mut().replace(pair);
    });

    Ok(AuthenticatedUser {
        claims,
        refreshed: true,
    })
}

/// Extractor for endpoints that require a bearer access token.
pub struct BearerAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .await
            .map(BearerAuth)
            .map_err(AuthRejection::from)
    }
}

/// Middleware that scopes [`ROTATED_TOKENS`] for the request and, if the
/// extractor rotated the caller's tokens, exposes them as response headers.
pub async fn attach_rotated_tokens(request: Request, next: Next) -> Response {
    ROTATED_TOKENS
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;

            let rotated = ROTATED_TOKENS.with(|cell| cell.borrow_mut().take());
            if let Some(pair) = rotated {
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&pair.token) {
                    headers.insert(NEW_ACCESS_TOKEN_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&pair.refresh_token) {
                    headers.insert(NEW_REFRESH_TOKEN_HEADER, value);
                }
            }

            response
        })
        .await
}
