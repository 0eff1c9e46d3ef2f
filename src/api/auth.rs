//! Authentication API endpoints.
//!
//! - POST `/login` - Exchange username and password for a token pair
//! - POST `/refresh` - Exchange an expired access token and its refresh token for a new pair
//! - GET `/protected` - Probe that requires a bearer token

use axum::{Json, Router, extract::State, response::IntoResponse, routing::{get, post}};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, ResultExt, non_blank};
use crate::auth::{BearerAuth, TokenPair, TokenService};
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenService>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/protected", get(protected))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default, alias = "Username")]
    username: Option<String>,
    #[serde(default, alias = "Password")]
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default, alias = "Token")]
    token: Option<String>,
    #[serde(default, alias = "RefreshToken")]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    expiry: DateTime<Utc>,
    refresh_token: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token: pair.token,
            expiry: pair.expiry,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Verify credentials and issue a new token pair.
async fn login(
    State(state): State<AuthState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (Some(username), Some(password)) = (
        non_blank(&request.username),
        non_blank(&request.password),
    ) else {
        warn!("Login attempt failed: username or password missing");
        return Err(ApiError::unprocessable("Username and password are required."));
    };

    if !state.tokens.authenticate(username, password).await {
        warn!(username = %username, "Invalid login attempt");
        return Err(ApiError::unauthorized("Invalid credentials."));
    }

    let pair = state
        .tokens
        .issue(username)
        .await
        .internal_err("Failed to generate token.")?;

    info!(username = %username, "User successfully authenticated");
    Ok(Json(pair.into()))
}

/// Rotate a refresh token. Every failure gets the same message.
async fn refresh(
    State(state): State<AuthState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (Some(token), Some(refresh_token)) = (
        non_blank(&request.token),
        non_blank(&request.refresh_token),
    ) else {
        return Err(ApiError::bad_request("Token and refresh token are required."));
    };

    let pair = state
        .tokens
        .refresh(token, refresh_token)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token/refresh token."))?;

    Ok(Json(pair.into()))
}

async fn protected(BearerAuth(user): BearerAuth) -> impl IntoResponse {
    info!(username = %user.username(), refreshed = user.refreshed, "Protected endpoint accessed");
    "You have accessed a protected endpoint."
}
