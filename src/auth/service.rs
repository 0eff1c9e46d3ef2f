//! Credential verification and the access/refresh token lifecycle.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::{error, info, warn};

use super::errors::AuthError;
use super::password::verify_password;
use crate::db::Database;
use crate::jwt::JwtConfig;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

/// Random bytes in a refresh token before encoding.
const REFRESH_TOKEN_BYTES: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// Domain label for the refresh token hashing key.
const REFRESH_KEY_LABEL: &[u8] = b"refresh-token-hash";

/// A freshly issued access token plus its refresh token.
/// The plaintext refresh token exists only here; the database keeps its hash.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub expiry: DateTime<Utc>,
    pub refresh_token: String,
}

/// Why a refresh attempt was turned down. Logged, never shown to clients.
#[derive(Debug, thiserror::Error)]
enum RefreshRejection {
    #[error("access token rejected: {0}")]
    AccessToken(crate::jwt::JwtError),
    #[error("no refresh token on record")]
    NoRecord,
    #[error("refresh token revoked or expired")]
    RevokedOrExpired,
    #[error("refresh token does not match")]
    Mismatch,
    #[error("refresh token already rotated")]
    AlreadyRotated,
    #[error(transparent)]
    Internal(#[from] AuthError),
}

impl From<sqlx::Error> for RefreshRejection {
    fn from(e: sqlx::Error) -> Self {
        Self::Internal(AuthError::Database(e))
    }
}

pub struct TokenService {
    db: Database,
    jwt: Arc<JwtConfig>,
    refresh_key: Vec<u8>,
}

impl TokenService {
    /// Refresh tokens are stored as HMACs under a key derived from `secret`,
    /// so the signing secret itself never hashes tokens.
    pub fn new(db: Database, jwt: Arc<JwtConfig>, secret: &[u8]) -> Result<Self, AuthError> {
        Ok(Self {
            db,
            jwt,
            refresh_key: derive_refresh_key(secret)?,
        })
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Check a username/password pair against the stored bcrypt hash.
    /// Lookup and verification errors are logged and count as a failed login.
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        let user = match self.db.users().get_by_username(username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!(username = %username, "Login for unknown user");
                return false;
            }
            Err(e) => {
                error!(username = %username, error = %e, "Failed to look up user");
                return false;
            }
        };

        let password = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&password, &user.password_hash))
                .await;

        match verified {
            Ok(Ok(matches)) => {
                info!(username = %username, success = matches, "User authentication finished");
                matches
            }
            Ok(Err(e)) => {
                error!(username = %username, error = %e, "Stored password hash is unusable");
                false
            }
            Err(e) => {
                error!(username = %username, error = %e, "Password verification task failed");
                false
            }
        }
    }

    /// Issue a new access token and refresh token for an authenticated user.
    /// Any previously active refresh token for the user is revoked.
    pub async fn issue(&self, username: &str) -> Result<TokenPair, AuthError> {
        let access = self.jwt.generate_access_token(username)?;
        let refresh_token = generate_refresh_token();
        let token_hash = self.hash_refresh_token(&refresh_token)?;

        self.db
            .refresh_tokens()
            .issue(username, &token_hash, refresh_expiry())
            .await?;

        info!(username = %username, "Issued token pair");

        Ok(TokenPair {
            token: access.token,
            expiry: access.expires_at,
            refresh_token,
        })
    }

    /// Exchange a (possibly expired) access token and its refresh token for a new pair.
    /// Returns `None` on any failure without saying which check failed.
    pub async fn refresh(&self, access_token: &str, refresh_token: &str) -> Option<TokenPair> {
        match self.try_refresh(access_token, refresh_token).await {
            Ok(pair) => Some(pair),
            Err(RefreshRejection::Internal(e)) => {
                error!(error = %e, "Token refresh failed");
                None
            }
            Err(reason) => {
                warn!(reason = %reason, "Token refresh rejected");
                None
            }
        }
    }

    async fn try_refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, RefreshRejection> {
        let claims = self
            .jwt
            .decode_ignoring_expiry(access_token)
            .map_err(RefreshRejection::AccessToken)?;
        let username = claims.sub;

        let record = self
            .db
            .refresh_tokens()
            .latest_for_user(&username)
            .await?
            .ok_or(RefreshRejection::NoRecord)?;

        if record.is_revoked || record.expires_at < Utc::now().timestamp() {
            return Err(RefreshRejection::RevokedOrExpired);
        }

        if !self.refresh_token_matches(refresh_token, &record.token_hash)? {
            return Err(RefreshRejection::Mismatch);
        }

        let access = self.jwt.generate_access_token(&username).map_err(AuthError::from)?;
        let new_refresh_token = generate_refresh_token();
        let new_hash = self.hash_refresh_token(&new_refresh_token)?;

        self.db
            .refresh_tokens()
            .rotate(record.id, &username, &new_hash, refresh_expiry())
            .await?
            .ok_or(RefreshRejection::AlreadyRotated)?;

        info!(username = %username, "Token refreshed");

        Ok(TokenPair {
            token: access.token,
            expiry: access.expires_at,
            refresh_token: new_refresh_token,
        })
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.refresh_key).map_err(|_| AuthError::InvalidKey)
    }

    /// HMAC-SHA-256 of a refresh token under the server key, base64 encoded.
    pub(crate) fn hash_refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of a presented token against a stored hash.
    fn refresh_token_matches(&self, token: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let Ok(expected) = STANDARD.decode(stored_hash) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

fn derive_refresh_key(secret: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::InvalidKey)?;
    mac.update(REFRESH_KEY_LABEL);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// 64 bytes from the thread-local CSPRNG, base64url without padding.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn refresh_expiry() -> i64 {
    Utc::now().timestamp() + REFRESH_TOKEN_DURATION_SECS
}
