//! JWT access token generation and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access token duration: 30 minutes
pub const ACCESS_TOKEN_DURATION_SECS: i64 = 30 * 60;

/// JWT claims for access tokens. The username is the only identity claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Generate a signed HS256 access token for a user.
    pub fn generate_access_token(&self, username: &str) -> Result<AccessTokenResult, JwtError> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ACCESS_TOKEN_DURATION_SECS);

        let claims = AccessClaims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult { token, expires_at })
    }

    /// Validate and decode an access token, including its expiry.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        self.decode(token, &validation)
    }

    /// Validate an access token's signature and algorithm while ignoring `exp`.
    /// Used when exchanging an expired access token for a new pair.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        self.decode(token, &validation)
    }

    fn decode(&self, token: &str, validation: &Validation) -> Result<AccessClaims, JwtError> {
        let token_data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Decoding(e),
            })?;

        if token_data.claims.sub.is_empty() {
            return Err(JwtError::MissingSubject);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token (bad signature, malformed, wrong algorithm)
    Decoding(jsonwebtoken::errors::Error),
    /// Signature is fine but the token is past its expiry
    Expired,
    /// Token carries no username
    MissingSubject,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::MissingSubject => write!(f, "Token has no subject"),
        }
    }
}

impl std::error::Error for JwtError {}
