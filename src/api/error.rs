//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{error, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn internal_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            error!("{}: {}", msg, e);
            ApiError::internal(msg)
        })
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Unprocessable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Outcome block attached to every JSON body.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub code: u16,
    pub text: &'static str,
    pub timestamp: String,
}

impl StatusBody {
    pub fn new(code: StatusCode, text: &'static str) -> Self {
        Self {
            code: code.as_u16(),
            text,
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::OK, "success")
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
    status: StatusBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, text, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Missing parameters", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", msg),
        };
        let body = ErrorResponse {
            message,
            status: StatusBody::new(status, text),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                warn!(error = %rejection.body_text(), "Rejected request body");
                Err(json_rejection(rejection))
            }
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::bad_request("Expected a JSON request body.")
        }
        _ => ApiError::bad_request("Malformed JSON request body."),
    }
}

/// Trimmed, non-blank value of an optional field.
pub fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Generic 500 body for a handler that panicked.
pub fn panic_response() -> Response {
    ApiError::internal("An unexpected error occurred.").into_response()
}
