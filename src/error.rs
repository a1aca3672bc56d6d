/// Unified error types for the CloudPocket server
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum PocketError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Session replaced by a newer login
    #[error("Session is no longer active")]
    SessionSuperseded,

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("{0}")]
    Validation(String),

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Conflict errors (e.g., phone already registered)
    #[error("{0}")]
    Conflict(String),

    /// Too many failed logins for this phone
    #[error("{message}")]
    LockedOut {
        retry_after: std::time::Duration,
        message: String,
    },

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Blob storage errors
    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    /// Email delivery errors
    #[error("Email error: {0}")]
    Email(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl PocketError {
    /// HTTP status and machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            PocketError::Authentication(_) | PocketError::Jwt(_) => {
                (StatusCode::UNAUTHORIZED, "AuthenticationRequired")
            }
            PocketError::SessionSuperseded => (StatusCode::UNAUTHORIZED, "SessionSuperseded"),
            PocketError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            PocketError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            PocketError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            PocketError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            PocketError::LockedOut { .. } => (StatusCode::TOO_MANY_REQUESTS, "LockedOut"),
            PocketError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded")
            }
            PocketError::BlobStorage(_) => (StatusCode::BAD_GATEWAY, "UploadFailed"),
            PocketError::Email(_) => (StatusCode::INTERNAL_SERVER_ERROR, "EmailFailed"),
            PocketError::Database(_) | PocketError::Internal(_) | PocketError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
        }
    }
}

/// Convert PocketError to HTTP response
impl IntoResponse for PocketError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let message = match &self {
            PocketError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            PocketError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            PocketError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let retry_after = match &self {
            PocketError::LockedOut { retry_after, .. }
            | PocketError::RateLimitExceeded { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<validator::ValidationErrors> for PocketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Surface the first field message, matching the one-error-at-a-time form flow
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid request".to_string());
        PocketError::Validation(message)
    }
}

/// Result type alias for server operations
pub type PocketResult<T> = Result<T, PocketError>;
