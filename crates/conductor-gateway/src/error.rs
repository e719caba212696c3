//! Error types for the Gateway

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use conductor_guard::GuardError;
use serde_json::json;
use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(e: toml::de::Error) -> Self {
        GatewayError::InvalidConfig(e.to_string())
    }
}

impl From<conductor_guard::SanitizationFailure> for GatewayError {
    fn from(failure: conductor_guard::SanitizationFailure) -> Self {
        GatewayError::Guard(GuardError::Sanitization(failure))
    }
}

impl GatewayError {
    /// HTTP status for this error
    ///
    /// - Sanitization / invalid project name / bad request: 400
    /// - Invalid or expired confirmation token: 403
    /// - Unknown project: 404
    /// - Rate limited: 429
    /// - Everything else: 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Guard(GuardError::Sanitization(_))
            | Self::Guard(GuardError::InvalidProjectName(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Guard(GuardError::InvalidToken) => StatusCode::FORBIDDEN,
            Self::Guard(GuardError::ProjectNotFound(_)) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Guard(GuardError::Io(_))
            | Self::InvalidConfig(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body
    pub fn code(&self) -> &'static str {
        match self {
            Self::Guard(GuardError::Sanitization(_)) => "SANITIZATION_FAILED",
            Self::Guard(GuardError::InvalidProjectName(_)) => "INVALID_PROJECT_NAME",
            Self::Guard(GuardError::InvalidToken) => "INVALID_TOKEN",
            Self::Guard(GuardError::ProjectNotFound(_)) => "PROJECT_NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::BadRequest(_) => "BAD_REQUEST",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the log
        let body = match &self {
            Self::Guard(GuardError::Sanitization(failure)) => json!({
                "error": self.code(),
                "message": failure.message,
                "field": failure.field,
                "kind": failure.kind,
            }),
            Self::RateLimited { retry_after } => json!({
                "error": self.code(),
                "message": format!("Too many requests. Retry after {retry_after} seconds."),
                "retry_after": retry_after,
            }),
            Self::Guard(GuardError::InvalidToken)
            | Self::Guard(GuardError::ProjectNotFound(_))
            | Self::Guard(GuardError::InvalidProjectName(_))
            | Self::BadRequest(_) => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
            _ => {
                tracing::error!(error = %self, "request failed");
                json!({
                    "error": self.code(),
                    "message": "Internal server error",
                })
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

/// Result type for Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
