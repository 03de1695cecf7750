//! Error types and handling
//!
//! Every failure the checker can surface is an [`AppError`]. Handlers return
//! [`AppResult`] and the error is rendered as a consistent JSON body, so a
//! failed computation is never mistaken for an empty result.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// No active session, or the identity provider refused the token (401)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Subject or group could not be resolved (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient fetch failure talking to the management API (502)
    #[error("Network error: {0}")]
    Network(String),

    /// Some parallel fetches failed while others succeeded (502)
    #[error("Partial data: {message}")]
    PartialData {
        message: String,
        /// Identifiers of the items that could not be fetched
        failed: Vec<String>,
    },

    /// Bad request - invalid input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unprocessable entity - validation failed (422)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Computation superseded by a newer one (409)
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a partial-data error from the list of failed items
    pub fn partial(message: impl Into<String>, failed: Vec<String>) -> Self {
        AppError::PartialData {
            message: message.into(),
            failed,
        }
    }

    /// Short machine-readable identifier for the error variant
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "auth_error",
            AppError::NotFound(_) => "not_found",
            AppError::Network(_) => "network_error",
            AppError::PartialData { .. } => "partial_data",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Cancelled(_) => "cancelled",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Error code for programmatic handling (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            code: None,
        }
    }

    /// Add details to the error response
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Add an error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, should_log) = match &self {
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, false),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, false),
            AppError::Network(_) => (StatusCode::BAD_GATEWAY, true),
            AppError::PartialData { .. } => (StatusCode::BAD_GATEWAY, true),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, false),
            AppError::ValidationError(_) => (StatusCode::UNPROCESSABLE_ENTITY, false),
            AppError::Cancelled(_) => (StatusCode::CONFLICT, false),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, true),
        };
        let error_type = self.error_type();

        if should_log {
            error!(error = %self, error_type = error_type, "Request error");
        }

        let mut body = ErrorResponse::new(error_type, self.to_string());
        if let AppError::PartialData { failed, .. } = &self {
            body = body
                .with_details(serde_json::json!({ "failed": failed }))
                .with_code("PARTIAL_DATA");
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => AppError::Auth(err.to_string()),
            Some(404) => AppError::NotFound(err.to_string()),
            _ if err.is_timeout() => {
                AppError::Network("Management API request timed out".to_string())
            }
            _ if err.is_connect() => {
                AppError::Network("Failed to connect to management API".to_string())
            }
            _ => AppError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;
