//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use blood_alert_core::domain::ParseDomainError;
use blood_alert_core::ports::PortError;
use serde_json::json;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to apply the schema migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A request field that could not be understood.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A request body that is not valid JSON for the endpoint.
    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),

    /// Missing session or wrong credentials.
    #[error("{0}")]
    Unauthenticated(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<ParseDomainError> for ApiError {
    fn from(e: ParseDomainError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Port(e) => match e {
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::Unauthenticated => StatusCode::UNAUTHORIZED,
                PortError::Unauthorized(_) => StatusCode::FORBIDDEN,
                PortError::Conflict(_) => StatusCode::CONFLICT,
                PortError::Validation(_) => StatusCode::BAD_REQUEST,
                PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {:?}", self);
            "Internal server error".to_string()
        } else {
            match &self {
                ApiError::Port(e) => e.to_string(),
                ApiError::BadRequest(msg) | ApiError::Unauthenticated(msg) => msg.clone(),
                ApiError::Body(rejection) => rejection.body_text(),
                other => other.to_string(),
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
