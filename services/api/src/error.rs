//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered at the HTTP boundary (`{ "message": ... }` with a mapped status).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mangashelf_core::ports::PortError;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Building an upstream HTTP client failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required query parameter is missing or invalid.
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::Port(PortError::Unauthorized) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Port(PortError::Upstream { status: 404, .. }) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Upstream { status: 504, .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Port(PortError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Port(PortError::RateLimitTimeout) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Port(PortError::Upstream { message, .. }) => message.clone(),
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Migration(_)
            | ApiError::HttpClient(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        (status, Json(json!({ "message": message }))).into_response()
    }
}
