//! Error types for fleetspot-ingest

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures while comparing perceptual hashes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// Hashes of different lengths cannot be compared
    #[error("Hash lengths must match ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },

    /// Input is not hexadecimal
    #[error("Invalid hex digit in hash: {0}")]
    InvalidHex(String),
}

/// Errors raised while handling a conversation turn or deferred work
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed plate, borough or name
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plate not in the registry
    #[error("Plate not registered: {0}")]
    RegistryMiss(String),

    /// Downstream publish, notify, fetch or store failure
    #[error("External service error: {0}")]
    TransientExternal(String),

    /// Conversation row inconsistent with its state
    #[error("Conversation state error: {0}")]
    State(String),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] fleetspot_common::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Common(fleetspot_common::Error::Database(err))
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Common(fleetspot_common::Error::Io(err))
    }
}

impl IngestError {
    /// True when a storage UNIQUE constraint rejected the write
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, IngestError::Common(err) if err.is_unique_violation())
    }
}

/// Result type for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;

/// API error type for the JSON endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Ingest(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INGEST_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
