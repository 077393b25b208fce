//! Error types for the specmill server.

use specmill_openapi_tools::error::OpenApiToolsError;
use thiserror::Error;

/// Fatal errors of the stdio server. Per-request failures are answered on the wire instead.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Reading the next input line failed (other than end-of-stream).
    #[error("failed to read request: {0}")]
    Read(#[source] std::io::Error),

    /// Writing or flushing a response failed.
    #[error("failed to write response: {0}")]
    Write(#[source] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spec loading or tool generation failed
    #[error(transparent)]
    Tools(#[from] OpenApiToolsError),

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
