//! Error types for `specmill-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse OpenAPI spec from '{location}': {source}")]
    SpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two operations share the same `operationId`.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// No operation matches the requested tool name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments are not a JSON object.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The outbound request could not be built (bad method, bad URL).
    #[error("failed to create request: {0}")]
    RequestConstruction(String),

    /// Connection-level failures, including timeouts.
    #[error("request failed: {0}")]
    Transport(String),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
