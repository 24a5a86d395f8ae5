//! Error types for the MCP server.

use thiserror::Error;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration errors (invalid YAML, missing or out-of-range values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (listener, registry or client construction failed)
    #[error("Startup error: {0}")]
    Startup(String),

    /// Upstream client errors
    #[error("BookStack API error: {0}")]
    Api(#[from] bookstack_api::ApiError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
