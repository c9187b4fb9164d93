//! Error types for tesela-explain

use thiserror::Error;

/// Errors that can occur while building a report
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Tensor creation or quantization failed
    #[error("Tensor error: {0}")]
    Tesela(#[from] tesela::TeselaError),

    /// Graph loading or instantiation failed
    #[error("Graph error: {0}")]
    Schema(#[from] tesela_schema::SchemaError),

    /// Argument combination the core would reject with a panic
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for tesela-explain operations
pub type Result<T> = std::result::Result<T, ExplainError>;
