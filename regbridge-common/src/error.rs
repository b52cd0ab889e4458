use thiserror::Error;

/// Common error type for regbridge components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    Topic(String),

    #[error("Invalid field path: {0:?}")]
    FieldPath(String),
}

/// Result type alias using regbridge's Error.
pub type Result<T> = std::result::Result<T, Error>;
