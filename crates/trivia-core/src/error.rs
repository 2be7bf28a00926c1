//! Error types for SDA Trivia

use thiserror::Error;

/// Result type alias for configuration and setup operations
pub type TriviaResult<T> = Result<T, TriviaError>;

/// Errors raised while loading configuration or wiring components together
#[derive(Error, Debug)]
pub enum TriviaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl TriviaError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
