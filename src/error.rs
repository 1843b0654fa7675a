//! Error types for Mnemo

use thiserror::Error;

/// Result type alias for Mnemo operations
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Main error type for Mnemo
#[derive(Error, Debug)]
pub enum MnemoError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Memory not found: {0}")]
    NotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Keyword service error: {0}")]
    KeywordService(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Dependency timed out after {0}ms")]
    Timeout(u64),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate memory detected (existing_id={existing_id}): {message}")]
    Duplicate { existing_id: i64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MnemoError {
    /// Check if a sub-path failure with this error should degrade the
    /// query (empty sub-result) instead of failing it outright
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            MnemoError::Timeout(_)
                | MnemoError::Http(_)
                | MnemoError::Embedding(_)
                | MnemoError::KeywordService(_)
        )
    }
}
