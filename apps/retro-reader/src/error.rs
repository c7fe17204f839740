//! Error types for the Retro Reader core

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Reader error type
///
/// Storage failures are absorbed by the position manager, and stale loads
/// are not errors at all.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Structured document error: {0}")]
    Structured(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ReaderError {
    /// Whether this error should be surfaced to the person reading
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ReaderError::Io(_)
                | ReaderError::Structured(_)
                | ReaderError::NotFound(_)
                | ReaderError::UnsupportedFormat(_)
        )
    }
}

/// Key-value store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt value for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}
