//! Error types for the curio enrichment pipeline.

use thiserror::Error;

/// Result type alias using curio's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for curio operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Card not found
    #[error("Card not found: {0}")]
    CardNotFound(uuid::Uuid),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Audio transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Web fetch failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Card store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (wrong card type for a step, malformed payload)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scheduling error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Fetch(e.to_string())
    }
}

impl Error {
    /// Whether this error should fail a step immediately instead of being
    /// retried. Input errors are never transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::CardNotFound(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::Forbidden(_)
                | Error::Config(_)
        )
    }
}
