use thiserror::Error;

/// Application-wide error types for dotalytics.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream API request failed (transport or non-2xx).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Insert hit a unique constraint on a natural key. Expected under
    /// concurrent ingestion; callers treat it as a benign no-op.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Message broker is unavailable or an operation on it failed.
    #[error("Broker error: {0}")]
    BrokerError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A referenced job does not exist.
    #[error("Job {0} not found")]
    JobNotFound(i64),

    /// Invalid or missing configuration.
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is a natural-key conflict.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, AppError::DuplicateKey(_))
    }
}
