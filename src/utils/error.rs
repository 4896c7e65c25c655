//! Error handling for magnet-relay

use thiserror::Error;

/// Main error type for magnet-relay
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue is empty")]
    QueueEmpty,

    #[error("Remote service error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Feed error: {0}")]
    Feed(#[from] rss::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    /// Remote call failures that the next poll tick or scheduler pass retries
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Api { .. } | RelayError::Network(_))
    }
}

/// True if `err` wraps a `RelayError` worth retrying as is
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RelayError>()
        .is_some_and(RelayError::is_transient)
}
