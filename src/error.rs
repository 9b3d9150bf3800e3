//! Error types for pricewatch operations

use thiserror::Error;

/// Unified error type for tracker operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Unexpected HTTP status from a collaborator
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// Failed to parse a JSON payload
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Database operation failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// Persisting an observation failed; carries the product URL
    #[error("Failed to persist observation for {url}")]
    Ingest {
        url: String,
        #[source]
        source: Box<Error>,
    },
    /// Notification dispatch failed after the data change was committed
    #[error("Notification dispatch failed: {0}")]
    Notification(String),
}

/// Result alias for pricewatch operations
pub type Result<T> = std::result::Result<T, Error>;
