//! Error types for storage operations

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key or path component rejected before any I/O
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    /// Nothing stored under the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict on {namespace}/{key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// State namespace
        namespace: String,
        /// State key
        key: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A remote-backed artifact was requested without a reachable remote store
    #[error("Remote storage unavailable: {0}")]
    RemoteUnavailable(String),

    /// Remote store answered with an error status
    #[error("Remote storage error: {0}")]
    Remote(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data is not valid JSON for the expected shape
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
