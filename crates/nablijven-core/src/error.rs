//! Error types for nablijven-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using nablijven-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nablijven-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The local store could not be opened or provisioned
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote API error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Whether this error means the local store itself is unusable.
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
