//! Error types for local persistence.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in local persistence.
///
/// Corruption is deliberately non-recoverable for the affected store:
/// callers are expected to reset the local store and re-pull rather than
/// retry, and the SDK never silently wipes data on their behalf.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store snapshot is corrupted or has an unknown format.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store's exclusive lock.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// A persisted row failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::corrupted("bad snapshot header");
        assert_eq!(err.to_string(), "store corrupted: bad snapshot header");

        assert_eq!(
            StorageError::Locked.to_string(),
            "store locked: another process has exclusive access"
        );
    }
}
