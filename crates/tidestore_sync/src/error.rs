//! Error types for the reconciliation engine.

use thiserror::Error;

/// HTTP status the server answers with when credentials are missing or
/// insufficient. A pending entry hitting this during Push is treated as
/// unrecoverable per-item and dropped from the queue.
const STATUS_INSUFFICIENT_CREDENTIALS: u16 = 401;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during data and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Model-level error (codec, validation).
    #[error("model error: {0}")]
    Core(#[from] tidestore_core::CoreError),

    /// Local persistence error.
    #[error("storage error: {0}")]
    Storage(#[from] tidestore_cache::StorageError),

    /// Network transport error.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether a later replay can succeed.
        retryable: bool,
    },

    /// The server answered with a non-2xx status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Parsed server error message.
        message: String,
    },

    /// Entity not found.
    #[error("entity not found: {id} in collection {collection}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Entity id searched for.
        id: String,
    },

    /// No authenticated user; network writes fail fast.
    #[error("no active user")]
    NoActiveUser,

    /// An operation required an entity id that was absent.
    #[error("object id missing")]
    ObjectIdMissing,

    /// Pull refused while local writes are still pending.
    #[error("{count} pending local writes; push or purge before pulling")]
    PendingWrites {
        /// Number of queued operations.
        count: u64,
    },

    /// A bounded wait expired.
    #[error("request timed out")]
    Timeout,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Aggregated failures from a batch operation.
    #[error("batch failed with {} errors", .0.len())]
    Multiple(Vec<SyncError>),
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Returns true for credential failures the queue cannot recover
    /// from by replaying.
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Server { status, .. } if *status == STATUS_INSUFFICIENT_CREDENTIALS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failure_detection() {
        assert!(SyncError::server(401, "insufficient credentials").is_credential_failure());
        assert!(!SyncError::server(500, "boom").is_credential_failure());
        assert!(!SyncError::network_retryable("offline").is_credential_failure());
    }

    #[test]
    fn error_display() {
        let err = SyncError::server(404, "not found");
        assert_eq!(err.to_string(), "server error 404: not found");

        let err = SyncError::Multiple(vec![
            SyncError::Timeout,
            SyncError::network_fatal("tls failure"),
        ]);
        assert_eq!(err.to_string(), "batch failed with 2 errors");

        let err = SyncError::PendingWrites { count: 3 };
        assert!(err.to_string().contains("3 pending"));
    }
}
