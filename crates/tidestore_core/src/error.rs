//! Error types for the Tidestore data model.

use thiserror::Error;

/// Result type for model operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in model-level operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A record was decodable but structurally invalid.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A query could not be interpreted.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of why the query is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::validation("record has no id");
        assert_eq!(err.to_string(), "validation failed: record has no id");

        let err = CoreError::invalid_query("unknown operator");
        assert!(err.to_string().contains("unknown operator"));
    }
}
