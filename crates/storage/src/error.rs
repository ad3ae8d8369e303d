//! Error types for the node state store.
//!
//! Every store method returns `Result<_, StorageError>`. A failed call
//! never leaves a partially applied delta behind, so callers may retry
//! the same delta.

use std::path::PathBuf;

/// Error type for all store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        /// What the store was doing (e.g. "write", "rename").
        operation: &'static str,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Encoding the state document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The persisted document cannot be understood.
    #[error("corrupt state file {}: {reason}", .path.display())]
    Corrupt {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The backend refused the operation.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Convenience constructor for [`StorageError::Io`].
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Convenience constructor for [`StorageError::Corrupt`].
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for transient errors that a caller may retry.
    ///
    /// Currently [`Io`](Self::Io) and [`Unavailable`](Self::Unavailable).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
