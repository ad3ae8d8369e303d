//! Error types of the client agent.

use std::path::PathBuf;

use stratus_auth::AuthError;
use stratus_core::MetaError;
use stratus_storage::StorageError;

/// Errors returned by the `NodeMeta` endpoint.
///
/// All of them are scoped to a single request.
#[derive(Debug, thiserror::Error)]
pub enum NodeMetaError {
    /// The caller lacks the required node capability.
    #[error("Permission denied")]
    PermissionDenied,

    /// The token could not be resolved.
    #[error(transparent)]
    AuthResolution(#[from] AuthError),

    /// The durable merge failed; nothing was changed.
    #[error("failed to apply dynamic node metadata: {0}")]
    Storage(#[source] StorageError),

    /// The delta itself is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] MetaError),

    /// The update task did not run to completion.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeMetaError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the same request may succeed if sent again.
    ///
    /// Deltas are idempotent, so a failed durable merge is always safe to
    /// retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::AuthResolution(e) => e.is_retryable(),
            Self::PermissionDenied | Self::InvalidRequest(_) | Self::Internal(_) => false,
        }
    }

    /// Whether this is an authorization refusal.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Errors loading or validating [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the agent cannot run with.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors starting the [`NodeAgent`](crate::NodeAgent).
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The state store could not be opened or read.
    #[error("failed to restore node state: {0}")]
    Storage(#[from] StorageError),
}
