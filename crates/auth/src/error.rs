//! Authorization resolution errors.

use std::time::Duration;

/// Failure to turn a bearer token into a capability.
///
/// These are distinct from a *denial*: a resolved capability that lacks a
/// right is reported by the caller as "permission denied", not as an
/// `AuthError`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is well-formed but unknown to the authority.
    #[error("ACL token not found")]
    TokenNotFound,

    /// The token could not be parsed.
    #[error("malformed ACL token: {reason}")]
    MalformedToken {
        /// Why the token was rejected.
        reason: String,
    },

    /// The authority could not be reached.
    #[error("ACL authority unreachable: {reason}")]
    Unreachable {
        /// Transport-level cause.
        reason: String,
    },

    /// Resolution did not complete in time.
    #[error("ACL token resolution timed out after {duration:?}")]
    Timeout {
        /// How long was waited before giving up.
        duration: Duration,
    },
}

impl AuthError {
    /// Convenience constructor for [`AuthError::MalformedToken`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`AuthError::Unreachable`].
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for transient failures a caller may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_messages() {
        assert_eq!(AuthError::TokenNotFound.to_string(), "ACL token not found");
        assert_eq!(
            AuthError::malformed("contains whitespace").to_string(),
            "malformed ACL token: contains whitespace"
        );
        assert_eq!(
            AuthError::unreachable("connection refused").to_string(),
            "ACL authority unreachable: connection refused"
        );
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(AuthError::unreachable("down").is_retryable());
        assert!(
            AuthError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!AuthError::TokenNotFound.is_retryable());
        assert!(!AuthError::malformed("x").is_retryable());
    }
}
