//! Capabilities answered by a resolved token.

use serde::{Deserialize, Serialize};

/// The node-scoped rights of an authenticated caller.
pub trait NodeCapability: Send + Sync + std::fmt::Debug {
    /// Whether the caller may read node state.
    fn allow_node_read(&self) -> bool;

    /// Whether the caller may modify node state.
    fn allow_node_write(&self) -> bool;
}

/// Coarse node policy: `deny`, `read` or `write`.
///
/// `Write` implies `Read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePolicy {
    /// No access.
    #[default]
    Deny,
    /// Read-only access.
    Read,
    /// Read and write access.
    Write,
}

impl NodeCapability for NodePolicy {
    fn allow_node_read(&self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }

    fn allow_node_write(&self) -> bool {
        matches!(self, Self::Write)
    }
}

impl std::fmt::Display for NodePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deny => write!(f, "deny"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}
