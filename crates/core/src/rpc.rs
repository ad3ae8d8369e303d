//! Request and response shapes of the `NodeMeta` endpoint.
//!
//! These are transport-agnostic: any RPC or HTTP layer can carry them as
//! JSON.

use serde::{Deserialize, Serialize};

use crate::delta::MetaDelta;
use crate::node::Meta;

/// `NodeMeta.Apply` request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetaApplyRequest {
    /// Bearer token of the caller.
    #[serde(default)]
    pub auth_token: String,
    /// Changes to apply.
    pub meta: MetaDelta,
}

impl NodeMetaApplyRequest {
    /// Build a request.
    pub fn new(auth_token: impl Into<String>, meta: MetaDelta) -> Self {
        Self {
            auth_token: auth_token.into(),
            meta,
        }
    }
}

impl std::fmt::Debug for NodeMetaApplyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetaApplyRequest")
            .field("auth_token", &"<redacted>")
            .field("meta", &self.meta)
            .finish()
    }
}

/// `NodeMeta.Read` request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetaReadRequest {
    /// Bearer token of the caller.
    #[serde(default)]
    pub auth_token: String,
}

impl NodeMetaReadRequest {
    /// Build a request.
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
        }
    }
}

impl std::fmt::Debug for NodeMetaReadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetaReadRequest")
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

/// Response of both `NodeMeta.Apply` and `NodeMeta.Read`: the full
/// resulting metadata, copied out of the node snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetaResponse {
    /// Complete metadata after the call.
    pub meta: Meta,
}
