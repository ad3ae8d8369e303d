//! The in-memory node snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Dynamic node metadata: arbitrary string labels consumed by placement.
///
/// Key order carries no meaning; a sorted map keeps responses and the
/// durable document deterministic.
pub type Meta = BTreeMap<String, String>;

/// Scheduling status reported by the node's heartbeat loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// The agent is starting and has not yet registered.
    #[default]
    Initializing,
    /// The node is registered and accepting work.
    Ready,
    /// Heartbeats are failing.
    Down,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Snapshot of one worker's attributes.
///
/// A `Node` is a plain value. The client process shares it as an
/// `Arc<Node>` snapshot and replaces the whole value on every mutation,
/// so a reader holding a snapshot never observes a partial update.
///
/// ```
/// use stratus_core::{Node, NodeId};
///
/// let node = Node::new(NodeId::v4(), "worker-1")
///     .with_datacenter("dc1")
///     .with_meta("rack", "r12");
///
/// assert_eq!(node.meta.get("rack").map(String::as_str), Some("r12"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node identifier.
    pub id: NodeId,
    /// Human-readable node name.
    pub name: String,
    /// Datacenter the node runs in.
    pub datacenter: String,
    /// Operator-assigned node class.
    #[serde(default)]
    pub node_class: String,
    /// Current heartbeat status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Fingerprinted attributes (kernel, cpu, drivers...).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Dynamic metadata.
    #[serde(default)]
    pub meta: Meta,
    /// Bumped every time a new snapshot is published.
    #[serde(default)]
    pub modify_index: u64,
}

impl Node {
    /// Create a node with empty attributes and metadata in the default datacenter.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            datacenter: "dc1".to_owned(),
            node_class: String::new(),
            status: NodeStatus::default(),
            attributes: BTreeMap::new(),
            meta: Meta::new(),
            modify_index: 0,
        }
    }

    /// Set the datacenter.
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = datacenter.into();
        self
    }

    /// Set the node class.
    pub fn with_node_class(mut self, node_class: impl Into<String>) -> Self {
        self.node_class = node_class.into();
        self
    }

    /// Set a single metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata wholesale.
    pub fn with_meta_map(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Set a single fingerprinted attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
