//! In-memory node registry.
//!
//! The registry owns the live [`Node`] value. Readers take a lock-free
//! snapshot; every mutation, whether metadata, heartbeat status or
//! fingerprinted attributes, goes through a single process-wide update
//! scope:
//!
//! 1. [`NodeRegistry::begin_update`] waits for the scope and hands out a
//!    mutable working copy of the current node.
//! 2. The caller edits the copy (and may do the I/O that decides whether
//!    the edit is allowed at all).
//! 3. [`UpdateScope::publish`] swaps the copy in as the new snapshot and
//!    releases the scope. Dropping the scope instead discards the copy.
//!
//! A reader therefore sees either the old node or the new one in full.

use std::sync::Arc;

use arc_swap::ArcSwap;
use stratus_core::{Meta, Node};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Owner of the live node snapshot.
///
/// Cloning is cheap; clones share the same node and the same update scope.
///
/// ```
/// use stratus_client::NodeRegistry;
/// use stratus_core::{Node, NodeId, NodeStatus};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let registry = NodeRegistry::new(Node::new(NodeId::v4(), "worker-1"));
///
/// let node = registry.update_node(|n| n.status = NodeStatus::Ready).await;
/// assert_eq!(node.status, NodeStatus::Ready);
/// assert_eq!(registry.node().modify_index, 1);
/// # });
/// ```
#[derive(Clone)]
pub struct NodeRegistry {
    current: Arc<ArcSwap<Node>>,
    update_lock: Arc<Mutex<()>>,
}

impl NodeRegistry {
    /// Create a registry holding `node`.
    pub fn new(node: Node) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(node)),
            update_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The current snapshot. Never waits on writers.
    pub fn node(&self) -> Arc<Node> {
        self.current.load_full()
    }

    /// Copy of the current metadata.
    pub fn meta(&self) -> Meta {
        self.current.load().meta.clone()
    }

    /// Enter the exclusive update scope.
    ///
    /// Waits until no other update is in progress. The working copy starts
    /// from the snapshot current at the moment the scope was acquired.
    pub async fn begin_update(&self) -> UpdateScope {
        let guard = Arc::clone(&self.update_lock).lock_owned().await;
        let working = Node::clone(&self.current.load());
        UpdateScope {
            _guard: guard,
            current: Arc::clone(&self.current),
            working,
        }
    }

    /// Apply `mutator` under the update scope and publish the result.
    pub async fn update_node<F>(&self, mutator: F) -> Arc<Node>
    where
        F: FnOnce(&mut Node),
    {
        let mut scope = self.begin_update().await;
        mutator(scope.node_mut());
        scope.publish()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let node = self.current.load();
        f.debug_struct("NodeRegistry")
            .field("node_id", &node.id)
            .field("modify_index", &node.modify_index)
            .finish()
    }
}

/// Exclusive access to the node, held between
/// [`NodeRegistry::begin_update`] and [`publish`](Self::publish).
///
/// Dropping the scope without publishing releases it and leaves the node
/// unchanged.
pub struct UpdateScope {
    _guard: OwnedMutexGuard<()>,
    current: Arc<ArcSwap<Node>>,
    working: Node,
}

impl UpdateScope {
    /// The working copy.
    pub fn node(&self) -> &Node {
        &self.working
    }

    /// Mutable access to the working copy.
    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.working
    }

    /// Publish the working copy as the new snapshot and release the scope.
    pub fn publish(self) -> Arc<Node> {
        let Self {
            _guard,
            current,
            mut working,
        } = self;
        working.modify_index += 1;
        let node = Arc::new(working);
        current.store(Arc::clone(&node));
        node
    }
}

impl std::fmt::Debug for UpdateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScope")
            .field("node_id", &self.working.id)
            .finish_non_exhaustive()
    }
}
