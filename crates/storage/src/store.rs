//! The node state store port.

use async_trait::async_trait;
use stratus_core::{Meta, MetaDelta};

use crate::error::StorageError;

/// Durable persistence for node metadata.
///
/// The store is the source of truth across restarts. The in-memory node
/// registry is initialised from [`get_node_meta`](Self::get_node_meta) at
/// startup and then kept in step by merging every delta here first.
#[async_trait]
pub trait NodeStateStore: Send + Sync {
    /// Load the persisted metadata.
    async fn get_node_meta(&self) -> Result<Meta, StorageError>;

    /// Merge `delta` into the persisted metadata.
    ///
    /// Uses the same set/delete semantics as [`MetaDelta::apply_to`].
    /// Returns only once the change is durably committed. On error none of
    /// the delta is persisted.
    async fn merge_node_meta(&self, delta: &MetaDelta) -> Result<(), StorageError>;
}
