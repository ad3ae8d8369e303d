//! In-memory node state store.
//!
//! Suitable for tests and ephemeral nodes where nothing has to survive a
//! restart.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use parking_lot::Mutex;
use stratus_core::{Meta, MetaDelta};

use crate::error::StorageError;
use crate::store::NodeStateStore;

/// In-memory [`NodeStateStore`].
///
/// ```
/// use stratus_core::MetaDelta;
/// use stratus_storage::{MemoryStateStore, NodeStateStore};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStateStore::new();
/// store.merge_node_meta(&MetaDelta::new().set("env", "prod")).await.unwrap();
/// assert_eq!(store.get_node_meta().await.unwrap()["env"], "prod");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    meta: Mutex<Meta>,
    merges: AtomicU64,
    #[cfg(any(test, feature = "test-util"))]
    fail_merges: AtomicBool,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `meta`.
    #[must_use]
    pub fn with_meta(meta: Meta) -> Self {
        Self {
            meta: Mutex::new(meta),
            ..Self::default()
        }
    }

    /// Copy of the stored metadata without going through the async port.
    pub fn snapshot(&self) -> Meta {
        self.meta.lock().clone()
    }

    /// Number of successful merges since creation.
    pub fn merge_count(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }

    /// Make every following merge fail with [`StorageError::Unavailable`]
    /// until switched off again.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_merges(&self, fail: bool) {
        self.fail_merges.store(fail, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-util"))]
    fn check_injected_failure(&self) -> Result<(), StorageError> {
        if self.fail_merges.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn check_injected_failure(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl NodeStateStore for MemoryStateStore {
    async fn get_node_meta(&self) -> Result<Meta, StorageError> {
        Ok(self.snapshot())
    }

    async fn merge_node_meta(&self, delta: &MetaDelta) -> Result<(), StorageError> {
        self.check_injected_failure()?;
        delta.apply_to(&mut self.meta.lock());
        self.merges.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
