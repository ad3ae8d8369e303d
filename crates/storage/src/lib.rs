#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Stratus Storage
//!
//! Durable persistence of node metadata for the Stratus client agent.
//!
//! - [`NodeStateStore`] -- the store port: load, and atomically merge a delta
//! - [`FileStateStore`] -- crash-consistent JSON document in the state directory
//! - [`MemoryStateStore`] -- in-memory store for tests and ephemeral nodes
//!
//! A merge either persists the whole delta or none of it, and returns only
//! after the write is durable. Because deltas are idempotent, a failed
//! merge can always be retried with the same delta.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::StorageError;
pub use file::{FileStateStore, META_FILE_NAME};
pub use memory::MemoryStateStore;
pub use store::NodeStateStore;
