#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Stratus Core
//!
//! Shared model for the Stratus client agent.
//!
//! - [`Node`] -- the in-memory snapshot of one worker's attributes
//! - [`Meta`] -- dynamic node metadata (`string -> string`)
//! - [`MetaDelta`] / [`MetaChange`] -- a batch of set/delete changes
//! - [`NodeMetaApplyRequest`], [`NodeMetaReadRequest`], [`NodeMetaResponse`]
//!   -- the transport-agnostic shapes of the `NodeMeta` endpoint
//!
//! ## Usage
//!
//! ```rust
//! use stratus_core::{MetaDelta, Node, NodeId};
//!
//! let mut node = Node::new(NodeId::v4(), "worker-1").with_meta("env", "prod");
//! MetaDelta::new().set("zone", "us-east").delete("env").apply_to(&mut node.meta);
//!
//! assert_eq!(node.meta.len(), 1);
//! ```

pub mod delta;
pub mod error;
pub mod id;
pub mod node;
pub mod rpc;

pub use delta::{MetaChange, MetaDelta};
pub use error::MetaError;
pub use id::{NodeId, UuidParseError};
pub use node::{Meta, Node, NodeStatus};
pub use rpc::{NodeMetaApplyRequest, NodeMetaReadRequest, NodeMetaResponse};
