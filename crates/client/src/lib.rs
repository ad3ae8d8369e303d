#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Stratus Client
//!
//! The node side of the Stratus client agent: the in-memory node registry
//! and the `NodeMeta` endpoint that changes dynamic node metadata at
//! runtime.
//!
//! - [`NodeRegistry`] -- lock-free node snapshots, one exclusive update scope
//! - [`NodeMetaEndpoint`] -- authorize, persist, publish, propagate
//! - [`CoalescingPropagator`] -- latest-wins delivery to a [`ControlPlane`]
//! - [`NodeAgent`] -- wires the above from a [`ClientConfig`]
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use stratus_auth::AclDisabled;
//! use stratus_client::{NodeMetaEndpoint, NodeRegistry};
//! use stratus_core::{MetaDelta, Node, NodeId, NodeMetaApplyRequest};
//! use stratus_storage::MemoryStateStore;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let registry = NodeRegistry::new(Node::new(NodeId::v4(), "worker-1"));
//! let endpoint = NodeMetaEndpoint::builder(
//!     registry.clone(),
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(AclDisabled),
//! )
//! .build();
//!
//! let delta = MetaDelta::new().set("zone", "us-east");
//! let resp = endpoint.apply(NodeMetaApplyRequest::new("", delta)).await?;
//!
//! assert_eq!(resp.meta["zone"], "us-east");
//! assert_eq!(registry.meta(), resp.meta);
//! # Ok::<(), stratus_client::NodeMetaError>(())
//! # }).unwrap();
//! ```

pub mod agent;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod propagate;
pub mod registry;

pub use agent::{NODE_ID_FILE_NAME, NodeAgent};
pub use config::{AuthConfig, ClientConfig, NodeConfig, PropagationConfig};
pub use endpoint::{NodeMetaEndpoint, NodeMetaEndpointBuilder};
pub use error::{AgentError, ConfigError, NodeMetaError};
pub use propagate::{
    CoalescingPropagator, ControlPlane, NoopPropagator, PropagateError, PropagationHandle,
    UpdatePropagator,
};
pub use registry::{NodeRegistry, UpdateScope};
