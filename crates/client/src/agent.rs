//! Wiring of the client agent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stratus_auth::TokenResolver;
use stratus_core::{MetaChange, MetaDelta, Node, NodeId, NodeStatus};
use stratus_storage::{FileStateStore, NodeStateStore, StorageError};
use stratus_telemetry::{InMemoryTelemetry, NodeEvent, TelemetryService};

use crate::config::ClientConfig;
use crate::endpoint::NodeMetaEndpoint;
use crate::error::AgentError;
use crate::propagate::{CoalescingPropagator, ControlPlane, PropagationHandle, UpdatePropagator};
use crate::registry::NodeRegistry;

/// File in the state directory holding the node's identifier.
pub const NODE_ID_FILE_NAME: &str = "node_id";

/// A running client agent: registry, metadata endpoint and propagation
/// worker.
pub struct NodeAgent {
    registry: NodeRegistry,
    endpoint: NodeMetaEndpoint,
    propagator: Arc<CoalescingPropagator>,
    propagation: PropagationHandle,
    shutdown_grace: Duration,
    telemetry: Arc<dyn TelemetryService>,
}

impl NodeAgent {
    /// Start an agent persisting to `config.state_dir`.
    ///
    /// The node keeps its identifier and dynamic metadata across restarts.
    pub async fn start(
        config: &ClientConfig,
        resolver: Arc<dyn TokenResolver>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let store = FileStateStore::open(&config.state_dir).await?;
        let node_id = load_or_create_node_id(&config.state_dir).await?;
        Self::with_store(config, node_id, Arc::new(store), resolver, control_plane).await
    }

    /// Start an agent over an arbitrary store.
    ///
    /// Metadata from `config.node.meta` is written to the store for keys it
    /// does not hold yet; stored values always win.
    pub async fn with_store(
        config: &ClientConfig,
        node_id: NodeId,
        store: Arc<dyn NodeStateStore>,
        resolver: Arc<dyn TokenResolver>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Result<Self, AgentError> {
        let persisted = store.get_node_meta().await?;
        let seed: MetaDelta = config
            .node
            .meta
            .iter()
            .filter(|(key, _)| !persisted.contains_key(*key))
            .map(|(key, value)| (key.clone(), MetaChange::Set(value.clone())))
            .collect();
        if !seed.is_empty() {
            store.merge_node_meta(&seed).await?;
            tracing::info!(%node_id, keys = seed.len(), "seeded node metadata from config");
        }

        let node = Node::new(node_id, &config.node.name)
            .with_datacenter(&config.node.datacenter)
            .with_node_class(&config.node.node_class)
            .with_meta_map(seed.applied(&persisted));
        let registry = NodeRegistry::new(node);
        let telemetry = InMemoryTelemetry::arc();

        let (propagator, propagation) =
            CoalescingPropagator::spawn(control_plane, &config.propagation);
        let endpoint = NodeMetaEndpoint::builder(registry.clone(), store, resolver)
            .propagator(propagator.clone())
            .telemetry(Arc::clone(&telemetry))
            .auth_timeout(config.auth.timeout())
            .build();

        // Initial registration.
        propagator.notify(registry.node());
        tracing::info!(
            %node_id,
            name = %config.node.name,
            datacenter = %config.node.datacenter,
            meta_keys = registry.node().meta.len(),
            "node agent started"
        );

        Ok(Self {
            registry,
            endpoint,
            propagator,
            propagation,
            shutdown_grace: config.propagation.shutdown_grace(),
            telemetry,
        })
    }

    /// The metadata endpoint.
    pub fn endpoint(&self) -> &NodeMetaEndpoint {
        &self.endpoint
    }

    /// The node registry.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// The agent's telemetry.
    pub fn telemetry(&self) -> &Arc<dyn TelemetryService> {
        &self.telemetry
    }

    /// Snapshots accepted by the control plane so far.
    pub fn delivered(&self) -> u64 {
        self.propagation.delivered()
    }

    /// Record a heartbeat status change and propagate it.
    pub async fn set_status(&self, status: NodeStatus) -> Arc<Node> {
        let mut previous = status;
        let node = self
            .registry
            .update_node(|n| previous = std::mem::replace(&mut n.status, status))
            .await;
        if previous != status {
            tracing::info!(node_id = %node.id, %status, "node status changed");
            self.telemetry.event_bus().emit(NodeEvent::StatusChanged {
                node_id: node.id,
                status,
            });
        }
        self.propagator.notify(Arc::clone(&node));
        node
    }

    /// Stop the propagation worker.
    ///
    /// The newest snapshot gets up to `propagation.shutdown_grace_ms` to
    /// reach the control plane first.
    pub async fn shutdown(mut self) {
        let node_id = self.registry.node().id;
        tracing::info!(%node_id, "node agent stopping");
        if let Some(latest) = self.propagator.latest_index()
            && !self
                .propagation
                .wait_settled(latest, self.shutdown_grace)
                .await
        {
            tracing::warn!(
                %node_id,
                modify_index = latest,
                "final node update not delivered before shutdown"
            );
        }
        self.propagation.shutdown().await;
    }
}

impl std::fmt::Debug for NodeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAgent")
            .field("registry", &self.registry)
            .field("propagation", &self.propagation)
            .finish_non_exhaustive()
    }
}

async fn load_or_create_node_id(dir: &Path) -> Result<NodeId, StorageError> {
    let path = dir.join(NODE_ID_FILE_NAME);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => NodeId::parse(raw.trim())
            .map_err(|e| StorageError::corrupt(&path, format!("invalid node id: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let id = NodeId::v4();
            tokio::fs::write(&path, id.to_string())
                .await
                .map_err(|e| StorageError::io("write", &path, e))?;
            tracing::info!(node_id = %id, "generated node id");
            Ok(id)
        }
        Err(e) => Err(StorageError::io("read", &path, e)),
    }
}
