//! The `NodeMeta` endpoint: apply and read dynamic node metadata.
//!
//! An apply runs these steps in order:
//!
//! 1. resolve the caller's token (bounded by a timeout) and require the
//!    node write capability;
//! 2. reject malformed deltas before any state is touched;
//! 3. inside the registry's update scope, merge the delta into the durable
//!    store, then into the working copy, then publish;
//! 4. hand the new snapshot to the propagator.
//!
//! Step 3 runs on its own task. Once it has started, dropping the caller's
//! future does not interrupt it, so the store and the published node never
//! diverge.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stratus_auth::{AuthError, NodeCapability, TokenResolver};
use stratus_core::{MetaDelta, Node, NodeMetaApplyRequest, NodeMetaReadRequest, NodeMetaResponse};
use stratus_storage::NodeStateStore;
use stratus_telemetry::{InMemoryTelemetry, NodeEvent, TelemetryService};

use crate::error::NodeMetaError;
use crate::propagate::{NoopPropagator, UpdatePropagator};
use crate::registry::NodeRegistry;

/// Duration histogram of apply calls.
pub const APPLY_METRIC: &str = "client.node_meta.apply";
/// Duration histogram of read calls.
pub const READ_METRIC: &str = "client.node_meta.read";
/// Counter of failed apply calls, excluding denials.
pub const APPLY_ERRORS_METRIC: &str = "client.node_meta.apply.errors";
/// Counter of calls refused for lack of capability.
pub const DENIED_METRIC: &str = "client.node_meta.denied";
/// Gauge of metadata keys on the published node.
pub const KEYS_METRIC: &str = "client.node_meta.keys";

/// Default bound on a single token resolution.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn allowed(self, capability: &dyn NodeCapability) -> bool {
        match self {
            Self::Read => capability.allow_node_read(),
            Self::Write => capability.allow_node_write(),
        }
    }
}

/// Handler of `NodeMeta.Apply` and `NodeMeta.Read`.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct NodeMetaEndpoint {
    inner: Arc<Inner>,
}

struct Inner {
    registry: NodeRegistry,
    store: Arc<dyn NodeStateStore>,
    resolver: Arc<dyn TokenResolver>,
    propagator: Arc<dyn UpdatePropagator>,
    telemetry: Arc<dyn TelemetryService>,
    auth_timeout: Duration,
}

impl NodeMetaEndpoint {
    /// Start building an endpoint over `registry` and `store`, authorizing
    /// callers with `resolver`.
    ///
    /// `apply` and `read` must run on a tokio runtime with the time driver
    /// enabled, since token resolution is bounded by
    /// [`auth_timeout`](NodeMetaEndpointBuilder::auth_timeout).
    pub fn builder(
        registry: NodeRegistry,
        store: Arc<dyn NodeStateStore>,
        resolver: Arc<dyn TokenResolver>,
    ) -> NodeMetaEndpointBuilder {
        NodeMetaEndpointBuilder {
            registry,
            store,
            resolver,
            propagator: Arc::new(NoopPropagator),
            telemetry: None,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }

    /// Merge `request.meta` into the node's metadata.
    ///
    /// Returns the complete metadata after the merge. On error neither the
    /// durable store nor the published node has changed.
    pub async fn apply(
        &self,
        request: NodeMetaApplyRequest,
    ) -> Result<NodeMetaResponse, NodeMetaError> {
        let metrics = self.inner.telemetry.metrics();
        let _timer = metrics.histogram(APPLY_METRIC).start_timer();

        let result = self.apply_inner(request).await;
        match &result {
            Err(NodeMetaError::PermissionDenied) => metrics.counter(DENIED_METRIC).inc(),
            Err(_) => metrics.counter(APPLY_ERRORS_METRIC).inc(),
            Ok(_) => {}
        }
        result
    }

    async fn apply_inner(
        &self,
        request: NodeMetaApplyRequest,
    ) -> Result<NodeMetaResponse, NodeMetaError> {
        let NodeMetaApplyRequest { auth_token, meta } = request;
        self.authorize(&auth_token, Access::Write).await?;
        meta.validate()?;

        let inner = Arc::clone(&self.inner);
        let node = tokio::spawn(async move { inner.merge(meta).await })
            .await
            .map_err(|e| NodeMetaError::internal(format!("metadata update task failed: {e}")))??;

        Ok(NodeMetaResponse {
            meta: node.meta.clone(),
        })
    }

    /// Return the node's current metadata.
    ///
    /// Never waits for an apply in progress and never touches the store.
    pub async fn read(&self, request: NodeMetaReadRequest) -> Result<NodeMetaResponse, NodeMetaError> {
        let metrics = self.inner.telemetry.metrics();
        let _timer = metrics.histogram(READ_METRIC).start_timer();

        if let Err(e) = self.authorize(&request.auth_token, Access::Read).await {
            if e.is_permission_denied() {
                metrics.counter(DENIED_METRIC).inc();
            }
            return Err(e);
        }
        Ok(NodeMetaResponse {
            meta: self.inner.registry.meta(),
        })
    }

    /// The registry this endpoint publishes into.
    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    /// Telemetry receiving this endpoint's metrics and events.
    pub fn telemetry(&self) -> &Arc<dyn TelemetryService> {
        &self.inner.telemetry
    }

    async fn authorize(&self, token: &str, access: Access) -> Result<(), NodeMetaError> {
        let timeout = self.inner.auth_timeout;
        let resolved = tokio::time::timeout(timeout, self.inner.resolver.resolve(token))
            .await
            .map_err(|_| AuthError::Timeout { duration: timeout })??;

        match resolved {
            Some(capability) if !access.allowed(capability.as_ref()) => {
                tracing::debug!(?access, "node metadata request denied");
                Err(NodeMetaError::PermissionDenied)
            }
            _ => Ok(()),
        }
    }
}

impl Inner {
    async fn merge(&self, delta: MetaDelta) -> Result<Arc<Node>, NodeMetaError> {
        let mut scope = self.registry.begin_update().await;
        let node_id = scope.node().id;

        if let Err(e) = self.store.merge_node_meta(&delta).await {
            drop(scope);
            tracing::warn!(%node_id, error = %e, "failed to persist node metadata");
            self.telemetry.event_bus().emit(NodeEvent::MetaApplyFailed {
                node_id,
                error: e.to_string(),
            });
            return Err(NodeMetaError::Storage(e));
        }

        delta.apply_to(&mut scope.node_mut().meta);
        let node = scope.publish();

        tracing::debug!(
            %node_id,
            modify_index = node.modify_index,
            keys_set = delta.keys_set(),
            keys_deleted = delta.keys_deleted(),
            "applied node metadata"
        );
        self.propagator.notify(Arc::clone(&node));
        self.telemetry
            .metrics()
            .gauge(KEYS_METRIC)
            .set(node.meta.len() as i64);
        self.telemetry.event_bus().emit(NodeEvent::MetaApplied {
            node_id,
            modify_index: node.modify_index,
            keys_set: delta.keys_set(),
            keys_deleted: delta.keys_deleted(),
            at: Utc::now(),
        });
        Ok(node)
    }
}

impl std::fmt::Debug for NodeMetaEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetaEndpoint")
            .field("registry", &self.inner.registry)
            .field("auth_timeout", &self.inner.auth_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`NodeMetaEndpoint`].
pub struct NodeMetaEndpointBuilder {
    registry: NodeRegistry,
    store: Arc<dyn NodeStateStore>,
    resolver: Arc<dyn TokenResolver>,
    propagator: Arc<dyn UpdatePropagator>,
    telemetry: Option<Arc<dyn TelemetryService>>,
    auth_timeout: Duration,
}

impl NodeMetaEndpointBuilder {
    /// Where published snapshots are sent. Defaults to [`NoopPropagator`].
    #[must_use]
    pub fn propagator(mut self, propagator: Arc<dyn UpdatePropagator>) -> Self {
        self.propagator = propagator;
        self
    }

    /// Telemetry sink. Defaults to a private [`InMemoryTelemetry`].
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryService>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Bound on a single token resolution.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Finish building.
    pub fn build(self) -> NodeMetaEndpoint {
        NodeMetaEndpoint {
            inner: Arc::new(Inner {
                registry: self.registry,
                store: self.store,
                resolver: self.resolver,
                propagator: self.propagator,
                telemetry: self.telemetry.unwrap_or_else(InMemoryTelemetry::arc),
                auth_timeout: self.auth_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use stratus_auth::{AclDisabled, Capability, NodePolicy, StaticTokenResolver};
    use stratus_core::{Meta, NodeId};
    use stratus_storage::MemoryStateStore;

    #[derive(Default)]
    struct RecordingPropagator {
        seen: Mutex<Vec<u64>>,
    }

    impl UpdatePropagator for RecordingPropagator {
        fn notify(&self, node: Arc<Node>) {
            self.seen.lock().unwrap().push(node.modify_index);
        }
    }

    #[derive(Debug)]
    struct SlowResolver;

    #[async_trait]
    impl TokenResolver for SlowResolver {
        async fn resolve(&self, _token: &str) -> Result<Option<Capability>, AuthError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    struct Fixture {
        endpoint: NodeMetaEndpoint,
        store: Arc<MemoryStateStore>,
        propagator: Arc<RecordingPropagator>,
    }

    fn fixture(resolver: Arc<dyn TokenResolver>) -> Fixture {
        let store = Arc::new(MemoryStateStore::new());
        let propagator = Arc::new(RecordingPropagator::default());
        let registry = NodeRegistry::new(Node::new(NodeId::v4(), "n1"));
        let endpoint = NodeMetaEndpoint::builder(registry, store.clone(), resolver)
            .propagator(propagator.clone())
            .build();
        Fixture {
            endpoint,
            store,
            propagator,
        }
    }

    fn apply(delta: MetaDelta) -> NodeMetaApplyRequest {
        NodeMetaApplyRequest::new("", delta)
    }

    fn meta(pairs: &[(&str, &str)]) -> Meta {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[tokio::test]
    async fn apply_updates_store_registry_and_propagates() {
        let f = fixture(Arc::new(AclDisabled));

        let resp = f.endpoint.apply(apply(MetaDelta::new().set("env", "prod"))).await.unwrap();

        assert_eq!(resp.meta, meta(&[("env", "prod")]));
        assert_eq!(f.store.snapshot(), resp.meta);
        assert_eq!(f.endpoint.registry().meta(), resp.meta);
        assert_eq!(*f.propagator.seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn apply_records_duration_and_event() {
        let f = fixture(Arc::new(AclDisabled));
        let mut events = f.endpoint.telemetry().event_bus().subscribe();

        f.endpoint
            .apply(apply(MetaDelta::new().set("a", "1").delete("b")))
            .await
            .unwrap();

        let metrics = f.endpoint.telemetry().metrics();
        assert_eq!(metrics.histogram(APPLY_METRIC).count(), 1);
        assert_eq!(metrics.gauge(KEYS_METRIC).get(), 1);
        match events.try_recv() {
            Some(NodeEvent::MetaApplied {
                modify_index,
                keys_set,
                keys_deleted,
                ..
            }) => {
                assert_eq!((modify_index, keys_set, keys_deleted), (1, 1, 1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn storage_failure_changes_nothing() {
        let f = fixture(Arc::new(AclDisabled));
        f.endpoint.apply(apply(MetaDelta::new().set("env", "prod"))).await.unwrap();
        f.store.fail_merges(true);

        let err = f
            .endpoint
            .apply(apply(MetaDelta::new().set("zone", "us-east")))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeMetaError::Storage(_)));
        assert!(err.is_retryable());
        assert_eq!(f.store.snapshot(), meta(&[("env", "prod")]));
        assert_eq!(f.endpoint.registry().meta(), meta(&[("env", "prod")]));
        assert_eq!(f.endpoint.registry().node().modify_index, 1);
        assert_eq!(f.propagator.seen.lock().unwrap().len(), 1);
        assert_eq!(
            f.endpoint.telemetry().metrics().counter(APPLY_ERRORS_METRIC).get(),
            1
        );
    }

    #[tokio::test]
    async fn empty_key_is_rejected_before_the_store() {
        let f = fixture(Arc::new(AclDisabled));

        let err = f.endpoint.apply(apply(MetaDelta::new().set("", "x"))).await.unwrap_err();

        assert!(matches!(err, NodeMetaError::InvalidRequest(_)));
        assert_eq!(f.store.merge_count(), 0);
    }

    #[tokio::test]
    async fn read_only_token_cannot_apply() {
        let resolver = StaticTokenResolver::new(NodePolicy::Read);
        let f = fixture(Arc::new(resolver));

        let err = f.endpoint.apply(apply(MetaDelta::new().set("a", "1"))).await.unwrap_err();

        assert!(err.is_permission_denied());
        assert_eq!(f.store.merge_count(), 0);
        assert_eq!(f.endpoint.telemetry().metrics().counter(DENIED_METRIC).get(), 1);

        let read = f.endpoint.read(NodeMetaReadRequest::new("")).await.unwrap();
        assert!(read.meta.is_empty());
    }

    #[tokio::test]
    async fn denied_read_is_counted() {
        let f = fixture(Arc::new(StaticTokenResolver::new(NodePolicy::Deny)));

        let err = f.endpoint.read(NodeMetaReadRequest::new("")).await.unwrap_err();

        assert!(err.is_permission_denied());
        let metrics = f.endpoint.telemetry().metrics();
        assert_eq!(metrics.counter(DENIED_METRIC).get(), 1);
        assert_eq!(metrics.histogram(READ_METRIC).count(), 1);
    }

    #[tokio::test]
    async fn unknown_token_is_an_auth_error() {
        let f = fixture(Arc::new(StaticTokenResolver::new(NodePolicy::Write)));

        let err = f
            .endpoint
            .apply(NodeMetaApplyRequest::new("nope", MetaDelta::new().set("a", "1")))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeMetaError::AuthResolution(AuthError::TokenNotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resolution_times_out() {
        let registry = NodeRegistry::new(Node::new(NodeId::v4(), "n1"));
        let endpoint = NodeMetaEndpoint::builder(
            registry,
            Arc::new(MemoryStateStore::new()),
            Arc::new(SlowResolver),
        )
        .auth_timeout(Duration::from_millis(100))
        .build();

        let err = endpoint.read(NodeMetaReadRequest::new("")).await.unwrap_err();

        assert!(matches!(
            err,
            NodeMetaError::AuthResolution(AuthError::Timeout { .. })
        ));
        assert!(err.is_retryable());
    }
}
