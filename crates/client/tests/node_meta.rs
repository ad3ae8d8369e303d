//! End-to-end behavior of the `NodeMeta` endpoint.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rstest::rstest;
use stratus_auth::{AclDisabled, NodePolicy, StaticTokenResolver, TokenResolver};
use stratus_client::{
    ClientConfig, ControlPlane, NodeAgent, NodeMetaEndpoint, NodeMetaError, NodeRegistry,
    PropagateError,
};
use stratus_core::{Meta, MetaDelta, Node, NodeId, NodeMetaApplyRequest, NodeMetaReadRequest};
use stratus_storage::{FileStateStore, MemoryStateStore, NodeStateStore};

const WRITE_TOKEN: &str = "write-token";
const READ_TOKEN: &str = "read-token";

fn meta(pairs: &[(&str, &str)]) -> Meta {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn resolver() -> Arc<dyn TokenResolver> {
    Arc::new(
        StaticTokenResolver::new(NodePolicy::Deny)
            .with_token(WRITE_TOKEN, NodePolicy::Write)
            .with_token(READ_TOKEN, NodePolicy::Read),
    )
}

fn endpoint_with(initial: Meta, store: Arc<dyn NodeStateStore>) -> NodeMetaEndpoint {
    let registry = NodeRegistry::new(Node::new(NodeId::v4(), "worker-1").with_meta_map(initial));
    NodeMetaEndpoint::builder(registry, store, resolver()).build()
}

fn apply(delta: MetaDelta) -> NodeMetaApplyRequest {
    NodeMetaApplyRequest::new(WRITE_TOKEN, delta)
}

fn read() -> NodeMetaReadRequest {
    NodeMetaReadRequest::new(READ_TOKEN)
}

#[derive(Default)]
struct RecordingControlPlane {
    seen: Mutex<Vec<Meta>>,
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn update_node(&self, node: Arc<Node>) -> Result<(), PropagateError> {
        self.seen.lock().unwrap().push(node.meta.clone());
        Ok(())
    }
}

#[tokio::test]
async fn set_adds_key() {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(Meta::new(), store.clone());

    let resp = endpoint.apply(apply(MetaDelta::new().set("k", "v"))).await.unwrap();

    assert_eq!(resp.meta, meta(&[("k", "v")]));
    assert_eq!(endpoint.read(read()).await.unwrap().meta, meta(&[("k", "v")]));
    assert_eq!(store.snapshot(), meta(&[("k", "v")]));
}

#[tokio::test]
async fn delete_removes_key() {
    let store = Arc::new(MemoryStateStore::with_meta(meta(&[("k", "v"), ("x", "y")])));
    let endpoint = endpoint_with(meta(&[("k", "v"), ("x", "y")]), store.clone());

    let resp = endpoint.apply(apply(MetaDelta::new().delete("k"))).await.unwrap();

    assert_eq!(resp.meta, meta(&[("x", "y")]));
    assert_eq!(store.snapshot(), meta(&[("x", "y")]));
}

#[tokio::test]
async fn deleting_an_absent_key_succeeds_without_change() {
    let store = Arc::new(MemoryStateStore::with_meta(meta(&[("x", "y")])));
    let endpoint = endpoint_with(meta(&[("x", "y")]), store.clone());

    let resp = endpoint.apply(apply(MetaDelta::new().delete("missing"))).await.unwrap();

    assert_eq!(resp.meta, meta(&[("x", "y")]));
    assert_eq!(store.snapshot(), meta(&[("x", "y")]));
}

#[tokio::test]
async fn applying_twice_is_idempotent() {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(Meta::new(), store.clone());
    let delta = MetaDelta::new().set("a", "1").delete("b");

    let first = endpoint.apply(apply(delta.clone())).await.unwrap();
    let second = endpoint.apply(apply(delta)).await.unwrap();

    assert_eq!(first.meta, second.meta);
    assert_eq!(store.snapshot(), second.meta);
}

#[tokio::test]
async fn storage_failure_leaves_store_and_memory_unchanged() {
    let store = Arc::new(MemoryStateStore::with_meta(meta(&[("env", "prod")])));
    let endpoint = endpoint_with(meta(&[("env", "prod")]), store.clone());
    store.fail_merges(true);

    let err = endpoint
        .apply(apply(MetaDelta::new().set("zone", "us-east").delete("env")))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeMetaError::Storage(_)));
    assert!(
        err.to_string()
            .starts_with("failed to apply dynamic node metadata: ")
    );
    assert_eq!(store.snapshot(), meta(&[("env", "prod")]));
    assert_eq!(endpoint.read(read()).await.unwrap().meta, meta(&[("env", "prod")]));

    // The same delta succeeds once the store recovers.
    store.fail_merges(false);
    let resp = endpoint
        .apply(apply(MetaDelta::new().set("zone", "us-east").delete("env")))
        .await
        .unwrap();
    assert_eq!(resp.meta, meta(&[("zone", "us-east")]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_applies_both_land() {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(Meta::new(), store.clone());

    let a = endpoint.clone();
    let b = endpoint.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.apply(apply(MetaDelta::new().set("a", "1"))).await }),
        tokio::spawn(async move { b.apply(apply(MetaDelta::new().set("b", "2"))).await }),
    );
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    let expected = meta(&[("a", "1"), ("b", "2")]);
    assert_eq!(endpoint.read(read()).await.unwrap().meta, expected);
    assert_eq!(store.snapshot(), expected);
    assert_eq!(endpoint.registry().node().modify_index, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_applies_keep_store_and_memory_equal() {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(Meta::new(), store.clone());

    let mut tasks = Vec::new();
    for i in 0..50 {
        let endpoint = endpoint.clone();
        tasks.push(tokio::spawn(async move {
            let delta = if i % 5 == 0 {
                MetaDelta::new().delete(format!("k{}", i - 1))
            } else {
                MetaDelta::new().set(format!("k{i}"), i.to_string())
            };
            endpoint.apply(apply(delta)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(endpoint.read(read()).await.unwrap().meta, store.snapshot());
    assert_eq!(endpoint.registry().node().modify_index, 50);
}

#[rstest]
#[case::no_token("")]
#[case::read_only(READ_TOKEN)]
#[tokio::test]
async fn apply_requires_write(#[case] token: &str) {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(meta(&[("env", "prod")]), store.clone());

    let err = endpoint
        .apply(NodeMetaApplyRequest::new(token, MetaDelta::new().set("k", "v")))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeMetaError::PermissionDenied));
    assert_eq!(err.to_string(), "Permission denied");
    assert_eq!(store.merge_count(), 0);
    assert_eq!(endpoint.registry().meta(), meta(&[("env", "prod")]));
}

#[rstest]
#[case::read_only(READ_TOKEN, true)]
#[case::write_implies_read(WRITE_TOKEN, true)]
#[case::no_token("", false)]
#[tokio::test]
async fn read_requires_read(#[case] token: &str, #[case] allowed: bool) {
    let endpoint = endpoint_with(meta(&[("env", "prod")]), Arc::new(MemoryStateStore::new()));

    let result = endpoint.read(NodeMetaReadRequest::new(token)).await;

    match result {
        Ok(resp) => {
            assert!(allowed);
            assert_eq!(resp.meta, meta(&[("env", "prod")]));
        }
        Err(err) => {
            assert!(!allowed);
            assert!(err.is_permission_denied());
        }
    }
}

#[tokio::test]
async fn unresolvable_token_is_surfaced() {
    let endpoint = endpoint_with(Meta::new(), Arc::new(MemoryStateStore::new()));

    let err = endpoint.read(NodeMetaReadRequest::new("bogus")).await.unwrap_err();

    assert!(matches!(err, NodeMetaError::AuthResolution(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn wire_example_set_and_delete() {
    let store = Arc::new(MemoryStateStore::with_meta(meta(&[("env", "prod")])));
    let endpoint = endpoint_with(meta(&[("env", "prod")]), store);

    let request: NodeMetaApplyRequest = serde_json::from_str(&format!(
        r#"{{"auth_token":"{WRITE_TOKEN}","meta":{{"zone":"us-east","env":null}}}}"#
    ))
    .unwrap();
    let resp = endpoint.apply(request).await.unwrap();
    assert_eq!(
        serde_json::to_value(&resp).unwrap(),
        serde_json::json!({"meta": {"zone": "us-east"}})
    );

    let resp = endpoint.read(read()).await.unwrap();
    assert_eq!(resp.meta, meta(&[("zone", "us-east")]));
}

#[tokio::test]
async fn dropped_caller_does_not_split_store_and_memory() {
    let store = Arc::new(MemoryStateStore::new());
    let endpoint = endpoint_with(Meta::new(), store.clone());

    // Hold the update scope so the apply parks inside its critical section.
    let scope = endpoint.registry().begin_update().await;
    let pending = {
        let endpoint = endpoint.clone();
        tokio::spawn(async move { endpoint.apply(apply(MetaDelta::new().set("k", "v"))).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pending.abort();
    drop(scope);

    // Wait for the detached critical section to finish.
    let _ = endpoint.registry().begin_update().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(endpoint.registry().meta(), meta(&[("k", "v")]));
    assert_eq!(endpoint.registry().meta(), store.snapshot());
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(FileStateStore::open(dir.path()).await.unwrap());
        let endpoint = endpoint_with(Meta::new(), store);
        endpoint
            .apply(apply(MetaDelta::new().set("env", "prod").set("zone", "us-east")))
            .await
            .unwrap();
        endpoint.apply(apply(MetaDelta::new().delete("env"))).await.unwrap();
    }

    let reopened = FileStateStore::open(dir.path()).await.unwrap();
    assert_eq!(
        reopened.get_node_meta().await.unwrap(),
        meta(&[("zone", "us-east")])
    );
}

#[tokio::test]
async fn agent_restarts_with_persisted_meta_and_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ClientConfig::default();
    config.node.name = "worker-1".into();
    config.state_dir = dir.path().to_path_buf();
    config.propagation.retry_backoff_ms = 5;

    let control_plane = Arc::new(RecordingControlPlane::default());

    let agent = NodeAgent::start(&config, Arc::new(AclDisabled), control_plane.clone())
        .await
        .unwrap();
    let first_id = agent.registry().node().id;
    agent
        .endpoint()
        .apply(NodeMetaApplyRequest::new("", MetaDelta::new().set("zone", "us-east")))
        .await
        .unwrap();
    let expected = meta(&[("zone", "us-east")]);
    for _ in 0..200 {
        if control_plane.seen.lock().unwrap().last() == Some(&expected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(agent.delivered() >= 1);
    agent.shutdown().await;

    let seen = control_plane.seen.lock().unwrap().clone();
    assert_eq!(seen.last(), Some(&expected));

    let agent = NodeAgent::start(&config, Arc::new(AclDisabled), control_plane.clone())
        .await
        .unwrap();
    let node = agent.registry().node();
    assert_eq!(node.id, first_id);
    assert_eq!(node.meta, meta(&[("zone", "us-east")]));
    agent.shutdown().await;
}
