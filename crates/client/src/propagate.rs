//! Delivery of node snapshots to the control plane.
//!
//! The endpoint hands every published snapshot to an [`UpdatePropagator`].
//! Notifying never blocks and never fails; delivery happens in the
//! background and its outcome is invisible to the request that caused it.
//!
//! [`CoalescingPropagator`] keeps only the newest pending snapshot. Each
//! snapshot is a complete node, so a newer one supersedes anything still
//! waiting to be sent. Newness is decided by `modify_index`, not by call
//! order: publishers notify after releasing the update scope, so a stale
//! snapshot may arrive after a fresher one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stratus_core::Node;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::PropagationConfig;

/// Failure reported by the control plane.
#[derive(Debug, thiserror::Error)]
pub enum PropagateError {
    /// The control plane could not be reached.
    #[error("control plane unreachable: {0}")]
    Unreachable(String),

    /// The control plane refused the update.
    #[error("control plane rejected node update: {0}")]
    Rejected(String),
}

impl PropagateError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Receives published node snapshots.
pub trait UpdatePropagator: Send + Sync {
    /// Queue `node` for delivery. Must return promptly.
    fn notify(&self, node: Arc<Node>);
}

/// The cluster control plane as seen by the agent.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register the full node with the control plane.
    async fn update_node(&self, node: Arc<Node>) -> Result<(), PropagateError>;
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPropagator;

impl UpdatePropagator for NoopPropagator {
    fn notify(&self, _node: Arc<Node>) {}
}

/// Latest-wins propagator backed by a `watch` channel.
///
/// Created with [`spawn`](Self::spawn), which also starts the worker that
/// forwards snapshots to the [`ControlPlane`].
#[derive(Debug)]
pub struct CoalescingPropagator {
    tx: watch::Sender<Option<Arc<Node>>>,
    notified: AtomicU64,
}

impl CoalescingPropagator {
    /// Start a worker delivering to `control_plane`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        control_plane: Arc<dyn ControlPlane>,
        config: &PropagationConfig,
    ) -> (Arc<Self>, PropagationHandle) {
        let (tx, rx) = watch::channel(None);
        let (settled_tx, settled_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let delivered = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            rx,
            control_plane,
            backoff: config.retry_backoff(),
            max_attempts: config.max_attempts.max(1),
            delivered: Arc::clone(&delivered),
            settled: settled_tx,
        };
        let join = tokio::spawn(worker.run(shutdown_rx));

        let propagator = Arc::new(Self {
            tx,
            notified: AtomicU64::new(0),
        });
        let handle = PropagationHandle {
            shutdown: Some(shutdown_tx),
            join,
            delivered,
            settled: settled_rx,
        };
        (propagator, handle)
    }

    /// Number of snapshots handed to [`notify`](UpdatePropagator::notify).
    pub fn notified(&self) -> u64 {
        self.notified.load(Ordering::Relaxed)
    }

    /// `modify_index` of the newest snapshot handed to the worker.
    pub fn latest_index(&self) -> Option<u64> {
        self.tx.borrow().as_ref().map(|node| node.modify_index)
    }
}

impl UpdatePropagator for CoalescingPropagator {
    fn notify(&self, node: Arc<Node>) {
        self.notified.fetch_add(1, Ordering::Relaxed);
        self.tx.send_if_modified(|pending| {
            if let Some(current) = pending.as_ref()
                && current.modify_index >= node.modify_index
            {
                tracing::trace!(
                    pending = current.modify_index,
                    stale = node.modify_index,
                    "ignoring stale node snapshot"
                );
                return false;
            }
            *pending = Some(node);
            true
        });
    }
}

/// Controls the background worker of a [`CoalescingPropagator`].
#[derive(Debug)]
pub struct PropagationHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    delivered: Arc<AtomicU64>,
    settled: watch::Receiver<Option<u64>>,
}

impl PropagationHandle {
    /// Snapshots the control plane accepted so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Wait until the worker is done with the snapshot at `modify_index`
    /// or a newer one, whether it was delivered, rejected or dropped.
    ///
    /// Returns `false` if `grace` elapses first.
    pub async fn wait_settled(&mut self, modify_index: u64, grace: Duration) -> bool {
        let settled = self
            .settled
            .wait_for(|settled| settled.is_some_and(|index| index >= modify_index));
        matches!(tokio::time::timeout(grace, settled).await, Ok(Ok(_)))
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A delivery in flight is abandoned.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await
            && !e.is_cancelled()
        {
            tracing::warn!(error = %e, "propagation worker panicked");
        }
    }
}

struct Worker {
    rx: watch::Receiver<Option<Arc<Node>>>,
    control_plane: Arc<dyn ControlPlane>,
    backoff: Duration,
    max_attempts: u32,
    delivered: Arc<AtomicU64>,
    settled: watch::Sender<Option<u64>>,
}

impl Worker {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        tracing::debug!("propagation worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let Some(node) = self.rx.borrow_and_update().clone() else {
                continue;
            };

            let modify_index = node.modify_index;
            tokio::select! {
                _ = &mut shutdown => break,
                () = self.deliver(node) => {}
            }
            self.settled.send_replace(Some(modify_index));
        }
        tracing::debug!("propagation worker stopped");
    }

    async fn deliver(&mut self, node: Arc<Node>) {
        let node_id = node.id;
        let modify_index = node.modify_index;

        for attempt in 1..=self.max_attempts {
            match self.control_plane.update_node(Arc::clone(&node)).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%node_id, modify_index, attempt, "node update delivered");
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(%node_id, modify_index, error = %e, "node update rejected");
                    return;
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        %node_id,
                        modify_index,
                        attempt,
                        error = %e,
                        "node update failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    // A newer snapshot replaces this one.
                    if self.rx.has_changed().unwrap_or(false) {
                        tracing::debug!(%node_id, modify_index, "node update superseded");
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        %node_id,
                        modify_index,
                        attempts = self.max_attempts,
                        error = %e,
                        "dropping node update"
                    );
                }
            }
        }
    }
}
