//! Node events.
//!
//! Observers learn about metadata applies and status changes from here.
//! The node registry stays the source of truth; a missed event loses
//! nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_core::{NodeId, NodeStatus};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Node state change event.
///
/// Emitted after the change is visible in the node registry. These are
/// projections, **not** the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NodeEvent {
    /// A metadata delta was persisted and published.
    MetaApplied {
        /// The node identifier.
        node_id: NodeId,
        /// Modify index of the published snapshot.
        modify_index: u64,
        /// Keys set by the delta.
        keys_set: usize,
        /// Keys deleted by the delta.
        keys_deleted: usize,
        /// When the snapshot was published.
        at: DateTime<Utc>,
    },
    /// A metadata delta was rejected by the state store.
    MetaApplyFailed {
        /// The node identifier.
        node_id: NodeId,
        /// Error description.
        error: String,
    },
    /// The heartbeat status changed.
    StatusChanged {
        /// The node identifier.
        node_id: NodeId,
        /// The new status.
        status: NodeStatus,
    },
}

/// Fan-out of [`NodeEvent`]s over a `broadcast` channel.
///
/// Emitting never waits. Without subscribers the event is gone; a
/// subscriber that falls more than `capacity` events behind loses the
/// oldest ones.
///
/// ```
/// use stratus_core::{NodeId, NodeStatus};
/// use stratus_telemetry::event::{EventBus, NodeEvent};
///
/// let bus = EventBus::new(64);
/// let mut events = bus.subscribe();
///
/// bus.emit(NodeEvent::StatusChanged {
///     node_id: NodeId::v4(),
///     status: NodeStatus::Ready,
/// });
///
/// assert!(events.try_recv().is_some());
/// ```
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    /// Bus retaining up to `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish `event` to current subscribers.
    pub fn emit(&self, event: NodeEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("node event dropped, no subscribers");
        }
    }

    /// New subscription; sees events emitted from now on.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of an [`EventBus`] subscription.
#[derive(Debug)]
pub struct EventSubscriber {
    rx: broadcast::Receiver<NodeEvent>,
}

impl EventSubscriber {
    /// Next event. `None` once the bus is gone.
    ///
    /// Events missed by lagging are skipped.
    pub async fn recv(&mut self) -> Option<NodeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => break Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "node event subscriber lagged");
                }
                Err(RecvError::Closed) => break None,
            }
        }
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<NodeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => break Some(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break None,
            }
        }
    }
}
