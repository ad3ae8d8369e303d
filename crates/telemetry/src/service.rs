//! The telemetry handle passed around the agent.

use std::sync::Arc;

use crate::event::EventBus;
use crate::metrics::MetricsRegistry;

/// Where components record metrics and publish node events.
///
/// Held as `Arc<dyn TelemetryService>`.
pub trait TelemetryService: Send + Sync {
    /// Node event fan-out.
    fn event_bus(&self) -> &EventBus;

    /// Named metrics.
    fn metrics(&self) -> &MetricsRegistry;
}

/// Telemetry kept entirely in process memory.
///
/// ```
/// use stratus_telemetry::service::{InMemoryTelemetry, TelemetryService};
///
/// let telemetry = InMemoryTelemetry::new();
/// telemetry.metrics().counter("client.node_meta.denied").inc();
/// assert_eq!(telemetry.metrics().counter("client.node_meta.denied").get(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryTelemetry {
    events: EventBus,
    metrics: MetricsRegistry,
}

impl InMemoryTelemetry {
    /// Per-subscriber event backlog used by [`new`](Self::new).
    pub const DEFAULT_EVENT_CAPACITY: usize = 128;

    /// Telemetry with the default event backlog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_capacity(Self::DEFAULT_EVENT_CAPACITY)
    }

    /// Telemetry whose subscribers may lag by up to `capacity` events.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            events: EventBus::new(capacity),
            metrics: MetricsRegistry::new(),
        }
    }

    /// Shared, type-erased instance.
    #[must_use]
    pub fn arc() -> Arc<dyn TelemetryService> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryService for InMemoryTelemetry {
    fn event_bus(&self) -> &EventBus {
        &self.events
    }

    fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }
}
