#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Stratus Telemetry
//!
//! Metrics and node events for the Stratus client agent.
//!
//! This crate provides:
//! - [`MetricsRegistry`] -- named counters, gauges and duration histograms
//! - [`Timer`] -- records elapsed time into a histogram when dropped
//! - [`EventBus`] / [`NodeEvent`] -- broadcast of node state changes
//! - [`TelemetryService`] trait and [`InMemoryTelemetry`]
//!
//! Events are **projections**, not the source of truth. The node state
//! store is the source of truth.

pub mod event;
pub mod metrics;
pub mod service;

pub use event::{EventBus, EventSubscriber, NodeEvent};
pub use metrics::{Counter, Gauge, Histogram, MetricsRegistry, Timer};
pub use service::{InMemoryTelemetry, TelemetryService};
