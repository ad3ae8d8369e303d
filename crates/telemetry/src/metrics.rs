//! In-process metrics for the agent.
//!
//! Counters, gauges and duration histograms, looked up by name in a
//! [`MetricsRegistry`]. Values live in memory; exporting
//! them is up to whoever embeds the agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

/// Monotonic `u64` counter. Clones share the value.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time `i64` value, e.g. the number of metadata keys.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Gauge at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by one.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Overwrite the value.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Summary {
    count: u64,
    sum: f64,
    max: f64,
}

/// A histogram summarising observations as count / sum / max.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    summary: Arc<RwLock<Summary>>,
}

impl Histogram {
    /// Empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn observe(&self, value: f64) {
        let mut s = self.summary.write();
        s.count += 1;
        s.sum += value;
        if value > s.max {
            s.max = value;
        }
    }

    /// Samples recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.summary.read().count
    }

    /// Sum of all samples.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.summary.read().sum
    }

    /// Largest observation, or zero if none.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.summary.read().max
    }

    /// Start a [`Timer`] that records into this histogram.
    #[must_use]
    pub fn start_timer(&self) -> Timer {
        Timer {
            histogram: self.clone(),
            start: Instant::now(),
        }
    }
}

/// Measures a duration and records it in seconds when dropped.
///
/// ```
/// use stratus_telemetry::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// {
///     let _timer = registry.histogram("client.node_meta.read").start_timer();
/// }
/// assert_eq!(registry.histogram("client.node_meta.read").count(), 1);
/// ```
#[derive(Debug)]
pub struct Timer {
    histogram: Histogram,
    start: Instant,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Named metrics, created on first use.
///
/// # Examples
///
/// ```
/// use stratus_telemetry::metrics::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// let counter = registry.counter("client.node_meta.apply.errors");
/// counter.inc();
/// assert_eq!(counter.get(), 1);
///
/// // Same name, same counter.
/// let same = registry.counter("client.node_meta.apply.errors");
/// assert_eq!(same.get(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<HashMap<String, Counter>>>,
    gauges: Arc<RwLock<HashMap<String, Gauge>>>,
    histograms: Arc<RwLock<HashMap<String, Histogram>>>,
}

impl MetricsRegistry {
    /// Registry with no metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter called `name`.
    pub fn counter(&self, name: &str) -> Counter {
        get_or_create(&self.counters, name)
    }

    /// The gauge called `name`.
    pub fn gauge(&self, name: &str) -> Gauge {
        get_or_create(&self.gauges, name)
    }

    /// The histogram called `name`.
    pub fn histogram(&self, name: &str) -> Histogram {
        get_or_create(&self.histograms, name)
    }
}

fn get_or_create<M: Clone + Default>(map: &RwLock<HashMap<String, M>>, name: &str) -> M {
    if let Some(metric) = map.read().get(name) {
        return metric.clone();
    }
    map.write().entry(name.to_owned()).or_default().clone()
}
