//! Metrics registry
//!
//! Named counters, gauges and histograms. A single [`MetricsRegistry`] is
//! created at process start and handed (as an `Arc`) to every component that
//! records metrics; readers pull a [`MetricsRegistry::snapshot`].

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: i64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time value that can go up and down
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct HistogramState {
    sum: f64,
    count: i64,
}

/// Running count and sum of observed samples
#[derive(Debug, Default)]
pub struct Histogram {
    state: Mutex<HistogramState>,
}

impl Histogram {
    pub fn observe(&self, v: f64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sum += v;
        state.count += 1;
    }

    /// Returns `(count, sum, avg)`; all zero before the first sample
    pub fn snapshot(&self) -> (i64, f64, f64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.count == 0 {
            return (0, 0.0, 0.0);
        }
        (state.count, state.sum, state.sum / state.count as f64)
    }
}

/// A single value in a metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Default)]
struct Metrics {
    counters: HashMap<String, Arc<Counter>>,
    gauges: HashMap<String, Arc<Gauge>>,
    histograms: HashMap<String, Arc<Histogram>>,
}

/// Registry of named metrics
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    metrics: RwLock<Metrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter registered under `name`, creating it on first use
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        get_or_create(&self.metrics, name, |m| &mut m.counters, |m| &m.counters)
    }

    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        get_or_create(&self.metrics, name, |m| &mut m.gauges, |m| &m.gauges)
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        get_or_create(&self.metrics, name, |m| &mut m.histograms, |m| &m.histograms)
    }

    /// Flattens every metric into `counter.<name>`, `gauge.<name>` and
    /// `histogram.<name>.{count,sum,avg}` keys
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        let mut result = BTreeMap::new();

        for (name, c) in &metrics.counters {
            result.insert(format!("counter.{name}"), MetricValue::Int(c.value()));
        }
        for (name, g) in &metrics.gauges {
            result.insert(format!("gauge.{name}"), MetricValue::Int(g.value()));
        }
        for (name, h) in &metrics.histograms {
            let (count, sum, avg) = h.snapshot();
            result.insert(format!("histogram.{name}.count"), MetricValue::Int(count));
            result.insert(format!("histogram.{name}.sum"), MetricValue::Float(sum));
            result.insert(format!("histogram.{name}.avg"), MetricValue::Float(avg));
        }

        result
    }
}

fn get_or_create<T: Default>(
    lock: &RwLock<Metrics>,
    name: &str,
    table_mut: impl FnOnce(&mut Metrics) -> &mut HashMap<String, Arc<T>>,
    table: impl FnOnce(&Metrics) -> &HashMap<String, Arc<T>>,
) -> Arc<T> {
    {
        let metrics = lock.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table(&metrics).get(name) {
            return Arc::clone(existing);
        }
    }

    let mut metrics = lock.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(table_mut(&mut metrics).entry(name.to_string()).or_default())
}
