//! Telemetry Hub
//!
//! A single handle, cloned cheaply into every component that needs it —
//! pollers, queue, sinks, orchestrator, notifier, drivers. Exposes counters,
//! histograms, and tracing spans. OTLP/Prometheus export is out of scope;
//! this surface is the instrument layer an exporter would read from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::Span;

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A simple bounded reservoir histogram: tracks count, sum, and keeps the
/// last `capacity` samples for percentile estimation. Not a substitute for
/// a real metrics backend, but enough to answer "what's p99 right now".
#[derive(Debug)]
pub struct Histogram {
    capacity: usize,
    samples: std::sync::Mutex<Vec<f64>>,
    count: AtomicU64,
    sum: std::sync::Mutex<f64>,
}

impl Histogram {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: std::sync::Mutex::new(Vec::with_capacity(capacity)),
            count: AtomicU64::new(0),
            sum: std::sync::Mutex::new(0.0),
        }
    }

    pub fn record(&self, value_ms: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        *self.sum.lock().unwrap() += value_ms;
        let mut samples = self.samples.lock().unwrap();
        if samples.len() >= self.capacity {
            samples.remove(0);
        }
        samples.push(value_ms);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        *self.sum.lock().unwrap()
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        let mut samples = self.samples.lock().unwrap().clone();
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((samples.len() as f64 - 1.0) * p).round() as usize;
        samples.get(idx).copied()
    }

    pub fn p50(&self) -> Option<f64> {
        self.percentile(0.50)
    }

    pub fn p99(&self) -> Option<f64> {
        self.percentile(0.99)
    }
}

/// Central telemetry hub, built once at process start and cloned (cheap,
/// `Arc`-backed) into every component.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    counters: DashMap<&'static str, Arc<Counter>>,
    histograms: DashMap<&'static str, Arc<Histogram>>,
    reservoir_size: usize,
}

impl Telemetry {
    pub fn new(reservoir_size: usize) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                counters: DashMap::new(),
                histograms: DashMap::new(),
                reservoir_size,
            }),
        }
    }

    /// Fetch or create the named counter.
    pub fn counter(&self, name: &'static str) -> Arc<Counter> {
        self.inner
            .counters
            .entry(name)
            .or_insert_with(|| Arc::new(Counter::default()))
            .clone()
    }

    /// Fetch or create the named histogram.
    pub fn histogram(&self, name: &'static str) -> Arc<Histogram> {
        let reservoir_size = self.inner.reservoir_size;
        self.inner
            .histograms
            .entry(name)
            .or_insert_with(|| Arc::new(Histogram::new(reservoir_size)))
            .clone()
    }

    /// Open a tracing span for the given instrumented stage.
    pub fn span(&self, name: &'static str) -> Span {
        tracing::info_span!("stage", stage = name)
    }

    /// Snapshot every counter's current value, for diagnostics or a health
    /// endpoint the embedder wires up.
    pub fn counters_snapshot(&self) -> HashMap<String, u64> {
        self.inner
            .counters
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().get()))
            .collect()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Measure the wall-clock duration of a block and record it into a
/// histogram, in milliseconds.
pub fn record_duration(histogram: &Histogram, elapsed: Duration) {
    histogram.record(elapsed.as_secs_f64() * 1000.0);
}
