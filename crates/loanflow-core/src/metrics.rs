//! Metrics collection for observability
//!
//! Lightweight counters, gauges and latency histograms without external
//! dependencies, exportable in Prometheus text format. The histogram keeps
//! fixed buckets sized for a hot path that must hold single-digit
//! milliseconds at the median, and supports percentile estimation so the
//! p50 contract can be watched directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// A thread-safe counter metric.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a new counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A thread-safe gauge metric (can go up and down).
#[derive(Debug, Default, Clone)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Create a new gauge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct HistogramBucket {
    bound: f64,
    count: Arc<AtomicU64>,
}

/// A latency histogram (milliseconds) with percentile estimation.
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum_millis: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    /// Default buckets sized for a sub-10ms hot path (ms).
    #[must_use]
    pub fn new() -> Self {
        Self::with_buckets(vec![
            0.5, 1.0, 2.0, 4.0, 8.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0,
        ])
    }

    /// Histogram with custom bucket upper bounds.
    #[must_use]
    pub fn with_buckets(bounds: Vec<f64>) -> Self {
        let buckets = bounds
            .into_iter()
            .map(|bound| HistogramBucket { bound, count: Arc::new(AtomicU64::new(0)) })
            .collect();
        Self {
            buckets,
            sum_millis: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Observe a value in milliseconds.
    pub fn observe(&self, value: f64) {
        // Sum stored with 3-decimal fixed precision.
        self.sum_millis.fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for bucket in &self.buckets {
            if value <= bucket.bound {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations (ms).
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Cumulative bucket counts as `(upper_bound, count)`.
    #[must_use]
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .map(|b| (b.bound, b.count.load(Ordering::Relaxed)))
            .collect()
    }

    /// Estimate a percentile (`q` in 0..=1) from the cumulative buckets.
    /// Returns the upper bound of the bucket the quantile falls in, or the
    /// last bound when it falls past every bucket. `None` with no samples.
    #[must_use]
    pub fn percentile(&self, q: f64) -> Option<f64> {
        let total = self.count();
        if total == 0 {
            return None;
        }
        let rank = (q.clamp(0.0, 1.0) * total as f64).ceil() as u64;
        for (bound, cumulative) in self.buckets() {
            if cumulative >= rank.max(1) {
                return Some(bound);
            }
        }
        self.buckets.last().map(|b| b.bound)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stop and record the duration in a histogram.
    pub fn observe_duration(self, histogram: &Histogram) {
        histogram.observe(self.elapsed_ms());
    }
}

/// Registry of named metrics.
#[derive(Default, Clone)]
pub struct MetricsRegistry {
    counters: Arc<RwLock<HashMap<String, Counter>>>,
    gauges: Arc<RwLock<HashMap<String, Gauge>>>,
    histograms: Arc<RwLock<HashMap<String, Histogram>>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter.
    pub fn counter(&self, name: &str) -> Counter {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        if let Some(counter) = counters.get(name) {
            return counter.clone();
        }
        drop(counters);

        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters.entry(name.to_string()).or_default().clone()
    }

    /// Get or create a gauge.
    pub fn gauge(&self, name: &str) -> Gauge {
        let gauges = self.gauges.read().unwrap_or_else(|e| e.into_inner());
        if let Some(gauge) = gauges.get(name) {
            return gauge.clone();
        }
        drop(gauges);

        let mut gauges = self.gauges.write().unwrap_or_else(|e| e.into_inner());
        gauges.entry(name.to_string()).or_default().clone()
    }

    /// Get or create a histogram.
    pub fn histogram(&self, name: &str) -> Histogram {
        let histograms = self.histograms.read().unwrap_or_else(|e| e.into_inner());
        if let Some(histogram) = histograms.get(name) {
            return histogram.clone();
        }
        drop(histograms);

        let mut histograms = self.histograms.write().unwrap_or_else(|e| e.into_inner());
        histograms.entry(name.to_string()).or_default().clone()
    }

    /// Export all metrics in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        for (name, counter) in counters.iter() {
            output.push_str(&format!("# TYPE {name} counter\n{name} {}\n", counter.get()));
        }

        let gauges = self.gauges.read().unwrap_or_else(|e| e.into_inner());
        for (name, gauge) in gauges.iter() {
            output.push_str(&format!("# TYPE {name} gauge\n{name} {}\n", gauge.get()));
        }

        let histograms = self.histograms.read().unwrap_or_else(|e| e.into_inner());
        for (name, histogram) in histograms.iter() {
            output.push_str(&format!("# TYPE {name} histogram\n"));
            for (bound, count) in histogram.buckets() {
                output.push_str(&format!("{name}_bucket{{le=\"{bound}\"}} {count}\n"));
            }
            output.push_str(&format!(
                "{name}_bucket{{le=\"+Inf\"}} {}\n{name}_sum {}\n{name}_count {}\n",
                histogram.count(),
                histogram.sum(),
                histogram.count()
            ));
        }

        output
    }
}

/// Process-wide metrics registry.
pub mod global {
    use super::*;
    use std::sync::OnceLock;

    static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

    /// The global registry.
    pub fn registry() -> &'static MetricsRegistry {
        REGISTRY.get_or_init(MetricsRegistry::new)
    }

    /// Convenience accessor for a counter.
    pub fn counter(name: &str) -> Counter {
        registry().counter(name)
    }

    /// Convenience accessor for a gauge.
    pub fn gauge(name: &str) -> Gauge {
        registry().gauge(name)
    }

    /// Convenience accessor for a histogram.
    pub fn histogram(name: &str) -> Histogram {
        registry().histogram(name)
    }

    /// Export the global registry in Prometheus text format.
    pub fn export_prometheus() -> String {
        registry().export_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.set(12);
        assert_eq!(gauge.get(), 12);
    }

    #[test]
    fn test_histogram_buckets() {
        let h = Histogram::with_buckets(vec![1.0, 10.0, 100.0]);
        h.observe(0.5);
        h.observe(5.0);
        h.observe(50.0);
        h.observe(500.0);
        assert_eq!(h.count(), 4);
        let buckets = h.buckets();
        assert_eq!(buckets[0], (1.0, 1));
        assert_eq!(buckets[1], (10.0, 2));
        assert_eq!(buckets[2], (100.0, 3));
    }

    #[test]
    fn test_histogram_percentile() {
        let h = Histogram::with_buckets(vec![1.0, 10.0, 100.0]);
        assert_eq!(h.percentile(0.5), None);
        for _ in 0..9 {
            h.observe(0.5);
        }
        h.observe(50.0);
        assert_eq!(h.percentile(0.5), Some(1.0));
        assert_eq!(h.percentile(0.99), Some(100.0));
    }

    #[test]
    fn test_registry_shares_instances() {
        let registry = MetricsRegistry::new();
        registry.counter("c").inc();
        registry.counter("c").inc();
        assert_eq!(registry.counter("c").get(), 2);
    }

    #[test]
    fn test_prometheus_export() {
        let registry = MetricsRegistry::new();
        registry.counter("requests_total").inc_by(7);
        registry.histogram("latency_ms").observe(3.0);
        let out = registry.export_prometheus();
        assert!(out.contains("requests_total 7"));
        assert!(out.contains("latency_ms_count 1"));
    }
}
