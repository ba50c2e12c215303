//! Request metrics and statistics tracking for the classifier service.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the HTTP surface
pub struct ServiceMetrics {
    /// Total predict requests received
    pub requests: AtomicU64,
    /// Requests naming an unknown model
    pub invalid_selectors: AtomicU64,
    /// Requests that failed inside the model
    pub failures: AtomicU64,
    /// Predictions by (model, canonical label)
    predictions: RwLock<BTreeMap<String, BTreeMap<String, u64>>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Confidence distribution buckets
    confidence_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            invalid_selectors: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            predictions: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, model: &str, label: &str, confidence: f64, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut predictions) = self.predictions.write() {
            *predictions
                .entry(model.to_string())
                .or_default()
                .entry(label.to_string())
                .or_insert(0) += 1;
        }

        let bucket = if confidence.is_finite() {
            (confidence * 10.0).clamp(0.0, 9.0) as usize
        } else {
            0
        };
        if let Ok(mut buckets) = self.confidence_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_invalid_selector(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.invalid_selectors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Latency statistics over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        let Ok(times) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            invalid_selectors: self.invalid_selectors.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            throughput: self.throughput(),
            predictions: self
                .predictions
                .read()
                .map(|p| p.clone())
                .unwrap_or_default(),
            latency: self.latency_stats(),
            confidence_distribution: self
                .confidence_buckets
                .read()
                .map(|b| *b)
                .unwrap_or_default(),
        }
    }

    /// Log a summary of everything recorded so far
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let latency = &snapshot.latency;

        info!(
            requests = snapshot.requests,
            invalid_selectors = snapshot.invalid_selectors,
            failures = snapshot.failures,
            throughput = format!("{:.2} req/s", snapshot.throughput),
            "Service metrics"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Prediction latency"
        );
        for (model, labels) in &snapshot.predictions {
            for (label, count) in labels {
                info!(model = %model, label = %label, count = count, "Predictions");
            }
        }

        let total: u64 = snapshot.confidence_distribution.iter().sum();
        for (i, &count) in snapshot.confidence_distribution.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = (count as f64 / total as f64) * 100.0;
            let bar = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "confidence {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time view served by the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub invalid_selectors: u64,
    pub failures: u64,
    pub throughput: f64,
    pub predictions: BTreeMap<String, BTreeMap<String, u64>>,
    pub latency: LatencyStats,
    /// Ten buckets of width 0.1 over [0, 1]
    pub confidence_distribution: [u64; 10],
}

/// Periodic metrics summary in the log
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
