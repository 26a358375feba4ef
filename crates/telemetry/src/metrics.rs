//! In-process pipeline counters.
//!
//! Exposed through the `/status` endpoint; nothing is exported to an
//! external metrics system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate at zero rather than wrap.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    /// Increment now and decrement when the guard drops, including when the
    /// owning future is dropped before completing.
    pub fn track(&self) -> GaugeGuard<'_> {
        self.inc();
        GaugeGuard(self)
    }
}

/// Holds one unit of a [`Gauge`] until dropped.
#[must_use = "the gauge is decremented as soon as the guard drops"]
pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 5ms, 25ms, 100ms, 250ms, 1s, 5s, 30s, 2m, above
    buckets: [AtomicU64; 9],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 8] = [5, 25, 100, 250, 1_000, 5_000, 30_000, 120_000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Upper bound of the bucket holding the given quantile; `None` past the last bound.
    pub fn quantile_bound(&self, q: f64) -> Option<u64> {
        let count = self.count();
        if count == 0 {
            return Some(0);
        }
        let target = (count as f64 * q.clamp(0.0, 1.0)).ceil() as u64;
        let mut seen = 0;
        for (i, bucket) in self.buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= target {
                return Self::BUCKET_BOUNDS.get(i).copied();
            }
        }
        None
    }
}

/// Pipeline metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    // File loaders
    pub files_listed: Counter,
    pub files_loaded: Counter,
    pub files_failed: Counter,
    pub files_skipped_exhausted: Counter,
    pub rows_loaded: Counter,
    pub files_in_flight: Gauge,

    // Enrichment
    pub enrich_batches: Counter,
    pub enrich_failures: Counter,
    pub spans_enriched: Counter,

    // Backups
    pub partitions_exported: Counter,
    pub partitions_failed: Counter,
    pub manifest_publishes: Counter,
    pub manifest_failures: Counter,

    // ClickHouse
    pub clickhouse_inserts: Counter,
    pub clickhouse_insert_errors: Counter,

    // Latency histograms
    pub clickhouse_latency_ms: Histogram,
    pub file_load_latency_ms: Histogram,
    pub embedding_latency_ms: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub files_listed: u64,
    pub files_loaded: u64,
    pub files_failed: u64,
    pub files_skipped_exhausted: u64,
    pub rows_loaded: u64,
    pub files_in_flight: u64,
    pub enrich_batches: u64,
    pub enrich_failures: u64,
    pub spans_enriched: u64,
    pub partitions_exported: u64,
    pub partitions_failed: u64,
    pub manifest_publishes: u64,
    pub manifest_failures: u64,
    pub clickhouse_inserts: u64,
    pub clickhouse_insert_errors: u64,
    pub clickhouse_latency_mean_ms: f64,
    pub file_load_latency_mean_ms: f64,
    pub file_load_latency_p99_bound_ms: Option<u64>,
    pub embedding_latency_mean_ms: f64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            files_listed: self.files_listed.get(),
            files_loaded: self.files_loaded.get(),
            files_failed: self.files_failed.get(),
            files_skipped_exhausted: self.files_skipped_exhausted.get(),
            rows_loaded: self.rows_loaded.get(),
            files_in_flight: self.files_in_flight.get(),
            enrich_batches: self.enrich_batches.get(),
            enrich_failures: self.enrich_failures.get(),
            spans_enriched: self.spans_enriched.get(),
            partitions_exported: self.partitions_exported.get(),
            partitions_failed: self.partitions_failed.get(),
            manifest_publishes: self.manifest_publishes.get(),
            manifest_failures: self.manifest_failures.get(),
            clickhouse_inserts: self.clickhouse_inserts.get(),
            clickhouse_insert_errors: self.clickhouse_insert_errors.get(),
            clickhouse_latency_mean_ms: self.clickhouse_latency_ms.mean(),
            file_load_latency_mean_ms: self.file_load_latency_ms.mean(),
            file_load_latency_p99_bound_ms: self.file_load_latency_ms.quantile_bound(0.99),
            embedding_latency_mean_ms: self.embedding_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
