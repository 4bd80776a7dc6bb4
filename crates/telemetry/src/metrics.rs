//! Process-local collector metrics.
//!
//! Plain atomics, read as a [`MetricsSnapshot`] by `/health/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bounds (ms) of the latency buckets. Anything slower lands in the
/// overflow bucket.
const LATENCY_BOUNDS_MS: [u64; 8] = [5, 10, 25, 50, 100, 250, 1_000, 10_000];

/// Millisecond latency distribution.
#[derive(Debug, Default)]
pub struct Latency {
    buckets: [AtomicU64; LATENCY_BOUNDS_MS.len() + 1],
    total_ms: AtomicU64,
    samples: AtomicU64,
}

impl Latency {
    pub fn observe(&self, ms: u64) {
        let slot = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.samples() {
            0 => 0.0,
            n => self.total_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// `(upper bound, count)` pairs; the overflow bucket reports `None`.
    pub fn buckets(&self) -> Vec<(Option<u64>, u64)> {
        LATENCY_BOUNDS_MS
            .iter()
            .map(|&b| Some(b))
            .chain(std::iter::once(None))
            .zip(self.buckets.iter())
            .map(|(bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Counters for `/api/send`.
#[derive(Debug, Default)]
pub struct CollectMetrics {
    pub events_received: Counter,
    pub events_persisted: Counter,
    pub events_failed_validation: Counter,
    pub events_rejected_limit: Counter,
    pub access_denied: Counter,
    pub bots_filtered: Counter,
    pub identify_calls: Counter,
    pub sessions_created: Counter,
    pub session_create_races: Counter,
    pub store_errors: Counter,
    pub usage_increment_errors: Counter,
}

/// Counters for the daily purge.
#[derive(Debug, Default)]
pub struct RetentionMetrics {
    pub runs: Counter,
    pub failures: Counter,
    pub rows_purged: Counter,
}

/// All collector metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    pub collect: CollectMetrics,
    pub retention: RetentionMetrics,
    pub ingest_latency: Latency,
    pub store_latency: Latency,
    pub retention_latency: Latency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub events_received: u64,
    pub events_persisted: u64,
    pub events_failed_validation: u64,
    pub events_rejected_limit: u64,
    pub access_denied: u64,
    pub bots_filtered: u64,
    pub identify_calls: u64,
    pub sessions_created: u64,
    pub session_create_races: u64,
    pub store_errors: u64,
    pub usage_increment_errors: u64,
    pub retention_runs: u64,
    pub retention_failures: u64,
    pub rows_purged: u64,
    pub ingest_mean_ms: f64,
    pub store_mean_ms: f64,
    pub retention_mean_ms: f64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.collect;
        let r = &self.retention;
        MetricsSnapshot {
            taken_at: Utc::now(),
            events_received: c.events_received.get(),
            events_persisted: c.events_persisted.get(),
            events_failed_validation: c.events_failed_validation.get(),
            events_rejected_limit: c.events_rejected_limit.get(),
            access_denied: c.access_denied.get(),
            bots_filtered: c.bots_filtered.get(),
            identify_calls: c.identify_calls.get(),
            sessions_created: c.sessions_created.get(),
            session_create_races: c.session_create_races.get(),
            store_errors: c.store_errors.get(),
            usage_increment_errors: c.usage_increment_errors.get(),
            retention_runs: r.runs.get(),
            retention_failures: r.failures.get(),
            rows_purged: r.rows_purged.get(),
            ingest_mean_ms: self.ingest_latency.mean_ms(),
            store_mean_ms: self.store_latency.mean_ms(),
            retention_mean_ms: self.retention_latency.mean_ms(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let latency = Latency::default();
        latency.observe(3);
        latency.observe(40);
        latency.observe(60_000);

        assert_eq!(latency.samples(), 3);
        let buckets = latency.buckets();
        assert_eq!(buckets[0], (Some(5), 1));
        assert_eq!(buckets[3], (Some(50), 1));
        assert_eq!(buckets[8], (None, 1));
        assert!((latency.mean_ms() - 20_043.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_reads_groups() {
        let m = Metrics::default();
        m.collect.events_received.inc_by(3);
        m.retention.rows_purged.inc_by(42);

        let snap = m.snapshot();
        assert_eq!(snap.events_received, 3);
        assert_eq!(snap.rows_purged, 42);
        assert_eq!(snap.ingest_mean_ms, 0.0);
    }
}
