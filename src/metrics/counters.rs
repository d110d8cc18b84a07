use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide atomic counters, the literal source of truth for the
/// `/metrics` JSON endpoint (spec.md §3 "Metrics", §6).
///
/// These are maintained alongside the `metrics` crate's Prometheus
/// instrumentation rather than derived from it — the JSON shape the proxy
/// surface promises is a stable contract independent of whatever exposition
/// format the ambient recorder happens to use.
#[derive(Default)]
pub struct ProxyMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_errors: AtomicU64,
    total_latency_ms: AtomicU64,
    headless_requests: AtomicU64,
    headless_failures: AtomicU64,
    headless_active: AtomicI64,
}

#[derive(Debug, Serialize)]
pub struct ProxyMetricsSnapshot {
    pub requests: u64,
    #[serde(rename = "cacheHits")]
    pub cache_hits: u64,
    #[serde(rename = "cacheMisses")]
    pub cache_misses: u64,
    #[serde(rename = "upstreamErrors")]
    pub upstream_errors: u64,
    #[serde(rename = "totalLatencyMs")]
    pub total_latency_ms: u64,
    #[serde(rename = "headlessRequests")]
    pub headless_requests: u64,
    #[serde(rename = "headlessFailures")]
    pub headless_failures: u64,
    #[serde(rename = "headlessActive")]
    pub headless_active: i64,
}

impl ProxyMetrics {
    pub fn record_request(&self, latency_ms: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_headless_attempt(&self) {
        self.headless_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_headless_failure(&self) {
        self.headless_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically check-and-admit against `max`, returning a guard that
    /// decrements `headlessActive` on every exit path, including panics, so
    /// the gauge can never leak above reality (spec.md §4.7 "must be
    /// decremented on every exit path"). The admission decision and the
    /// increment happen as one compare-exchange loop, so concurrent callers
    /// can never together observe room for more than `max` (spec.md §5).
    pub fn try_enter_headless(&self, max: usize) -> Option<HeadlessGuard<'_>> {
        let mut current = self.headless_active.load(Ordering::Relaxed);
        loop {
            if current as usize >= max {
                return None;
            }
            match self.headless_active.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Some(HeadlessGuard { metrics: self }),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn headless_active(&self) -> i64 {
        self.headless_active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProxyMetricsSnapshot {
        ProxyMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            headless_requests: self.headless_requests.load(Ordering::Relaxed),
            headless_failures: self.headless_failures.load(Ordering::Relaxed),
            headless_active: self.headless_active(),
        }
    }
}

pub struct HeadlessGuard<'a> {
    metrics: &'a ProxyMetrics,
}

impl Drop for HeadlessGuard<'_> {
    fn drop(&mut self) {
        self.metrics.headless_active.fetch_sub(1, Ordering::Relaxed);
    }
}
