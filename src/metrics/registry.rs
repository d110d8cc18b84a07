use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The Prometheus text
/// exposition is ambient observability, separate from the `/metrics` JSON
/// endpoint the proxy surface exposes (see `ProxyMetrics`).
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    /// Must be called once at startup before any `counter!`/`gauge!`/`histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        describe_counter!("powerthrough_requests_total", Unit::Count, "Total proxy requests processed");
        describe_histogram!(
            "powerthrough_request_duration_seconds",
            Unit::Seconds,
            "Total request duration from client perspective"
        );
        describe_histogram!(
            "powerthrough_upstream_duration_seconds",
            Unit::Seconds,
            "Time spent waiting for the upstream fetch"
        );
        describe_counter!("powerthrough_cache_hits_total", Unit::Count, "Cache hits");
        describe_counter!("powerthrough_cache_misses_total", Unit::Count, "Cache misses");
        describe_counter!("powerthrough_upstream_errors_total", Unit::Count, "Upstream/unexpected errors");
        describe_counter!("powerthrough_headless_requests_total", Unit::Count, "Headless render attempts");
        describe_counter!("powerthrough_headless_failures_total", Unit::Count, "Headless render failures");
        describe_gauge!("powerthrough_headless_active", Unit::Count, "Concurrently running headless renders");
        describe_gauge!(
            "powerthrough_safezone_connections",
            Unit::Count,
            "Active safezone WebSocket connections"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
