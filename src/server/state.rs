use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cache::ResponseCache;
use crate::config::PowerthroughConfig;
use crate::headless::{HeadlessRenderer, NullRenderer};
use crate::metrics::{Metrics, ProxyMetrics};
use crate::upstream::UpstreamFetcher;

/// Shared, cheaply-cloned handle to everything a request needs (spec.md §3
/// "AppState"). Cloned once per connection/request task; every field is
/// itself an `Arc` so the clone is a handful of atomic increments.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<PowerthroughConfig>>,
    pub metrics: Metrics,
    pub proxy_metrics: Arc<ProxyMetrics>,
    pub cache: Arc<ResponseCache>,
    pub fetcher: Arc<UpstreamFetcher>,
    pub headless: Arc<dyn HeadlessRenderer>,
}

impl AppState {
    pub fn new(config: PowerthroughConfig, metrics: Metrics) -> Self {
        let cache = Arc::new(ResponseCache::new(config.cache_ttl_ms, config.cache_high_water, config.cache_low_water));
        let fetcher = Arc::new(UpstreamFetcher::new(&config.fallback_ua));

        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            metrics,
            proxy_metrics: Arc::new(ProxyMetrics::default()),
            cache,
            fetcher,
            headless: Arc::new(NullRenderer),
        }
    }

    /// Swap in a headless renderer other than the no-op default. Used to wire
    /// in a real browser driver without threading it through the constructor.
    pub fn with_headless(mut self, headless: Arc<dyn HeadlessRenderer>) -> Self {
        self.headless = headless;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_with_empty_cache() {
        let state = AppState::new(PowerthroughConfig::default(), Metrics::install());
        assert!(state.cache.is_empty());
    }
}
