mod counters;
mod registry;

pub use counters::ProxyMetrics;
pub use registry::Metrics;
