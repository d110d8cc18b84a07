pub mod cache;
pub mod config;
pub mod error;
pub mod headers;
pub mod headless;
pub mod metrics;
pub mod proxy;
pub mod rewrite;
pub mod safezone;
pub mod server;
pub mod target_url;
pub mod upstream;
