#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use clap::Parser;
use powerthrough::server;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "powerthrough", about = "Rewriting HTTP proxy with a headless-render fallback and a safezone WebSocket tunnel")]
struct Cli {
    /// Path to the proxy config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen address. Defaults to `0.0.0.0:{config.port}` (spec.md §6 `PORT`).
    #[arg(short, long)]
    listen: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: cli.listen,
    }))
}
