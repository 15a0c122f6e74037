use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coregate::worker::handler::{router, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "coregate-worker")]
#[command(about = "Synthetic CPU load worker, one per pinned core slot")]
struct Args {
    /// Port to listen on (the provisioner publishes this as base_port + slot)
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Load-generation threads; defaults to the assigned hyperthread count
    #[arg(long)]
    threads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let worker_id = std::env::var("WORKER_ID").unwrap_or_else(|_| "UNKNOWN".to_string());
    // Each slot pins two hyperthreads of one physical core.
    let threads = args
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(2, |n| n.get()));

    tracing::info!(worker_id = %worker_id, port = args.port, threads, "starting worker");

    let state = WorkerState { worker_id, threads };
    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
