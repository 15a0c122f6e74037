use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coregate::config::Config;
use coregate::gateway::{run_gateway, GatewayState};
use coregate::provision::DockerProvisioner;
use coregate::scheduler::Scheduler;
use coregate::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "coregate")]
#[command(about = "CPU-aware job dispatch gateway for core-pinned worker containers")]
struct Args {
    /// Gateway HTTP port (overrides GATEWAY_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Workers to provision on startup (overrides INITIAL_WORKERS)
    #[arg(long)]
    initial_workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(port) = args.port {
        config.gateway_port = port;
    }
    if let Some(initial) = args.initial_workers {
        config.initial_workers = initial;
    }

    tracing::info!(
        gateway_port = config.gateway_port,
        worker_base_port = config.worker_base_port,
        max_cpu_threshold = config.max_cpu_threshold,
        prespawn_threshold = config.prespawn_threshold,
        initial_workers = config.initial_workers,
        slots = config.slot_catalogue.len(),
        "starting coregate gateway"
    );

    let provisioner = DockerProvisioner::new(&config);
    // Fatal: no point serving if we cannot start workers.
    provisioner.check_connectivity().await?;

    let scheduler = Scheduler::new(config.clone(), Arc::new(provisioner));
    scheduler.start_initial_workers().await?;

    let shutdown = install_shutdown_handler();
    let drainer = scheduler.start_drainer(shutdown.clone());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.gateway_port).parse()?;
    let state = GatewayState {
        scheduler: scheduler.clone(),
    };
    run_gateway(addr, state, shutdown.clone()).await?;

    // Server stopped: wait for the drainer, then tear down containers.
    if let Some(handle) = drainer {
        let _ = handle.await;
    }
    scheduler.stop_all_workers().await;
    tracing::info!("shutdown complete");

    Ok(())
}
