//! Progress Server

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use progress_server::{http, install_global, AppState, Config, Tracker};

#[derive(Parser, Debug)]
#[command(name = "progress-server")]
#[command(about = "Tracks workflow progress and serves it to dashboards")]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "PROGRESS_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Seconds a finished run is kept after its last update
    #[arg(long, env = "PROGRESS_RETENTION_TTL_SECS", default_value_t = 3600)]
    retention_ttl_secs: u64,

    /// Seconds between retention sweeps
    #[arg(
        long,
        env = "PROGRESS_SWEEP_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("progress=info".parse()?))
        .with_target(true)
        .init();

    let config = Config {
        bind_addr: args.bind_addr,
        retention_ttl_secs: args.retention_ttl_secs,
        sweep_interval_secs: args.sweep_interval_secs,
        ..Config::default()
    };
    let addr: SocketAddr = config.bind_addr.parse()?;

    let tracker = Tracker::new(config.tracker_config());
    install_global(tracker.clone())?;
    tracker.start_sweeper();

    let state = AppState::new(tracker.clone(), &config);
    let router = http::create_router(state);

    info!(
        addr = %addr,
        retention_ttl_secs = config.retention_ttl_secs,
        sweep_interval_secs = config.sweep_interval_secs,
        "Starting progress server"
    );

    let listener = TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    tracker.shutdown().await;
    info!("Progress server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
