use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glowlan_bridge::{Bridge, BridgeError, ChannelPublisher};
use glowlan_model::BridgeConfig;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "glowlan", about = "LAN bridge for Glowmesh smart lighting")]
struct Cli {
    /// Path to the home model.
    #[arg(long, default_value = "glowlan.yaml")]
    config: PathBuf,

    /// Override the listen address from the model.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut model = BridgeConfig::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        model.server.bind = bind;
    }
    info!(
        config = %cli.config.display(),
        devices = model.devices.len(),
        groups = model.groups.len(),
        "model loaded"
    );

    let (publisher, mut events) = ChannelPublisher::new();
    // Placeholder consumer; the bus client attaches here.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "state event");
        }
    });

    let bridge = Bridge::new(model, Arc::new(publisher));
    let server = bridge.bind().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run(shutdown_rx).await
}
