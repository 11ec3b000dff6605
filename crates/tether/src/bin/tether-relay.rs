//! # tether-relay
//!
//! WebSocket relay: one device connection per client, verified records only.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tether::CommonArgs;
use tether_server::{GatewayConfig, RelayServer};

/// Tether WebSocket relay.
#[derive(Parser, Debug)]
#[command(name = "tether-relay", about = "Relay device telemetry to WebSocket clients")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to listen on (overrides settings).
    #[arg(long)]
    listen: Option<String>,

    /// Device address to dial per session (overrides settings).
    #[arg(long)]
    device: Option<String>,

    /// Skip installing the Prometheus recorder.
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = args.common.load_settings()?;
    if let Some(listen) = args.listen {
        settings.relay.listen = listen;
    }
    if let Some(device) = args.device {
        settings.relay.device = device;
    }
    tether::validate(&settings)?;
    tether::init_logging(&settings.logging);

    let mut server = RelayServer::new(GatewayConfig::from(&settings.relay));
    if !args.no_metrics {
        let handle = tether_server::metrics::install_recorder()
            .context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind relay")?;
    tracing::info!(
        "Tether relay listening on ws://{addr}{} (device {})",
        settings.relay.ws_path,
        settings.relay.device
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(settings.relay.shutdown_timeout()))
        .await;
    if drained {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown timed out with sessions still open");
    }
    Ok(())
}
