//! # tether-device
//!
//! Synthetic telemetry device for exercising the relay.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tether::CommonArgs;
use tether_device::Device;
use tokio_util::sync::CancellationToken;

/// Tether synthetic device.
#[derive(Parser, Debug)]
#[command(name = "tether-device", about = "Emit checksummed telemetry records over TCP")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to listen on (overrides settings).
    #[arg(long)]
    listen: Option<String>,

    /// Interval between records in milliseconds (overrides settings).
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = args.common.load_settings()?;
    if let Some(listen) = args.listen {
        settings.device.listen = listen;
    }
    if let Some(interval_ms) = args.interval_ms {
        settings.device.interval_ms = interval_ms;
    }
    tether::validate(&settings)?;
    tether::init_logging(&settings.logging);

    let cancel = CancellationToken::new();
    let device = Device::start(&settings.device, cancel.clone())
        .await
        .context("Failed to start device")?;
    tracing::info!(
        "Tether device listening on {} (payload {}..={} bytes every {}ms)",
        device.local_addr(),
        settings.device.min_payload_len,
        settings.device.max_payload_len,
        settings.device.interval_ms
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    device.wait().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
