// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay server binary: room lobby REST plus the WebSocket fan-out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wordbattle_network::lobby::RoomRegistry;
use wordbattle_network::relay;

#[derive(Debug, Parser)]
#[command(name = "wordbattle-relay", about = "Room relay for wordbattle")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Seconds an empty room survives before cleanup
    #[arg(long, default_value_t = 5)]
    cleanup_grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let registry = Arc::new(RoomRegistry::with_cleanup_grace(Duration::from_secs(
        args.cleanup_grace_secs,
    )));

    tracing::info!(listen = %args.listen, "relay listening");
    warp::serve(relay::routes(registry)).run(args.listen).await;
    Ok(())
}
