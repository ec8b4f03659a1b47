// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! relay-peer: a stand-in download manager for dlrelay.
//!
//! Speaks the download manager's side of the relay protocol so the relay
//! can be run and tested without the real application.

mod server;
#[cfg(test)]
mod server_tests;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use state::{PeerOptions, PeerState};

/// relay-peer: stand-in download manager
#[derive(Parser, Debug)]
#[command(name = "relay-peer")]
#[command(about = "Stand-in download manager speaking the dlrelay protocol")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:20971")]
    bind: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Send an alive signal after the version frame
    #[arg(long)]
    require_alive: bool,

    /// Version reported to relays
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    client_version: String,

    /// Newest relay version to advertise
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    latest_version: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting relay-peer");
    info!("  Bind address: {}", args.bind);
    info!("  Version: {}", args.client_version);
    if args.require_alive {
        info!("  Alive handshake: enabled");
    }

    let state = PeerState::new(PeerOptions {
        client_version: args.client_version,
        latest_version: args.latest_version,
        require_alive: args.require_alive,
    });

    server::run(args.bind, state).await?;

    Ok(())
}
