// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! dlrelay - relay browser downloads to a local download manager.
//!
//! This crate provides the relay engine and the `dlrelay` CLI around it.
//!
//! # Main Components
//!
//! - [`relay::Relay`] - the orchestrator owning the connection, the pending
//!   queue and the notification coalescer
//! - [`store::Store`] - the durable key-value store backing the queue and
//!   the status mirror
//! - [`Config`] - relay configuration (`config.toml`)
//! - [`control`] - the Unix control socket of a running relay
//! - [`Error`] - error types for all operations
//!
//! # Embedding
//!
//! ```rust,ignore
//! use dlrelay::relay::{Input, LogNotifier, Relay};
//! use dlrelay::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut relay = Relay::open(Config::default().relay_config(), store, Box::new(LogNotifier)).await;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! tx.send(Input::Download(DownloadEvent::new("https://example.com/a.iso"))).await?;
//! relay.run(&mut rx).await;
//! ```

mod cli;
mod commands;
mod env;

pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod relay;
pub mod store;

pub use cli::{Cli, Command, OutputFormat};
pub use config::Config;
pub use error::{Error, Result};

use relay_core::DownloadEvent;

use commands::run::RunOptions;

/// Runs a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let state_dir = cli.state_dir.unwrap_or_else(config::default_state_dir);

    match cli.command {
        Command::Run {
            config,
            peer,
            mode,
            log_file,
            no_stdin,
        } => commands::run::run(
            &state_dir,
            RunOptions {
                config,
                peer,
                mode,
                log_file,
                no_stdin,
            },
        ),
        Command::Status { output } => commands::control::status(&state_dir, output),
        Command::Reconnect { manual } => commands::control::reconnect(&state_dir, manual),
        Command::Reset => commands::control::reset(&state_dir),
        Command::ClearQueue => commands::control::clear_queue(&state_dir),
        Command::Download {
            url,
            filename,
            size,
            mime,
            referrer,
        } => {
            let event = DownloadEvent {
                final_url: url,
                filename: filename.unwrap_or_default(),
                total_bytes: size,
                mime,
                referrer,
            };
            commands::control::download(&state_dir, event)
        }
        Command::Enable => commands::control::set_enabled(&state_dir, true),
        Command::Disable => commands::control::set_enabled(&state_dir, false),
        Command::Signal => commands::control::signal(&state_dir),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
