// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ModeName;

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "dlrelay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay browser downloads to a local download manager")]
#[command(
    long_about = "Relay browser downloads to a local download manager.\n\n\
    Downloads are sent over a WebSocket link while the manager is reachable and \
    queued durably while it is not."
)]
pub struct Cli {
    /// State directory (default: $DLRELAY_STATE_DIR or the platform data dir)
    #[arg(long, global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the relay in the foreground
    #[command(after_help = "\
Examples:
  dlrelay run                              Relay host events read from stdin
  dlrelay run --peer ws://127.0.0.1:9000   Use another download manager endpoint
  dlrelay run --mode continuous            Never stop reconnecting
  dlrelay run --no-stdin --log-file r.log  Control-socket only, log to a file")]
    Run {
        /// Config file (default: $DLRELAY_CONFIG or the platform config dir)
        #[arg(long, value_name = "path")]
        config: Option<PathBuf>,

        /// WebSocket URL of the download manager
        #[arg(long, value_name = "url", value_parser = non_empty_string)]
        peer: Option<String>,

        /// Reconnect mode
        #[arg(long, value_enum)]
        mode: Option<ModeName>,

        /// Write logs to this file instead of stderr
        #[arg(long, value_name = "path")]
        log_file: Option<PathBuf>,

        /// Do not read host events from stdin
        #[arg(long)]
        no_stdin: bool,
    },

    /// Show connection and queue status
    Status {
        /// Output format
        #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Connect now if disconnected
    Reconnect {
        /// Also retry after the reconnect limit was reached
        #[arg(long)]
        manual: bool,
    },

    /// Drop the connection and connect afresh
    Reset,

    /// Discard every queued download
    ClearQueue,

    /// Relay a download by URL
    Download {
        /// Download URL (http or https)
        #[arg(value_parser = non_empty_string)]
        url: String,

        /// Target filename (default: last URL path segment)
        #[arg(long, short = 'f')]
        filename: Option<String>,

        /// Size in bytes
        #[arg(long)]
        size: Option<i64>,

        /// MIME type
        #[arg(long)]
        mime: Option<String>,

        /// Page the download came from
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Resume relaying host downloads
    Enable,

    /// Stop relaying host downloads (manual downloads still work)
    Disable,

    /// Signal that the download manager is alive
    Signal,
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
