// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `dlrelay run`: the relay process.
//!
//! Holds an exclusive lock on the state directory, serves the control
//! socket and feeds host events from stdin into the relay event loop until
//! stdin closes or the process is interrupted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::config::{self, Config, ModeName};
use crate::control;
use crate::env;
use crate::error::{Error, Result};
use crate::host;
use crate::relay::{Input, LogNotifier, Relay};
use crate::store::{JsonFileStore, Store};

/// Buffered inputs before host and control senders wait on the relay.
const INPUT_BUFFER: usize = 64;

/// Options of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub peer: Option<String>,
    pub mode: Option<ModeName>,
    pub log_file: Option<PathBuf>,
    pub no_stdin: bool,
}

/// Runs the relay in the foreground.
pub fn run(state_dir: &Path, options: RunOptions) -> Result<()> {
    setup_logging(options.log_file.as_deref());

    let config = load_config(&options)?;
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Io(std::io::Error::other(format!("tokio: {}", e))))?;

    let result = rt.block_on(run_async(state_dir, config, options.no_stdin));
    // A stdin read may still be parked on a blocking thread.
    rt.shutdown_background();
    result
}

/// Loads the config file and applies command-line and environment overrides.
///
/// The peer URL comes from `--peer`, then `DLRELAY_PEER`, then the file.
pub(crate) fn load_config(options: &RunOptions) -> Result<Config> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut config = Config::load_or_default(&path)?;

    if let Some(url) = options.peer.clone().or_else(env::peer_url) {
        config.peer.url = url;
    }
    if let Some(mode) = options.mode {
        config.reconnect.mode = mode;
    }
    config.validate()?;
    Ok(config)
}

async fn run_async(state_dir: &Path, config: Config, no_stdin: bool) -> Result<()> {
    fs::create_dir_all(state_dir)?;
    let lock_file = acquire_lock(&config::lock_path(state_dir))?;

    let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(&config::store_path(state_dir))?);
    let socket_path = config::socket_path(state_dir);
    let listener = control::bind(&socket_path)?;

    let (tx, mut rx) = mpsc::channel(INPUT_BUFFER);
    let mut relay = Relay::open(config.relay_config(), store, Box::new(LogNotifier)).await;

    let server = tokio::spawn(control::serve(listener, tx.clone()));

    if !no_stdin {
        let tx = tx.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = host::forward_events(stdin, tx.clone()).await {
                tracing::warn!("failed to read host events: {}", e);
            }
            // The host went away; so does the relay.
            let _ = tx.send(Input::Shutdown).await;
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            let _ = tx.send(Input::Shutdown).await;
        }
    });

    relay.run(&mut rx).await;

    server.abort();
    let _ = fs::remove_file(&socket_path);
    drop(lock_file);
    tracing::info!("relay stopped");
    Ok(())
}

fn setup_logging(log_path: Option<&Path>) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open the log file, fall back to stderr
    let file = log_path.and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    if let Some(file) = file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn acquire_lock(lock_path: &Path) -> Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive().map_err(|_| Error::AlreadyRunning {
        path: lock_path.display().to_string(),
    })?;
    Ok(file)
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
