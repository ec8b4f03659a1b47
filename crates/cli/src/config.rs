// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Relay configuration management.
//!
//! Configuration is stored in `$XDG_CONFIG_HOME/dlrelay/config.toml` and
//! every field has a default, so a missing file means a default relay
//! talking to `ws://localhost:20971`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::ReconnectMode;

use crate::env;
use crate::error::{Error, Result};
use crate::relay::{ConnectionConfig, RelayConfig};

const APP_DIR_NAME: &str = "dlrelay";
const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "store.json";
const SOCKET_FILE_NAME: &str = "control.sock";
const LOCK_FILE_NAME: &str = "relay.lock";

/// Relay configuration stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `User-Agent` header attached to relayed downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// The download manager endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    /// WebSocket URL of the download manager (default: `ws://localhost:20971`).
    #[serde(default = "default_peer_url")]
    pub url: String,
    /// Max time to wait for a connection attempt in milliseconds (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wait for an `alive` frame before treating the link as connected.
    #[serde(default)]
    pub require_liveness: bool,
    /// Answer the manager's `alive` frame with an `alive` echo (default: true).
    #[serde(default = "default_true")]
    pub echo_alive: bool,
}

/// Reconnect mode names as written in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    /// Retry forever at a fixed interval.
    Continuous,
    /// Retry until `max_attempts` connects have failed.
    #[default]
    Capped,
    /// Reconnect only on a liveness signal or a manual command.
    SignalGated,
}

/// Reconnect policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub mode: ModeName,
    /// Attempt cap for the capped mode (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds (default: 3000).
    #[serde(default = "default_reconnect_interval_ms")]
    pub interval_ms: u64,
}

/// Heartbeat settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Heartbeat period in milliseconds (default: 10000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,
}

/// Pending queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of queued downloads (default: 50).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Delay between items while draining in milliseconds (default: 300).
    #[serde(default = "default_drain_delay_ms")]
    pub drain_delay_ms: u64,
    /// Window that groups queued items into one notification (default: 3000).
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
}

/// Notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Minimum time between two notifications in milliseconds (default: 10000).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Lines listed in a merged notification before "and N more" (default: 5).
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,
}

fn default_peer_url() -> String {
    "ws://localhost:20971".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_reconnect_interval_ms() -> u64 {
    3_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_capacity() -> usize {
    50
}

fn default_drain_delay_ms() -> u64 {
    300
}

fn default_batch_window_ms() -> u64 {
    3_000
}

fn default_cooldown_ms() -> u64 {
    10_000
}

fn default_display_cap() -> usize {
    5
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            url: default_peer_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            require_liveness: false,
            echo_alive: true,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            mode: ModeName::default(),
            max_attempts: default_max_attempts(),
            interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: default_capacity(),
            drain_delay_ms: default_drain_delay_ms(),
            batch_window_ms: default_batch_window_ms(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            cooldown_ms: default_cooldown_ms(),
            display_cap: default_display_cap(),
        }
    }
}

impl ReconnectConfig {
    /// The reconnect mode these settings describe.
    pub fn mode(&self) -> ReconnectMode {
        match self.mode {
            ModeName::Continuous => ReconnectMode::Continuous,
            ModeName::Capped => ReconnectMode::Capped {
                max_attempts: self.max_attempts,
            },
            ModeName::SignalGated => ReconnectMode::SignalGated,
        }
    }
}

impl Config {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or returns the defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Config::load(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Saves configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks values that parse but cannot drive a relay.
    pub fn validate(&self) -> Result<()> {
        let url = &self.peer.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "invalid peer URL '{}': must be ws:// or wss://",
                url
            )));
        }
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue.capacity must be at least 1".into()));
        }
        if self.notify.display_cap == 0 {
            return Err(Error::Config("notify.display_cap must be at least 1".into()));
        }
        if self.reconnect.mode == ModeName::Capped && self.reconnect.max_attempts == 0 {
            return Err(Error::Config(
                "reconnect.max_attempts must be at least 1 in capped mode".into(),
            ));
        }
        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connection: ConnectionConfig {
                url: self.peer.url.clone(),
                connect_timeout: Duration::from_millis(self.peer.connect_timeout_ms),
                require_liveness: self.peer.require_liveness,
                echo_alive: self.peer.echo_alive,
                mode: self.reconnect.mode(),
                interval: Duration::from_millis(self.reconnect.interval_ms),
                heartbeat_interval: Duration::from_millis(self.heartbeat.interval_ms),
            },
            queue_capacity: self.queue.capacity,
            drain_delay: Duration::from_millis(self.queue.drain_delay_ms),
            batch_window: Duration::from_millis(self.queue.batch_window_ms),
            cooldown: Duration::from_millis(self.notify.cooldown_ms),
            display_cap: self.notify.display_cap,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Default config file location: `DLRELAY_CONFIG`, else the platform config dir.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = env::config_path() {
        return path;
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Default state directory: `DLRELAY_STATE_DIR`, else the platform data dir.
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = env::state_dir() {
        return dir;
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Path of the durable store within a state directory.
pub fn store_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STORE_FILE_NAME)
}

/// Path of the control socket within a state directory.
pub fn socket_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SOCKET_FILE_NAME)
}

/// Path of the single-instance lock within a state directory.
pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE_NAME)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
