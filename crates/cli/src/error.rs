// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::relay::RelayError;
use crate::store::StoreError;

/// All possible errors that can occur in the dlrelay library.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("relay is not running (no socket at {path})\n  hint: start it with 'dlrelay run'")]
    NotRunning { path: String },

    #[error("another relay is already running for {path}")]
    AlreadyRunning { path: String },

    #[error("{0}")]
    Control(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Result type alias using the dlrelay Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
