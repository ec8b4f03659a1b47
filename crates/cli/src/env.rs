// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! The variable name constants are generated by `build.rs` and live in the
//! [`vars`] submodule. Command-line flags take precedence over these.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `DLRELAY_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    non_empty(vars::DLRELAY_STATE_DIR).map(PathBuf::from)
}

/// Returns the value of `DLRELAY_CONFIG` if set.
pub fn config_path() -> Option<PathBuf> {
    non_empty(vars::DLRELAY_CONFIG).map(PathBuf::from)
}

/// Returns the value of `DLRELAY_PEER` if set.
pub fn peer_url() -> Option<String> {
    non_empty(vars::DLRELAY_PEER)
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
