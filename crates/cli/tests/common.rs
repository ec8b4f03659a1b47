// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

pub fn dlrelay() -> Command {
    cargo_bin_cmd!("dlrelay")
}

/// A `dlrelay` command bound to `state`, ignoring any user config.
pub fn dlrelay_in(state: &TempDir) -> Command {
    let mut cmd = dlrelay();
    cmd.arg("--state-dir")
        .arg(state.path())
        .env("DLRELAY_CONFIG", state.path().join("config.toml"))
        .env_remove("DLRELAY_PEER");
    cmd
}
