// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[test]
fn test_run_defaults() {
    let cli = Cli::try_parse_from(["dlrelay", "run"]).unwrap();
    assert!(cli.state_dir.is_none());
    match cli.command {
        Command::Run {
            config,
            peer,
            mode,
            log_file,
            no_stdin,
        } => {
            assert!(config.is_none());
            assert!(peer.is_none());
            assert!(mode.is_none());
            assert!(log_file.is_none());
            assert!(!no_stdin);
        }
        _ => unreachable!("expected run"),
    }
}

#[parameterized(
    continuous = { "continuous", ModeName::Continuous },
    capped = { "capped", ModeName::Capped },
    signal_gated = { "signal-gated", ModeName::SignalGated },
)]
fn test_run_mode(value: &str, expected: ModeName) {
    let cli = Cli::try_parse_from(["dlrelay", "run", "--mode", value]).unwrap();
    assert!(matches!(cli.command, Command::Run { mode: Some(m), .. } if m == expected));
}

#[test]
fn test_run_rejects_unknown_mode() {
    assert!(Cli::try_parse_from(["dlrelay", "run", "--mode", "sometimes"]).is_err());
}

#[test]
fn test_run_rejects_blank_peer() {
    assert!(Cli::try_parse_from(["dlrelay", "run", "--peer", "  "]).is_err());
}

#[test]
fn test_state_dir_is_global() {
    let cli = Cli::try_parse_from(["dlrelay", "status", "--state-dir", "/tmp/r"]).unwrap();
    assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/r")));
}
