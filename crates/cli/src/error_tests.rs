// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;

#[test]
fn test_error_not_running_display() {
    let err = Error::NotRunning {
        path: "/state/control.sock".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("not running"));
    assert!(msg.contains("/state/control.sock"));
    assert!(msg.contains("dlrelay run"));
}

#[test]
fn test_error_control_is_verbatim() {
    let err = Error::Control("not connected".to_string());
    assert_eq!(err.to_string(), "not connected");
}

#[test]
fn test_error_from_io() {
    let err: Error = std::io::Error::other("boom").into();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn test_error_from_relay_validation_is_transparent() {
    let validation = relay_core::validate_url("").unwrap_err();
    let expected = validation.to_string();
    let err: Error = RelayError::from(validation).into();
    assert!(err.to_string().contains(&expected));
}
