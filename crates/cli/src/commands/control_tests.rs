// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::os::unix::net::UnixListener;
use std::thread::JoinHandle;

use chrono::TimeZone;
use relay_core::ConnectionState;
use relay_ipc::framing;
use tempfile::TempDir;

/// Answers one control request with `response`, returning the request.
fn serve_once(state_dir: &Path, response: ControlResponse) -> JoinHandle<ControlRequest> {
    let listener = UnixListener::bind(config::socket_path(state_dir)).unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request: ControlRequest = framing::read_message(&mut stream).unwrap();
        framing::write_message(&mut stream, &response).unwrap();
        request
    })
}

#[test]
fn test_format_status_connected() {
    let mut status = ConnectionStatus::new(50);
    status.state = ConnectionState::Connected;
    status.max_attempts = Some(10);
    status.queue_length = 2;
    status.connected_since = Some(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    status.client_version = Some("6.42".to_string());

    let text = format_status(&status);
    assert_eq!(
        text,
        "State: connected\n\
         Connected since: 2026-03-01 12:00:00 UTC\n\
         Attempts: 0/10\n\
         Queue: 2/50\n\
         Interception: enabled\n\
         Download manager: 6.42\n"
    );
}

#[test]
fn test_format_status_degraded() {
    let mut status = ConnectionStatus::new(50);
    status.attempts = 4;
    status.last_error = Some("connection failed, retrying".to_string());
    status.evicted = 3;
    status.enabled = false;
    status.latest_relay_version = Some("9.0.0".to_string());
    status.update_available = true;

    let text = format_status(&status);
    assert!(text.contains("State: disconnected\n"));
    assert!(text.contains("Attempts: 4\n"));
    assert!(text.contains("Error: connection failed, retrying\n"));
    assert!(text.contains("Queue: 0/50 (3 dropped)\n"));
    assert!(text.contains("Interception: disabled\n"));
    assert!(text.contains("Update available: 9.0.0\n"));
    assert!(!text.contains("Connected since"));
}

#[test]
fn test_request_without_relay() {
    let dir = TempDir::new().unwrap();
    let err = status(dir.path(), OutputFormat::Text).unwrap_err();
    assert!(matches!(err, Error::NotRunning { .. }));
}

#[test]
fn test_failed_response_is_an_error() {
    let dir = TempDir::new().unwrap();
    let server = serve_once(
        dir.path(),
        ControlResponse::failed("max reconnect attempts exceeded"),
    );

    let err = reconnect(dir.path(), false).unwrap_err();
    assert_eq!(err.to_string(), "max reconnect attempts exceeded");
    assert_eq!(server.join().unwrap(), ControlRequest::Reconnect);
}

#[test]
fn test_manual_flag_selects_manual_reconnect() {
    let dir = TempDir::new().unwrap();
    let server = serve_once(dir.path(), ControlResponse::ok());

    reconnect(dir.path(), true).unwrap();
    assert_eq!(server.join().unwrap(), ControlRequest::ManualReconnect);
}

#[test]
fn test_download_sends_event() {
    let dir = TempDir::new().unwrap();
    let server = serve_once(dir.path(), ControlResponse::ok().with_delivered(false));

    let mut event = DownloadEvent::new("https://example.com/a.iso");
    event.filename = "a.iso".to_string();
    download(dir.path(), event.clone()).unwrap();

    assert_eq!(
        server.join().unwrap(),
        ControlRequest::ManualDownload {
            download_info: event
        }
    );
}

#[test]
fn test_disable_sends_flag() {
    let dir = TempDir::new().unwrap();
    let server = serve_once(dir.path(), ControlResponse::ok());

    set_enabled(dir.path(), false).unwrap();
    assert_eq!(
        server.join().unwrap(),
        ControlRequest::SetEnabled { enabled: false }
    );
}
