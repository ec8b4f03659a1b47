// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[test]
fn test_parse_download() {
    let line = r#"{"event":"download","url":"https://example.com/a.iso","filename":"a.iso","size":1024,"mimeType":"application/x-iso9660-image"}"#;
    let event = parse_line(line).unwrap().unwrap();

    let expected = DownloadEvent {
        final_url: "https://example.com/a.iso".to_string(),
        filename: "a.iso".to_string(),
        total_bytes: Some(1024),
        mime: Some("application/x-iso9660-image".to_string()),
        referrer: None,
    };
    assert_eq!(event, HostEvent::Download(expected));
}

#[test]
fn test_parse_alive() {
    let event = parse_line(r#"  {"event":"alive"}  "#).unwrap().unwrap();
    assert_eq!(event, HostEvent::Alive);
    assert!(matches!(Input::from(event), Input::Signal));
}

#[parameterized(
    empty = { "" },
    spaces = { "   " },
)]
fn test_blank_lines_skipped(line: &str) {
    assert!(parse_line(line).is_none());
}

#[parameterized(
    not_json = { "download a.iso" },
    unknown_event = { r#"{"event":"upload"}"# },
    missing_tag = { r#"{"url":"https://example.com/a.iso"}"# },
)]
fn test_unreadable_lines(line: &str) {
    assert!(parse_line(line).unwrap().is_err());
}

#[tokio::test]
async fn test_forward_events() {
    let input = concat!(
        "{\"event\":\"download\",\"url\":\"https://example.com/a.iso\"}\n",
        "garbage\n",
        "\n",
        "{\"event\":\"alive\"}\n",
    );
    let (tx, mut rx) = mpsc::channel(8);

    let forwarded = forward_events(input.as_bytes(), tx).await.unwrap();
    assert_eq!(forwarded, 2);

    assert!(matches!(rx.recv().await, Some(Input::Download(_))));
    assert!(matches!(rx.recv().await, Some(Input::Signal)));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_forward_stops_when_relay_gone() {
    let input = "{\"event\":\"alive\"}\n{\"event\":\"alive\"}\n";
    let (tx, rx) = mpsc::channel(8);
    drop(rx);

    let forwarded = forward_events(input.as_bytes(), tx).await.unwrap();
    assert_eq!(forwarded, 0);
}
