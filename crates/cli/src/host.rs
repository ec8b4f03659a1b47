// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Host event feed.
//!
//! The host (a browser integration or a test harness) writes one JSON
//! object per line to the relay's stdin:
//!
//! ```text
//! {"event":"download","url":"https://example.com/a.iso","filename":"a.iso","size":1024}
//! {"event":"alive"}
//! ```
//!
//! Unreadable lines are logged and skipped.

use relay_core::DownloadEvent;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::relay::Input;

/// One line of host input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    /// A download the host started.
    Download(DownloadEvent),
    /// The download manager signalled liveness out of band.
    Alive,
}

impl From<HostEvent> for Input {
    fn from(event: HostEvent) -> Self {
        match event {
            HostEvent::Download(download) => Input::Download(download),
            HostEvent::Alive => Input::Signal,
        }
    }
}

/// Parses one line; blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<HostEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Forwards host events to the relay until EOF or until the relay stops.
///
/// Returns the number of events forwarded.
pub async fn forward_events<R>(reader: R, inputs: mpsc::Sender<Input>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let event = match parse_line(&line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!("skipping unreadable host event: {}", e);
                continue;
            }
        };
        if inputs.send(event.into()).await.is_err() {
            break;
        }
        forwarded += 1;
    }

    tracing::debug!("host feed ended after {} events", forwarded);
    Ok(forwarded)
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
