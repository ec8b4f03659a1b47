// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared IPC protocol for the relay command surface.
//!
//! This crate defines the request/response types a presentation layer (or
//! the `dlrelay` CLI) exchanges with a running relay over its control
//! socket. Messages are serialized as JSON with length-prefixed framing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use relay_core::{ConnectionState, DownloadEvent};

// ============================================================================
// Protocol types
// ============================================================================

/// Request sent from the presentation layer to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Drop the current socket, reset the attempt counter and connect afresh.
    ResetConnection,
    /// Connect if not connected, resetting the attempt counter.
    Reconnect,
    /// User-initiated reconnect; also clears "max attempts exceeded".
    ManualReconnect,
    /// Discard every queued download.
    ClearQueue,
    /// Report connection and queue status.
    GetConnectionStatus,
    /// Relay a download supplied by the user.
    #[serde(rename_all = "camelCase")]
    ManualDownload { download_info: DownloadEvent },
    /// Enable or disable interception of host download events.
    SetEnabled { enabled: bool },
    /// External liveness signal from the download manager.
    Signal,
}

impl ControlRequest {
    /// Returns the action name used on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            ControlRequest::ResetConnection => "resetConnection",
            ControlRequest::Reconnect => "reconnect",
            ControlRequest::ManualReconnect => "manualReconnect",
            ControlRequest::ClearQueue => "clearQueue",
            ControlRequest::GetConnectionStatus => "getConnectionStatus",
            ControlRequest::ManualDownload { .. } => "manualDownload",
            ControlRequest::SetEnabled { .. } => "setEnabled",
            ControlRequest::Signal => "signal",
        }
    }
}

/// Response sent from the relay to the presentation layer.
///
/// Every response carries `success`; failed responses carry `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    /// Number of queued downloads discarded by `clearQueue`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<usize>,
    /// For `manualDownload`: true if sent now, false if queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
}

impl ControlResponse {
    /// A bare success response.
    pub fn ok() -> Self {
        ControlResponse {
            success: true,
            ..Default::default()
        }
    }

    /// A failure response with a user-visible description.
    pub fn failed(error: impl Into<String>) -> Self {
        ControlResponse {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cleared(mut self, cleared: usize) -> Self {
        self.cleared = Some(cleared);
        self
    }

    pub fn with_delivered(mut self, delivered: bool) -> Self {
        self.delivered = Some(delivered);
        self
    }
}

/// Connection and queue status reported to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Connection attempts since the last successful connect.
    pub attempts: u32,
    /// Attempt cap, when the reconnect policy has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// The capped policy gave up; only a manual reconnect resumes.
    pub max_attempts_exceeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the current connection opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
    pub queue_length: usize,
    pub queue_capacity: usize,
    /// Items dropped by drop-oldest eviction since start.
    pub evicted: u64,
    /// Host download events are intercepted.
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_relay_version: Option<String>,
    /// The download manager advertises a newer relay version.
    pub update_available: bool,
}

impl ConnectionStatus {
    /// Create a disconnected status with an empty queue.
    pub fn new(queue_capacity: usize) -> Self {
        ConnectionStatus {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: None,
            max_attempts_exceeded: false,
            last_error: None,
            connected_since: None,
            queue_length: 0,
            queue_capacity,
            evicted: 0,
            enabled: true,
            client_version: None,
            latest_relay_version: None,
            update_available: false,
        }
    }
}

// ============================================================================
// Message framing
// ============================================================================

/// Maximum message size (1MB) to prevent malformed messages from causing hangs.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

fn check_len(len: usize) -> std::io::Result<()> {
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::other(format!(
            "message too large: {} bytes (max {})",
            len, MAX_MESSAGE_SIZE
        )));
    }
    Ok(())
}

fn encode<T: Serialize>(message: &T) -> std::io::Result<(u32, Vec<u8>)> {
    let json = serde_json::to_vec(message)
        .map_err(|e| std::io::Error::other(format!("serialize error: {}", e)))?;
    check_len(json.len())?;
    let len = u32::try_from(json.len()).map_err(|_| std::io::Error::other("message too large"))?;
    Ok((len, json))
}

fn decode<T: serde::de::DeserializeOwned>(buf: &[u8]) -> std::io::Result<T> {
    serde_json::from_slice(buf)
        .map_err(|e| std::io::Error::other(format!("deserialize error: {}", e)))
}

/// IPC message framing.
///
/// Messages are framed as:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON-encoded message
pub mod framing {
    use std::io::{Read, Write};

    use serde::de::DeserializeOwned;
    use serde::Serialize;

    /// Write a serializable message to the given writer.
    pub fn write_message<W: Write, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        let (len, json) = super::encode(message)?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&json)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        super::check_len(len)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        super::decode(&buf)
    }
}

/// Async variant of [`framing`] for the relay's control socket.
pub mod framing_async {
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Write a serializable message to the given writer.
    pub async fn write_message<W: AsyncWrite + Unpin, T: Serialize>(
        writer: &mut W,
        message: &T,
    ) -> std::io::Result<()> {
        let (len, json) = super::encode(message)?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(&json).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read a deserializable message from the given reader.
    pub async fn read_message<R: AsyncRead + Unpin, T: DeserializeOwned>(
        reader: &mut R,
    ) -> std::io::Result<T> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        super::check_len(len)?;

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        super::decode(&buf)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
