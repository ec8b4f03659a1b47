// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages exchanged with the download manager.
//!
//! Every frame is a JSON text frame with a `type` field:
//! - The relay sends heartbeats, downloads and `alive` echoes
//! - The download manager sends its version, heartbeat acknowledgements,
//!   `alive` liveness signals and download responses

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::item::WorkItem;

/// Messages sent from the relay to the download manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness check.
    Heartbeat {
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },

    /// Hand a download over to the manager.
    Download(DownloadRequest),

    /// Echo of the manager's liveness signal.
    Alive,
}

/// Payload of a `download` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    /// Size in bytes, -1 when unknown.
    pub size: i64,
    pub mime_type: Option<String>,
    /// Milliseconds since the Unix epoch at send time.
    pub timestamp: i64,
    pub referrer: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Lets the manager drop re-deliveries of the same item.
    pub request_id: String,
}

/// Outcome reported in a `download_response` frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Messages sent from the download manager to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Version information, sent once after the socket opens.
    Version {
        #[serde(rename = "ClientVersion")]
        client_version: String,
        #[serde(rename = "LatestExtensionVersion")]
        latest_extension_version: String,
    },

    /// Heartbeat acknowledgement.
    Heartbeat {
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Explicit liveness signal from the manager.
    Alive,

    /// Result of handling a download frame.
    DownloadResponse {
        status: ResponseStatus,
        #[serde(default)]
        message: Option<String>,
    },

    /// Any frame type the relay does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Creates a Heartbeat stamped with the current time.
    pub fn heartbeat() -> Self {
        ClientMessage::Heartbeat {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Creates a Download message describing `item`.
    pub fn download(item: &WorkItem) -> Self {
        ClientMessage::Download(DownloadRequest {
            url: item.url.clone(),
            filename: item.filename.clone(),
            size: item.size_bytes,
            mime_type: item.mime_type.clone(),
            timestamp: Utc::now().timestamp_millis(),
            referrer: item.referrer.clone(),
            headers: item.headers.clone(),
            request_id: item.request_id().to_string(),
        })
    }

    /// Creates an Alive echo.
    pub fn alive() -> Self {
        ClientMessage::Alive
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a Version message.
    pub fn version(
        client_version: impl Into<String>,
        latest_extension_version: impl Into<String>,
    ) -> Self {
        ServerMessage::Version {
            client_version: client_version.into(),
            latest_extension_version: latest_extension_version.into(),
        }
    }

    /// Creates a Heartbeat acknowledgement echoing `timestamp`.
    pub fn heartbeat(timestamp: Option<i64>) -> Self {
        ServerMessage::Heartbeat { timestamp }
    }

    /// Creates an Alive signal.
    pub fn alive() -> Self {
        ServerMessage::Alive
    }

    /// Creates a successful DownloadResponse.
    pub fn download_accepted(message: impl Into<String>) -> Self {
        ServerMessage::DownloadResponse {
            status: ResponseStatus::Success,
            message: Some(message.into()),
        }
    }

    /// Creates a failed DownloadResponse.
    pub fn download_rejected(message: impl Into<String>) -> Self {
        ServerMessage::DownloadResponse {
            status: ResponseStatus::Error,
            message: Some(message.into()),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
