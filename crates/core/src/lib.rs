// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! relay-core: Shared library for the dlrelay download relay
//!
//! This crate provides the data types shared by the relay client and the
//! stand-in download-manager peer: work items and their validation, the
//! WebSocket wire protocol, and the connection state machine.

pub mod error;
pub mod item;
pub mod protocol;
pub mod state;
pub mod version;

pub use error::{Error, Result};
pub use item::{validate_url, DownloadEvent, WorkItem, UNKNOWN_SIZE};
pub use protocol::{ClientMessage, DownloadRequest, ResponseStatus, ServerMessage};
pub use state::{ConnectionState, LinkEvent, ReconnectMode, ReconnectPolicy, RetryDecision};
pub use version::is_version_newer;
