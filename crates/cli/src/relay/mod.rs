// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The relay engine: delivery of downloads to a local download manager.
//!
//! # Architecture
//!
//! ```text
//! host events ──►┌──────────────┐  send   ┌─────────────┐     ┌──────────────┐
//! commands ─────►│    Relay     │────────►│ Connection  │────►│   Download   │
//!                │(orchestrator)│◄────────│  Manager    │◄────│   Manager    │
//!                └──────────────┘ events  └─────────────┘     └──────────────┘
//!                   │        │                   │
//!                   ▼        ▼                   ▼
//!            ┌──────────┐ ┌─────────────┐  ┌───────────┐
//!            │ Pending  │ │Notification │  │ Heartbeat │
//!            │  Queue   │ │ Coalescer   │  │  Monitor  │
//!            └──────────┘ └─────────────┘  └───────────┘
//! ```
//!
//! # Features
//!
//! - WebSocket link with continuous, capped or signal-gated reconnects
//! - Heartbeats that detect a silently dead link
//! - Bounded, persisted queue drained in FIFO order on reconnect
//! - Batched, rate-limited notifications
//! - Injectable transport trait for testing

mod connection;
mod heartbeat;
mod notify;
mod orchestrator;
mod queue;
mod timer;
mod transport;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, LinkActivity,
    AWAITING_SIGNAL_MESSAGE, MAX_ATTEMPTS_MESSAGE,
};
pub use heartbeat::HeartbeatMonitor;
pub use notify::{LogNotifier, Notification, NotificationCoalescer, NotificationKind, Notifier};
pub use orchestrator::{Delivery, Input, Relay, RelayConfig, RelayError, RELAY_VERSION};
pub use queue::{Batch, DrainReport, ItemSink, PendingQueue};
pub use timer::Timer;
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};

#[cfg(test)]
mod test_helpers;
