// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine and reconnect policy.
//!
//! [`ConnectionState::next`] is a total function: every [`LinkEvent`] has a
//! defined successor from every state. [`ReconnectPolicy`] decides what
//! happens after a connection is lost.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// State of the link to the download manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket connect in flight.
    Connecting,
    /// Socket open and the manager confirmed alive.
    Connected,
    /// Socket open, waiting for the manager's liveness signal.
    AwaitingSignal,
}

/// Events that drive [`ConnectionState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// `connect()` was called.
    Connect,
    /// The transport opened.
    Open,
    /// The manager sent a liveness signal.
    Alive,
    /// The transport reported an error.
    Error,
    /// The transport closed.
    Close,
    /// `disconnect()` was called.
    Disconnect,
}

impl ConnectionState {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::AwaitingSignal => "awaiting_signal",
        }
    }

    /// True while the transport is open, whether or not liveness is confirmed.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::AwaitingSignal
        )
    }

    /// Computes the state after `event`.
    ///
    /// `liveness_required` selects `AwaitingSignal` over `Connected` when
    /// the transport opens.
    pub fn next(self, event: LinkEvent, liveness_required: bool) -> ConnectionState {
        use ConnectionState::*;

        match (self, event) {
            (Disconnected, LinkEvent::Connect) => Connecting,
            (state, LinkEvent::Connect) => state,

            (Connecting, LinkEvent::Open) if liveness_required => AwaitingSignal,
            (Connecting, LinkEvent::Open) => Connected,
            // A late open after disconnect() is ignored.
            (state, LinkEvent::Open) => state,

            (AwaitingSignal, LinkEvent::Alive) => Connected,
            (state, LinkEvent::Alive) => state,

            (_, LinkEvent::Error | LinkEvent::Close | LinkEvent::Disconnect) => Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnected" => Ok(ConnectionState::Disconnected),
            "connecting" => Ok(ConnectionState::Connecting),
            "connected" => Ok(ConnectionState::Connected),
            "awaiting_signal" => Ok(ConnectionState::AwaitingSignal),
            _ => Err(format!("invalid connection state: '{}'", s)),
        }
    }
}

/// How the relay reconnects after losing the download manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectMode {
    /// Retry forever at a fixed interval.
    Continuous,
    /// Retry at a fixed interval until `max_attempts` connects have failed.
    Capped { max_attempts: u32 },
    /// Never retry on a timer; wait for a liveness signal or a manual command.
    SignalGated,
}

impl ReconnectMode {
    /// Returns the mode name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            ReconnectMode::Continuous => "continuous",
            ReconnectMode::Capped { .. } => "capped",
            ReconnectMode::SignalGated => "signal_gated",
        }
    }
}

/// What to do after a connection attempt failed or the link dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the given delay.
    Retry(Duration),
    /// The capped policy ran out of attempts.
    Exhausted,
    /// Wait for an external liveness signal or a manual reconnect.
    AwaitSignal,
}

/// Attempt counter plus the mode and fixed interval that govern reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    mode: ReconnectMode,
    interval: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy with no recorded attempts.
    pub fn new(mode: ReconnectMode, interval: Duration) -> Self {
        ReconnectPolicy {
            mode,
            interval,
            attempts: 0,
        }
    }

    pub fn mode(&self) -> ReconnectMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Connection attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The attempt cap, if the mode has one.
    pub fn max_attempts(&self) -> Option<u32> {
        match self.mode {
            ReconnectMode::Capped { max_attempts } => Some(max_attempts),
            _ => None,
        }
    }

    /// Counts a connection attempt.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Clears the attempt counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// True when the capped policy has no attempts left.
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts()
            .is_some_and(|max| self.attempts >= max)
    }

    /// Decides what follows a failed attempt or a dropped link.
    pub fn decide(&self) -> RetryDecision {
        match self.mode {
            ReconnectMode::Continuous => RetryDecision::Retry(self.interval),
            ReconnectMode::Capped { .. } if self.is_exhausted() => RetryDecision::Exhausted,
            ReconnectMode::Capped { .. } => RetryDecision::Retry(self.interval),
            ReconnectMode::SignalGated => RetryDecision::AwaitSignal,
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
