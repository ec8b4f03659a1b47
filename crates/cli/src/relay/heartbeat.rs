// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness heartbeat over an open link.
//!
//! The monitor only decides *when* a heartbeat is due. Sending it, and tearing
//! the link down when the send fails, is the connection manager's job.

use std::time::Duration;

use relay_core::protocol::ClientMessage;
use tokio::time::Instant;

use super::timer::Timer;

/// Heartbeat monitor driven by the relay event loop.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timer: Timer,
    attached: bool,
    sent: u64,
    last_ack: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Creates a detached monitor. A zero interval disables probing.
    pub fn new(interval: Duration) -> Self {
        HeartbeatMonitor {
            interval,
            timer: Timer::new(),
            attached: false,
            sent: 0,
            last_ack: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Starts the heartbeat one interval from `now`. No-op when already attached.
    pub fn attach(&mut self, now: Instant) {
        if self.attached {
            return;
        }
        self.attached = true;
        if self.is_enabled() {
            self.timer.arm_after(now, self.interval);
        }
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.timer.cancel();
    }

    /// Next heartbeat deadline, if attached.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Returns the heartbeat to send if one is due, and schedules the next one.
    pub fn due(&mut self, now: Instant) -> Option<ClientMessage> {
        if !self.attached || !self.timer.fire(now) {
            return None;
        }
        self.timer.arm_after(now, self.interval);
        self.sent += 1;
        Some(ClientMessage::heartbeat())
    }

    /// Records a heartbeat acknowledgement from the peer.
    pub fn acknowledge(&mut self, now: Instant) {
        self.last_ack = Some(now);
    }

    /// Heartbeats handed out since creation.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }
}
