// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline-based timers for the relay event loop.
//!
//! A timer is a single optional deadline. Arming it replaces any previous
//! deadline, so at most one instance of each timer kind is ever pending.
//! The event loop sleeps until the earliest armed deadline and then asks
//! each component whether its timer fired.

use std::time::Duration;

use tokio::time::Instant;

/// A one-shot timer that is cancelled by re-arming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Timer { deadline: None }
    }

    /// Arms the timer for `at`, superseding any pending deadline.
    pub fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    /// Arms the timer for `now + delay`.
    pub fn arm_after(&mut self, now: Instant, delay: Duration) {
        self.arm(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes the deadline if it has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// The earliest of several optional deadlines.
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}
