// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing notifications and their rate limiting.
//!
//! The [`NotificationCoalescer`] shows at most one notification per cooldown
//! window. Notifications arriving inside a window are buffered; when the
//! window ends a single buffered notification is shown as is, several are
//! merged into one summary. Counts survive merging even when the individual
//! lines do not.

use std::time::Duration;

use tokio::time::Instant;

use super::queue::{Batch, DrainReport};
use super::timer::Timer;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A download was handed to the download manager.
    Sent,
    /// Downloads were queued while the download manager was unreachable.
    Queued,
    /// A drain pass finished.
    Drained,
    /// An open connection was lost.
    Disconnected,
    /// The capped reconnect policy gave up.
    MaxAttempts,
    /// Several notifications merged into one.
    Summary,
}

/// A notification ready for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Number of downloads this notification accounts for.
    pub count: usize,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        count: usize,
    ) -> Self {
        Notification {
            kind,
            title: title.into(),
            message: message.into(),
            count,
        }
    }

    pub fn sent(filename: &str) -> Self {
        Notification::new(NotificationKind::Sent, "Download sent", filename, 1)
    }

    /// One notification for everything queued in a batch window.
    pub fn queued(batch: &Batch) -> Self {
        let title = match batch.count() {
            1 => "Download queued".to_string(),
            n => format!("{} downloads queued", n),
        };
        Notification::new(
            NotificationKind::Queued,
            title,
            batch.filenames.join(", "),
            batch.count(),
        )
    }

    pub fn drained(report: &DrainReport) -> Self {
        Notification::new(
            NotificationKind::Drained,
            "Queued downloads sent",
            format!(
                "delivered {}/{} queued downloads",
                report.succeeded, report.total
            ),
            report.succeeded,
        )
    }

    pub fn disconnected(reason: &str) -> Self {
        Notification::new(
            NotificationKind::Disconnected,
            "Download manager disconnected",
            reason,
            0,
        )
    }

    pub fn max_attempts(message: &str) -> Self {
        Notification::new(
            NotificationKind::MaxAttempts,
            "Cannot reach the download manager",
            message,
            0,
        )
    }

    /// Merges `notifications`, listing at most `display_cap` of them.
    fn merge(notifications: &[Notification], display_cap: usize) -> Self {
        let k = notifications.len();
        let mut lines: Vec<String> = notifications
            .iter()
            .take(display_cap)
            .map(|n| format!("{}: {}", n.title, n.message))
            .collect();
        if k > display_cap {
            lines.push(format!("and {} more", k - display_cap));
        }
        Notification::new(
            NotificationKind::Summary,
            format!("{} updates", k),
            lines.join("\n"),
            notifications.iter().map(|n| n.count).sum(),
        )
    }
}

/// Presentation-layer sink for shown notifications.
pub trait Notifier: Send {
    fn show(&mut self, notification: &Notification);
}

/// Renders notifications through the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&mut self, notification: &Notification) {
        tracing::info!(
            target: "dlrelay::notify",
            kind = ?notification.kind,
            count = notification.count,
            "{}: {}",
            notification.title,
            notification.message
        );
    }
}

/// Rate limiter for notifications.
#[derive(Debug)]
pub struct NotificationCoalescer {
    cooldown: Duration,
    display_cap: usize,
    buffer: Vec<Notification>,
    last_shown: Option<Instant>,
    timer: Timer,
    shown: u64,
}

impl NotificationCoalescer {
    pub fn new(cooldown: Duration, display_cap: usize) -> Self {
        NotificationCoalescer {
            cooldown,
            display_cap: display_cap.max(1),
            buffer: Vec::new(),
            last_shown: None,
            timer: Timer::new(),
            shown: 0,
        }
    }

    /// Offers a notification. Returns it back when it may be shown now.
    pub fn notify(&mut self, notification: Notification, now: Instant) -> Option<Notification> {
        let window_end = self.last_shown.map(|at| at + self.cooldown);
        let idle = window_end.map_or(true, |end| now >= end);

        if idle && self.buffer.is_empty() {
            return Some(self.mark_shown(notification, now));
        }

        self.buffer.push(notification);
        if !self.timer.is_armed() {
            self.timer.arm(window_end.map_or(now, |end| end.max(now)));
        }
        None
    }

    /// Deadline of the pending cooldown check.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Number of buffered notifications.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Notifications shown so far, merged ones counting once.
    pub fn shown(&self) -> u64 {
        self.shown
    }

    /// Releases the buffer once the cooldown has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<Notification> {
        if !self.timer.fire(now) {
            return None;
        }
        let notification = match self.buffer.len() {
            0 => return None,
            1 => self.buffer.pop()?,
            _ => {
                let merged = Notification::merge(&self.buffer, self.display_cap);
                self.buffer.clear();
                merged
            }
        };
        Some(self.mark_shown(notification, now))
    }

    fn mark_shown(&mut self, notification: Notification, now: Instant) -> Notification {
        self.last_shown = Some(now);
        self.shown += 1;
        notification
    }
}
