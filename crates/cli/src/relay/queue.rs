// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, persisted queue of downloads waiting for the download manager.
//!
//! The queue is FIFO with a fixed capacity; enqueueing into a full queue
//! evicts the oldest item. Every mutation writes the undelivered items to
//! the store under `pendingDownloads`, so a restart resumes where it left off.
//!
//! Draining works on a snapshot: the live queue is moved into a drain pass
//! and cleared before the first send, so items enqueued while the pass runs
//! land in the next cycle. A pass can run to completion with [`PendingQueue::drain`]
//! or be stepped one item at a time by the event loop.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::WorkItem;
use serde_json::Value;
use tokio::time::Instant;

use super::timer::Timer;
use crate::store::{self, keys, Store};

/// Destination for queued items during a drain.
pub trait ItemSink: Send {
    /// Attempts to deliver `item`. Returns true if it was handed over.
    fn deliver<'a>(
        &'a mut self,
        item: &'a WorkItem,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Outcome of a complete drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub total: usize,
}

impl DrainReport {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Items enqueued within one batch window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub filenames: Vec<String>,
}

impl Batch {
    pub fn count(&self) -> usize {
        self.filenames.len()
    }
}

#[derive(Debug, Default)]
struct DrainPass {
    remaining: VecDeque<WorkItem>,
    /// Request ids that have been part of this pass; `total` counts each once.
    seen: HashSet<String>,
    total: usize,
    succeeded: usize,
}

impl DrainPass {
    fn absorb(&mut self, items: impl IntoIterator<Item = WorkItem>) {
        for item in items {
            if self.seen.insert(item.request_id().to_string()) {
                self.total += 1;
            }
            self.remaining.push_back(item);
        }
    }
}

/// The relay's pending queue.
pub struct PendingQueue {
    items: VecDeque<WorkItem>,
    capacity: usize,
    evicted: u64,
    pass: Option<DrainPass>,
    batch: Vec<String>,
    batch_window: Duration,
    batch_timer: Timer,
    store: Arc<dyn Store>,
}

impl PendingQueue {
    /// Creates an empty queue.
    pub fn new(store: Arc<dyn Store>, capacity: usize, batch_window: Duration) -> Self {
        PendingQueue {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            evicted: 0,
            pass: None,
            batch: Vec::new(),
            batch_window,
            batch_timer: Timer::new(),
            store,
        }
    }

    /// Restores the queue persisted in `store`.
    ///
    /// Entries that no longer parse or validate are dropped with a warning.
    /// When the snapshot is larger than `capacity`, the newest items win.
    pub async fn load(store: Arc<dyn Store>, capacity: usize, batch_window: Duration) -> Self {
        let mut queue = PendingQueue::new(Arc::clone(&store), capacity, batch_window);

        let snapshot = match store::get_one(store.as_ref(), keys::PENDING_DOWNLOADS).await {
            Ok(Some(Value::Array(entries))) => entries,
            Ok(Some(other)) => {
                tracing::warn!("ignoring malformed pending queue snapshot: {}", other);
                return queue;
            }
            Ok(None) => return queue,
            Err(e) => {
                tracing::warn!("failed to read pending queue: {}", e);
                return queue;
            }
        };

        for entry in snapshot {
            match serde_json::from_value::<WorkItem>(entry) {
                Ok(item) if item.validate().is_ok() => queue.push_bounded(item),
                Ok(item) => tracing::warn!("dropping invalid queued download {}", item.url),
                Err(e) => tracing::warn!("dropping unreadable queued download: {}", e),
            }
        }

        if !queue.items.is_empty() {
            tracing::info!("restored {} queued downloads", queue.items.len());
        }
        queue
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items dropped by drop-oldest eviction.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Live items in delivery order.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub fn is_draining(&self) -> bool {
        self.pass.is_some()
    }

    /// Items of the current drain pass not yet attempted.
    pub fn in_flight(&self) -> usize {
        self.pass.as_ref().map_or(0, |p| p.remaining.len())
    }

    /// Appends `item`, evicting the oldest item when full, and opens a
    /// batch window if none is open. Returns the new length.
    pub async fn enqueue(&mut self, item: WorkItem, now: Instant) -> usize {
        self.batch.push(item.filename.clone());
        if !self.batch_timer.is_armed() {
            self.batch_timer.arm_after(now, self.batch_window);
        }
        self.push_bounded(item);
        self.persist().await;
        self.items.len()
    }

    /// Discards every queued item, the open batch and any unfinished drain
    /// pass. Returns the number of items discarded.
    pub async fn clear(&mut self) -> usize {
        let discarded = self.items.len() + self.in_flight();
        self.items.clear();
        self.pass = None;
        self.batch.clear();
        self.batch_timer.cancel();
        self.persist().await;
        discarded
    }

    /// Deadline of the open batch window.
    pub fn batch_deadline(&self) -> Option<Instant> {
        self.batch_timer.deadline()
    }

    /// Closes the batch window if it has elapsed.
    pub fn flush_batch(&mut self, now: Instant) -> Option<Batch> {
        if !self.batch_timer.fire(now) {
            return None;
        }
        let filenames = std::mem::take(&mut self.batch);
        if filenames.is_empty() {
            None
        } else {
            Some(Batch { filenames })
        }
    }

    /// Starts a drain pass over a snapshot of the live queue.
    ///
    /// If a pass is already running, the live items join it instead; items
    /// the pass already failed to deliver are not counted twice.
    /// Returns true when a new pass was started.
    pub async fn begin_drain(&mut self) -> bool {
        let snapshot: Vec<WorkItem> = self.items.drain(..).collect();
        let started = match self.pass.as_mut() {
            Some(pass) => {
                pass.absorb(snapshot);
                false
            }
            None if snapshot.is_empty() => return false,
            None => {
                let mut pass = DrainPass::default();
                pass.absorb(snapshot);
                self.pass = Some(pass);
                true
            }
        };
        self.persist().await;
        started
    }

    /// Attempts the next item of the current pass.
    ///
    /// A failed item goes back into the live queue. Returns the report once
    /// the pass has no items left.
    pub async fn drain_step(&mut self, sink: &mut dyn ItemSink) -> Option<DrainReport> {
        let next = self.pass.as_mut()?.remaining.pop_front();

        if let Some(mut item) = next {
            item.mark_attempt(Utc::now());
            if sink.deliver(&item).await {
                if let Some(pass) = self.pass.as_mut() {
                    pass.succeeded += 1;
                }
            } else {
                tracing::debug!("re-queueing {} after failed delivery", item.filename);
                self.push_bounded(item);
            }
            self.persist().await;
        }

        let finished = self.pass.as_ref().is_some_and(|p| p.remaining.is_empty());
        if !finished {
            return None;
        }
        self.pass.take().map(|p| DrainReport {
            succeeded: p.succeeded,
            total: p.total,
        })
    }

    /// Runs a complete drain pass, pausing `delay` between items.
    pub async fn drain(&mut self, sink: &mut dyn ItemSink, delay: Duration) -> DrainReport {
        self.begin_drain().await;
        let mut first = true;
        loop {
            if self.pass.is_none() {
                return DrainReport::default();
            }
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            first = false;
            if let Some(report) = self.drain_step(sink).await {
                return report;
            }
        }
    }

    fn push_bounded(&mut self, item: WorkItem) {
        while self.items.len() >= self.capacity {
            if let Some(oldest) = self.items.pop_front() {
                self.evicted += 1;
                tracing::warn!(
                    "pending queue full ({}), dropping oldest download {}",
                    self.capacity,
                    oldest.url
                );
            }
        }
        self.items.push_back(item);
    }

    /// Writes the undelivered items, oldest first, to the store.
    async fn persist(&self) {
        let in_flight = self.pass.iter().flat_map(|p| p.remaining.iter());
        let snapshot: Vec<&WorkItem> = in_flight.chain(self.items.iter()).collect();
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("failed to serialize pending queue: {}", e);
                return;
            }
        };
        if let Err(e) = store::set_one(self.store.as_ref(), keys::PENDING_DOWNLOADS, value).await {
            tracing::warn!("failed to persist pending queue: {}", e);
        }
    }
}
