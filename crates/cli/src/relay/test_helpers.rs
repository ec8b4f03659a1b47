// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for relay module tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use relay_core::protocol::{ClientMessage, ServerMessage};
use relay_core::WorkItem;

use super::notify::{Notification, Notifier};
use super::queue::ItemSink;
use super::transport::{Transport, TransportError, TransportFuture, TransportResult};
use crate::store::{self, keys, MemoryStore, Store};

/// Create a work item for `https://x/<n>`.
pub fn make_item(n: usize) -> WorkItem {
    WorkItem::new(format!("https://x/{}", n), format!("file-{}.bin", n)).unwrap()
}

/// Create an in-memory store, returned both concretely and as a trait object.
pub fn memory_store() -> (Arc<MemoryStore>, Arc<dyn Store>) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn Store> = store.clone();
    (store, shared)
}

/// Request ids of the persisted pending queue, oldest first.
pub async fn persisted_ids(store: &dyn Store) -> Vec<String> {
    persisted_items(store)
        .await
        .iter()
        .map(|i| i.request_id().to_string())
        .collect()
}

/// The persisted pending queue, oldest first.
pub async fn persisted_items(store: &dyn Store) -> Vec<WorkItem> {
    match store::get_one(store, keys::PENDING_DOWNLOADS).await.unwrap() {
        Some(value) => serde_json::from_value(value).unwrap(),
        None => Vec::new(),
    }
}

/// Sink that records deliveries and fails for selected URLs.
#[derive(Default)]
pub struct RecordingSink {
    /// Request ids of delivered items, in order.
    pub delivered: Vec<String>,
    /// URLs of attempted items, in order.
    pub attempted: Vec<String>,
    /// URLs whose delivery fails.
    pub failing: HashSet<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(urls: &[&str]) -> Self {
        RecordingSink {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl ItemSink for RecordingSink {
    fn deliver<'a>(
        &'a mut self,
        item: &'a WorkItem,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            self.attempted.push(item.url.clone());
            if self.failing.contains(&item.url) {
                return false;
            }
            self.delivered.push(item.request_id().to_string());
            true
        })
    }
}

/// Notifier that records every shown notification.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    shown: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&mut self, notification: &Notification) {
        self.shown.lock().unwrap().push(notification.clone());
    }
}

/// Transport whose connect never completes, like a peer that accepts the
/// TCP connection but never answers the WebSocket handshake.
#[derive(Clone, Default)]
pub struct StallingTransport {
    connects: Arc<AtomicUsize>,
}

impl StallingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for StallingTransport {
    fn connect(&mut self, _url: &str) -> TransportFuture<'_, ()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending::<TransportResult<()>>())
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn send(&mut self, _msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async { Err(TransportError::NotConnected) })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async { Err(TransportError::NotConnected) })
    }

    fn is_connected(&self) -> bool {
        false
    }
}
