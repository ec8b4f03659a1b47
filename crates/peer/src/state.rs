// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Peer state shared by all connections.
//!
//! Records every distinct download the peer accepted, keyed by request id,
//! so a relay re-delivering after a reconnect does not start a file twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use relay_core::DownloadRequest;

/// How the peer presents itself to relays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOptions {
    /// Version reported in the `version` frame.
    pub client_version: String,
    /// Newest relay version the peer knows about.
    pub latest_version: String,
    /// Send an `alive` signal after the `version` frame.
    pub require_alive: bool,
}

impl Default for PeerOptions {
    fn default() -> Self {
        PeerOptions {
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            latest_version: env!("CARGO_PKG_VERSION").to_string(),
            require_alive: false,
        }
    }
}

/// Shared peer state.
#[derive(Clone)]
pub struct PeerState {
    inner: Arc<PeerStateInner>,
}

struct PeerStateInner {
    options: PeerOptions,
    /// Request ids already accepted.
    seen: Mutex<HashSet<String>>,
    /// Accepted downloads in arrival order.
    downloads: Mutex<Vec<DownloadRequest>>,
    heartbeats: AtomicU64,
}

impl PeerState {
    pub fn new(options: PeerOptions) -> Self {
        PeerState {
            inner: Arc::new(PeerStateInner {
                options,
                seen: Mutex::new(HashSet::new()),
                downloads: Mutex::new(Vec::new()),
                heartbeats: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &PeerOptions {
        &self.inner.options
    }

    /// Records a download.
    ///
    /// Returns false if a download with the same request id was already
    /// accepted. Requests without an id are never treated as duplicates.
    pub async fn accept_download(&self, request: DownloadRequest) -> bool {
        if !request.request_id.is_empty() {
            let mut seen = self.inner.seen.lock().await;
            if !seen.insert(request.request_id.clone()) {
                return false;
            }
        }
        self.inner.downloads.lock().await.push(request);
        true
    }

    /// Accepted downloads in arrival order.
    pub async fn downloads(&self) -> Vec<DownloadRequest> {
        self.inner.downloads.lock().await.clone()
    }

    pub fn record_heartbeat(&self) {
        self.inner.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    /// Heartbeats received over all connections.
    pub fn heartbeats(&self) -> u64 {
        self.inner.heartbeats.load(Ordering::Relaxed)
    }
}
