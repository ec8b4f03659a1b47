// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value store consumed by the relay.
//!
//! The relay mirrors its connection state and the pending queue into a
//! store so a presentation layer can render them and so queued downloads
//! survive a restart. Two implementations are provided:
//! - [`MemoryStore`] for tests and ephemeral runs
//! - [`JsonFileStore`], one JSON object file rewritten atomically on every change

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

/// Well-known store keys.
pub mod keys {
    /// Connection state enum string (`disconnected`, `connected`, ...).
    pub const CONNECTION_STATE: &str = "connectionState";
    /// True while the link is open.
    pub const IS_CONNECTED: &str = "isConnected";
    /// `"online"` or `"offline"`.
    pub const CLIENT_STATUS: &str = "clientStatus";
    /// User-visible connection error; absent while connected.
    pub const CONNECTION_ERROR: &str = "connectionError";
    pub const RECONNECT_ATTEMPTS: &str = "reconnectAttempts";
    /// Pending queue snapshot, a JSON array of work items.
    pub const PENDING_DOWNLOADS: &str = "pendingDownloads";
    /// Version of the download manager.
    pub const CLIENT_VERSION: &str = "ClientVersion";
    /// Newest relay version the download manager knows about.
    pub const LATEST_RELAY_VERSION: &str = "LatestExtensionVersion";
    /// True while interception of host downloads is switched off.
    pub const RELAY_DISABLED: &str = "relayDisabled";
}

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by [`Store`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Capacity of the change-notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Async key/value store with change notifications.
pub trait Store: Send + Sync {
    /// Reads the given keys. Absent keys are missing from the result.
    fn get(&self, keys: &[&str]) -> StoreFuture<'_, Map<String, Value>>;

    /// Writes every entry of `values`.
    fn set(&self, values: Map<String, Value>) -> StoreFuture<'_, ()>;

    /// Removes `key` if present.
    fn remove(&self, key: &str) -> StoreFuture<'_, ()>;

    /// Subscribes to change notifications. Each message lists the keys
    /// touched by one `set` or `remove`.
    fn subscribe(&self) -> broadcast::Receiver<Vec<String>>;
}

/// Reads a single key.
pub async fn get_one(store: &dyn Store, key: &str) -> StoreResult<Option<Value>> {
    let mut values = store.get(&[key]).await?;
    Ok(values.remove(key))
}

/// Writes a single key.
pub async fn set_one(store: &dyn Store, key: &str, value: Value) -> StoreResult<()> {
    let mut values = Map::new();
    values.insert(key.to_string(), value);
    store.set(values).await
}

fn select(values: &Map<String, Value>, keys: &[String]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|k| values.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

fn owned_keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// In-memory store.
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStore {
            values: Mutex::new(Map::new()),
            changes,
        }
    }

    /// Returns a copy of every stored entry.
    pub async fn snapshot(&self) -> Map<String, Value> {
        self.values.lock().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, keys: &[&str]) -> StoreFuture<'_, Map<String, Value>> {
        let keys = owned_keys(keys);
        Box::pin(async move {
            let values = self.values.lock().await;
            Ok(select(&values, &keys))
        })
    }

    fn set(&self, values: Map<String, Value>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let touched: Vec<String> = values.keys().cloned().collect();
            self.values.lock().await.extend(values);
            let _ = self.changes.send(touched);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            if self.values.lock().await.remove(&key).is_some() {
                let _ = self.changes.send(vec![key]);
            }
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<String>> {
        self.changes.subscribe()
    }
}

/// Store persisted as one JSON object file.
///
/// Every mutation rewrites the file through a temporary sibling that is
/// fsynced and renamed over the original, so a crash leaves either the old
/// or the new snapshot on disk.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    changes: broadcast::Sender<Vec<String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, creating parent directories.
    ///
    /// A missing or empty file opens as an empty store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let values = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(JsonFileStore {
            path: path.to_path_buf(),
            values: Mutex::new(values),
            changes,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &Map<String, Value>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn get(&self, keys: &[&str]) -> StoreFuture<'_, Map<String, Value>> {
        let keys = owned_keys(keys);
        Box::pin(async move {
            let values = self.values.lock().await;
            Ok(select(&values, &keys))
        })
    }

    fn set(&self, values: Map<String, Value>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let touched: Vec<String> = values.keys().cloned().collect();
            let mut current = self.values.lock().await;
            current.extend(values);
            self.persist(&current).await?;
            drop(current);
            let _ = self.changes.send(touched);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut current = self.values.lock().await;
            if current.remove(&key).is_none() {
                return Ok(());
            }
            self.persist(&current).await?;
            drop(current);
            let _ = self.changes.send(vec![key]);
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<String>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
