// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery orchestrator: the relay's composition root.
//!
//! [`Relay`] owns the connection manager, the pending queue and the
//! notification coalescer. It routes each accepted download either straight
//! to the download manager or into the queue, drains the queue whenever the
//! link becomes connected, and turns connection and queue events into
//! notifications.
//!
//! All state lives on one task. [`Relay::run`] is a `tokio::select!` loop
//! over the input channel, inbound frames (while the link is open) and the
//! earliest armed timer; no handler blocks the loop for longer than one I/O
//! call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::protocol::{ClientMessage, ResponseStatus, ServerMessage};
use relay_core::{is_version_newer, ConnectionState, DownloadEvent, RetryDecision, WorkItem};
use relay_ipc::{ConnectionStatus, ControlRequest, ControlResponse};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, LinkActivity};
use super::notify::{Notification, NotificationCoalescer, Notifier};
use super::queue::PendingQueue;
use super::timer::{earliest, Timer};
use super::transport::{Transport, WebSocketTransport};
use crate::store::{self, keys, Store};

/// Version reported by this relay when comparing with the download manager.
pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub connection: ConnectionConfig,
    /// Maximum number of queued downloads.
    pub queue_capacity: usize,
    /// Pause between items while draining.
    pub drain_delay: Duration,
    /// Window grouping queued items into one notification.
    pub batch_window: Duration,
    /// Minimum time between two shown notifications.
    pub cooldown: Duration,
    /// Lines listed in a merged notification.
    pub display_cap: usize,
    /// `User-Agent` attached to relayed downloads.
    pub user_agent: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            connection: ConnectionConfig::default(),
            queue_capacity: 50,
            drain_delay: Duration::from_millis(300),
            batch_window: Duration::from_secs(3),
            cooldown: Duration::from_secs(10),
            display_cap: 5,
            user_agent: None,
        }
    }
}

/// Errors surfaced to whoever submitted a download or a command.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid download: {0}")]
    Validation(#[from] relay_core::Error),

    #[error("max reconnect attempts exceeded ({attempts} attempts)\n  hint: make sure the download manager is running, then use a manual reconnect")]
    MaxAttemptsExceeded { attempts: u32 },
}

/// How a submitted download was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the download manager.
    Sent,
    /// Held in the pending queue at `position` (1-based queue length).
    Queued { position: usize },
    /// Dropped because interception is disabled.
    Ignored,
}

/// Inputs to the relay event loop.
#[derive(Debug)]
pub enum Input {
    /// A download started on the host.
    Download(DownloadEvent),
    /// External liveness signal from the download manager.
    Signal,
    /// A command from the presentation layer.
    Control {
        request: ControlRequest,
        reply: oneshot::Sender<ControlResponse>,
    },
    /// Stop the event loop.
    Shutdown,
}

enum Step {
    Input(Option<Input>),
    Link(LinkActivity),
    Timer,
}

/// The relay.
pub struct Relay<T: Transport = WebSocketTransport> {
    config: RelayConfig,
    connection: ConnectionManager<T>,
    queue: PendingQueue,
    coalescer: NotificationCoalescer,
    notifier: Box<dyn Notifier>,
    store: Arc<dyn Store>,
    drain_timer: Timer,
    enabled: bool,
    client_version: Option<String>,
    latest_relay_version: Option<String>,
}

impl Relay<WebSocketTransport> {
    /// Creates a relay talking WebSocket, restoring state from `store`.
    pub async fn open(
        config: RelayConfig,
        store: Arc<dyn Store>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self::open_with_transport(config, WebSocketTransport::new(), store, notifier).await
    }
}

impl<T: Transport> Relay<T> {
    /// Creates a relay with a custom transport (for testing).
    pub async fn open_with_transport(
        config: RelayConfig,
        transport: T,
        store: Arc<dyn Store>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let connection = ConnectionManager::with_transport(
            config.connection.clone(),
            transport,
            Arc::clone(&store),
        );
        let queue =
            PendingQueue::load(Arc::clone(&store), config.queue_capacity, config.batch_window)
                .await;
        let coalescer = NotificationCoalescer::new(config.cooldown, config.display_cap);

        let saved = store
            .get(&[
                keys::RELAY_DISABLED,
                keys::CLIENT_VERSION,
                keys::LATEST_RELAY_VERSION,
            ])
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("failed to read relay settings: {}", e);
                Map::new()
            });
        let enabled = !saved
            .get(keys::RELAY_DISABLED)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let string_at = |key: &str| saved.get(key).and_then(Value::as_str).map(str::to_string);

        Relay {
            client_version: string_at(keys::CLIENT_VERSION),
            latest_relay_version: string_at(keys::LATEST_RELAY_VERSION),
            config,
            connection,
            queue,
            coalescer,
            notifier,
            store,
            drain_timer: Timer::new(),
            enabled,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn coalescer(&self) -> &NotificationCoalescer {
        &self.coalescer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Earliest timer the event loop must wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.connection.next_deadline(),
            self.queue.batch_deadline(),
            self.coalescer.deadline(),
            self.drain_timer.deadline(),
        ])
    }

    /// Makes the first connection attempt.
    pub async fn start(&mut self, now: Instant) {
        tracing::info!(
            "relay starting: peer {}, mode {}, {} queued",
            self.config.connection.url,
            self.config.connection.mode.name(),
            self.queue.len()
        );
        self.connection.connect(now).await;
        self.process_events(now).await;
    }

    /// Sends `item` now if connected, otherwise queues it.
    ///
    /// Only validation failures are errors; a queued item is a success.
    pub async fn submit(
        &mut self,
        mut item: WorkItem,
        now: Instant,
    ) -> Result<Delivery, RelayError> {
        item.validate()?;

        let sent = if self.connection.is_connected() {
            item.mark_attempt(Utc::now());
            self.connection.send(ClientMessage::download(&item)).await
        } else {
            false
        };

        let delivery = if sent {
            tracing::info!("sent {} to the download manager", item.filename);
            self.show(Notification::sent(&item.filename), now);
            Delivery::Sent
        } else {
            tracing::info!("queued {} ({})", item.filename, item.url);
            let position = self.queue.enqueue(item, now).await;
            Delivery::Queued { position }
        };

        self.process_events(now).await;
        Ok(delivery)
    }

    /// Accepts a host download event.
    pub async fn submit_event(
        &mut self,
        event: DownloadEvent,
        now: Instant,
    ) -> Result<Delivery, RelayError> {
        if !self.enabled {
            tracing::debug!("relay disabled, ignoring download {}", event.final_url);
            return Ok(Delivery::Ignored);
        }
        self.submit_manual(&event, now).await
    }

    async fn submit_manual(
        &mut self,
        event: &DownloadEvent,
        now: Instant,
    ) -> Result<Delivery, RelayError> {
        let item = WorkItem::from_event(event, self.config.user_agent.as_deref())?;
        self.submit(item, now).await
    }

    /// Handles a command from the presentation layer.
    pub async fn handle_request(&mut self, request: ControlRequest, now: Instant) -> ControlResponse {
        tracing::debug!("control request: {}", request.action());
        let response = match request {
            ControlRequest::ResetConnection => {
                self.connection.reset(now).await;
                ControlResponse::ok()
            }
            ControlRequest::Reconnect => {
                if self.connection.reconnect(now).await {
                    ControlResponse::ok()
                } else {
                    let err = RelayError::MaxAttemptsExceeded {
                        attempts: self.connection.policy().attempts(),
                    };
                    ControlResponse::failed(err.to_string())
                }
            }
            ControlRequest::ManualReconnect => {
                self.connection.manual_reconnect(now).await;
                ControlResponse::ok()
            }
            ControlRequest::ClearQueue => {
                let cleared = self.queue.clear().await;
                tracing::info!("cleared {} queued downloads", cleared);
                ControlResponse::ok().with_cleared(cleared)
            }
            ControlRequest::GetConnectionStatus => ControlResponse::ok(),
            ControlRequest::ManualDownload { download_info } => {
                match self.submit_manual(&download_info, now).await {
                    Ok(delivery) => ControlResponse::ok().with_delivered(delivery == Delivery::Sent),
                    Err(e) => ControlResponse::failed(e.to_string()),
                }
            }
            ControlRequest::SetEnabled { enabled } => {
                self.set_enabled(enabled, now).await;
                ControlResponse::ok()
            }
            ControlRequest::Signal => {
                self.connection.on_external_signal(now).await;
                ControlResponse::ok()
            }
        };
        self.process_events(now).await;

        if response.success {
            response.with_status(self.status())
        } else {
            response
        }
    }

    async fn set_enabled(&mut self, enabled: bool, now: Instant) {
        self.enabled = enabled;
        tracing::info!("relay {}", if enabled { "enabled" } else { "disabled" });
        if let Err(e) = store::set_one(self.store.as_ref(), keys::RELAY_DISABLED, json!(!enabled)).await
        {
            tracing::warn!("failed to persist enabled flag: {}", e);
        }
        if enabled {
            self.connection.manual_reconnect(now).await;
        }
    }

    /// External liveness signal.
    pub async fn on_signal(&mut self, now: Instant) {
        self.connection.on_external_signal(now).await;
        self.process_events(now).await;
    }

    /// Handles a frame from the download manager.
    pub async fn handle_message(&mut self, msg: ServerMessage, now: Instant) {
        match msg {
            ServerMessage::Version {
                client_version,
                latest_extension_version,
            } => {
                self.record_versions(client_version, latest_extension_version)
                    .await
            }
            ServerMessage::Heartbeat { .. } => self.connection.on_heartbeat_ack(now),
            ServerMessage::Alive => self.connection.on_alive(now).await,
            ServerMessage::DownloadResponse { status, message } => {
                let message = message.unwrap_or_default();
                match status {
                    ResponseStatus::Success => {
                        tracing::debug!("download manager accepted download: {}", message)
                    }
                    ResponseStatus::Error => {
                        tracing::warn!("download manager rejected download: {}", message)
                    }
                }
            }
            ServerMessage::Unknown => tracing::debug!("ignoring unknown frame"),
        }
        self.process_events(now).await;
    }

    async fn record_versions(&mut self, client_version: String, latest: String) {
        tracing::info!("download manager version {}", client_version);
        if is_version_newer(&latest, RELAY_VERSION) {
            tracing::info!(
                "a newer relay version is available: {} (running {})",
                latest,
                RELAY_VERSION
            );
        }

        let mut values = Map::new();
        values.insert(keys::CLIENT_VERSION.into(), json!(client_version));
        values.insert(keys::LATEST_RELAY_VERSION.into(), json!(latest));
        if let Err(e) = self.store.set(values).await {
            tracing::warn!("failed to persist versions: {}", e);
        }
        self.client_version = Some(client_version);
        self.latest_relay_version = Some(latest);
    }

    /// Fires every due timer.
    pub async fn tick(&mut self, now: Instant) {
        self.connection.tick(now).await;
        self.process_events(now).await;

        if let Some(batch) = self.queue.flush_batch(now) {
            self.show(Notification::queued(&batch), now);
        }

        if self.drain_timer.fire(now) {
            self.drain_step(now).await;
        }

        if let Some(notification) = self.coalescer.tick(now) {
            self.notifier.show(&notification);
        }
    }

    async fn drain_step(&mut self, now: Instant) {
        match self.queue.drain_step(&mut self.connection).await {
            Some(report) => {
                tracing::info!(
                    "drain finished: delivered {}/{} queued downloads",
                    report.succeeded,
                    report.total
                );
                self.show(Notification::drained(&report), now);
            }
            None if self.queue.is_draining() => {
                self.drain_timer.arm_after(now, self.config.drain_delay);
            }
            None => {}
        }
        self.process_events(now).await;
    }

    /// Starts a drain pass, or lets a running pass absorb the live queue.
    async fn start_drain(&mut self, now: Instant) {
        if self.queue.begin_drain().await {
            tracing::info!("draining {} queued downloads", self.queue.in_flight());
        }
        if self.queue.is_draining() && !self.drain_timer.is_armed() {
            self.drain_timer.arm(now);
        }
    }

    /// Reacts to what the connection manager recorded.
    async fn process_events(&mut self, now: Instant) {
        for event in self.connection.take_events() {
            match event {
                ConnectionEvent::Opened {
                    state: ConnectionState::AwaitingSignal,
                } => {
                    tracing::info!("waiting for the download manager to signal liveness");
                }
                ConnectionEvent::Opened { .. } | ConnectionEvent::Live => {
                    if self.connection.is_connected() {
                        self.start_drain(now).await;
                    }
                }
                ConnectionEvent::Lost {
                    error,
                    was_open,
                    retry,
                } => {
                    if was_open {
                        self.show(Notification::disconnected(&error), now);
                    }
                    if retry == RetryDecision::Exhausted {
                        let message = self
                            .connection
                            .last_error()
                            .unwrap_or_default()
                            .to_string();
                        self.show(Notification::max_attempts(&message), now);
                    }
                }
            }
        }
    }

    fn show(&mut self, notification: Notification, now: Instant) {
        if let Some(notification) = self.coalescer.notify(notification, now) {
            self.notifier.show(&notification);
        }
    }

    /// Current connection and queue status.
    pub fn status(&self) -> ConnectionStatus {
        let policy = self.connection.policy();
        let update_available = self
            .latest_relay_version
            .as_deref()
            .is_some_and(|latest| is_version_newer(latest, RELAY_VERSION));

        ConnectionStatus {
            state: self.connection.state(),
            attempts: policy.attempts(),
            max_attempts: policy.max_attempts(),
            max_attempts_exceeded: self.connection.is_exhausted(),
            last_error: self.connection.last_error().map(str::to_string),
            connected_since: self.connection.connected_since(),
            queue_length: self.queue.len() + self.queue.in_flight(),
            queue_capacity: self.queue.capacity(),
            evicted: self.queue.evicted(),
            enabled: self.enabled,
            client_version: self.client_version.clone(),
            latest_relay_version: self.latest_relay_version.clone(),
            update_available,
        }
    }

    async fn handle_input(&mut self, input: Input, now: Instant) {
        match input {
            Input::Download(event) => {
                if let Err(e) = self.submit_event(event, now).await {
                    tracing::warn!("rejected download: {}", e);
                }
            }
            Input::Signal => self.on_signal(now).await,
            Input::Control { request, reply } => {
                let response = self.handle_request(request, now).await;
                if reply.send(response).is_err() {
                    tracing::debug!("control client went away before the reply");
                }
            }
            Input::Shutdown => {}
        }
    }

    /// Runs the event loop until the input channel closes or
    /// [`Input::Shutdown`] arrives, then closes the link.
    pub async fn run(&mut self, inputs: &mut mpsc::Receiver<Input>) {
        self.start(Instant::now()).await;

        loop {
            let deadline = self.next_deadline();
            let link_active = self.connection.is_active();

            let step = tokio::select! {
                input = inputs.recv() => Step::Input(input),
                activity = self.connection.next_activity(), if link_active => Step::Link(activity),
                _ = sleep_until(deadline) => Step::Timer,
            };

            let now = Instant::now();
            match step {
                Step::Input(None) | Step::Input(Some(Input::Shutdown)) => break,
                Step::Input(Some(input)) => self.handle_input(input, now).await,
                Step::Link(LinkActivity::Dialed(result)) => {
                    self.connection.on_dialed(result, now).await;
                    self.process_events(now).await;
                }
                Step::Link(LinkActivity::Frame(result)) => {
                    if let Some(msg) = self.connection.on_received(result, now).await {
                        self.handle_message(msg, now).await;
                    } else {
                        self.process_events(now).await;
                    }
                }
                Step::Timer => self.tick(now).await,
            }
        }

        tracing::info!("relay shutting down, {} queued", self.queue.len());
        self.connection.disconnect().await;
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
