// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle for the link to the download manager.
//!
//! The [`ConnectionManager`] owns the transport, the [`ConnectionState`],
//! the [`ReconnectPolicy`] and the heartbeat monitor. It never calls back
//! into the orchestrator: state changes the orchestrator must react to are
//! recorded as [`ConnectionEvent`]s and collected with
//! [`ConnectionManager::take_events`] after every call.
//!
//! A connection attempt never blocks the caller. [`connect`] moves the
//! transport into a pending dial; the event loop waits on it through
//! [`next_activity`] alongside everything else and hands the outcome back
//! with [`on_dialed`]. While the dial is pending the state is `Connecting`.
//!
//! Every transition is mirrored to the store so a presentation layer can
//! show the connection status without talking to the relay.
//!
//! [`connect`]: ConnectionManager::connect
//! [`next_activity`]: ConnectionManager::next_activity
//! [`on_dialed`]: ConnectionManager::on_dialed

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use relay_core::protocol::{ClientMessage, ServerMessage};
use relay_core::{
    ConnectionState, LinkEvent, ReconnectMode, ReconnectPolicy, RetryDecision, WorkItem,
};
use serde_json::{json, Map};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::heartbeat::HeartbeatMonitor;
use super::queue::ItemSink;
use super::timer::{earliest, Timer};
use super::transport::{Transport, TransportError, TransportResult, WebSocketTransport};
use crate::store::{keys, Store};

/// Text shown once the capped policy gives up.
pub const MAX_ATTEMPTS_MESSAGE: &str =
    "max reconnect attempts exceeded; make sure the download manager is running, then reconnect";

/// Text shown while a signal-gated relay waits for the download manager.
pub const AWAITING_SIGNAL_MESSAGE: &str = "connection lost, waiting for the download manager";

/// Settings for the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// WebSocket URL of the download manager.
    pub url: String,
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
    /// Treat the link as connected only after the peer sends `alive`.
    pub require_liveness: bool,
    /// Answer the peer's `alive` with an `alive` echo.
    pub echo_alive: bool,
    pub mode: ReconnectMode,
    /// Fixed delay between reconnect attempts.
    pub interval: Duration,
    /// Heartbeat period; zero disables the heartbeat.
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            url: "ws://localhost:20971".to_string(),
            connect_timeout: Duration::from_secs(5),
            require_liveness: false,
            echo_alive: true,
            mode: ReconnectMode::Capped { max_attempts: 10 },
            interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// State changes reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport opened. `state` is `Connected`, or `AwaitingSignal`
    /// when liveness is required.
    Opened { state: ConnectionState },
    /// The peer confirmed liveness (`AwaitingSignal -> Connected`).
    Live,
    /// A connection attempt failed or an open link dropped.
    Lost {
        error: String,
        was_open: bool,
        retry: RetryDecision,
    },
}

/// What the link produced while the event loop waited on it.
#[derive(Debug)]
pub enum LinkActivity {
    /// The pending connection attempt settled.
    Dialed(TransportResult<()>),
    /// A frame, a close or a receive error from the open link.
    Frame(TransportResult<Option<ServerMessage>>),
}

type Attempt<T> = Pin<Box<dyn Future<Output = (T, TransportResult<()>)> + Send>>;

/// A connection attempt in flight. The transport rides along and comes
/// back with the outcome.
struct Dial<T> {
    attempt: Attempt<T>,
    cancel: oneshot::Sender<()>,
}

/// Owns the transport and drives reconnects.
pub struct ConnectionManager<T: Transport = WebSocketTransport> {
    config: ConnectionConfig,
    /// `None` while a dial owns it.
    transport: Option<T>,
    dial: Option<Dial<T>>,
    state: ConnectionState,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatMonitor,
    retry_timer: Timer,
    exhausted: bool,
    last_error: Option<String>,
    connected_since: Option<DateTime<Utc>>,
    store: Arc<dyn Store>,
    events: Vec<ConnectionEvent>,
}

impl ConnectionManager<WebSocketTransport> {
    /// Creates a manager using the WebSocket transport.
    pub fn new(config: ConnectionConfig, store: Arc<dyn Store>) -> Self {
        Self::with_transport(config, WebSocketTransport::new(), store)
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager with a custom transport (for testing).
    pub fn with_transport(config: ConnectionConfig, transport: T, store: Arc<dyn Store>) -> Self {
        ConnectionManager {
            policy: ReconnectPolicy::new(config.mode, config.interval),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval),
            config,
            transport: Some(transport),
            dial: None,
            state: ConnectionState::Disconnected,
            retry_timer: Timer::new(),
            exhausted: false,
            last_error: None,
            connected_since: None,
            store,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while the transport is open (`Connected` or `AwaitingSignal`).
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True while a connection attempt is pending.
    pub fn is_dialing(&self) -> bool {
        self.dial.is_some()
    }

    /// True when [`next_activity`](Self::next_activity) has something to wait on.
    pub fn is_active(&self) -> bool {
        self.is_dialing() || self.is_open()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// True once the capped policy has given up.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// User-visible description of the last failure, cleared on connect.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connected_since
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// When the next scheduled reconnect fires.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_timer.deadline()
    }

    /// Earliest timer the event loop must wake up for.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.retry_timer.deadline(), self.heartbeat.deadline()])
    }

    /// Drains the recorded events.
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Starts a connection attempt. No-op while connecting or open.
    ///
    /// An attempt that settles straight away is handled before returning;
    /// otherwise it stays pending until the event loop sees it through
    /// [`next_activity`](Self::next_activity).
    pub async fn connect(&mut self, now: Instant) {
        if self.state != ConnectionState::Disconnected || self.is_dialing() {
            return;
        }
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        self.retry_timer.cancel();
        self.state = self.state.next(LinkEvent::Connect, self.config.require_liveness);
        self.policy.record_attempt();
        tracing::debug!(
            "connecting to {} (attempt {})",
            self.config.url,
            self.policy.attempts()
        );
        self.persist().await;

        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;
        let (cancel, cancelled) = oneshot::channel::<()>();
        let attempt: Attempt<T> = Box::pin(async move {
            let result = tokio::select! {
                outcome = tokio::time::timeout(timeout, transport.connect(&url)) => {
                    outcome.unwrap_or(Err(TransportError::Timeout(timeout)))
                }
                _ = cancelled => Err(TransportError::Cancelled),
            };
            (transport, result)
        });
        self.dial = Some(Dial { attempt, cancel });

        let settled = self
            .dial
            .as_mut()
            .and_then(|dial| dial.attempt.as_mut().now_or_never());
        if let Some((transport, result)) = settled {
            self.dial = None;
            self.transport = Some(transport);
            self.on_dialed(result, now).await;
        }
    }

    /// Waits for the pending dial to settle or, once open, for the next
    /// frame. Cancel-safe: a dropped wait leaves the dial in place.
    pub async fn next_activity(&mut self) -> LinkActivity {
        if let Some(dial) = self.dial.as_mut() {
            let (transport, result) = dial.attempt.as_mut().await;
            self.dial = None;
            self.transport = Some(transport);
            return LinkActivity::Dialed(result);
        }
        LinkActivity::Frame(self.recv().await)
    }

    /// Applies the outcome of a connection attempt. `now` is when it settled.
    pub async fn on_dialed(&mut self, result: TransportResult<()>, now: Instant) {
        match result {
            Ok(()) => self.opened(now).await,
            Err(TransportError::Cancelled) => {}
            Err(e) => self.fail(now, e).await,
        }
    }

    /// Closes the link and cancels any pending attempt or scheduled
    /// reconnect.
    ///
    /// Does not schedule a reconnect of its own.
    pub async fn disconnect(&mut self) {
        self.retry_timer.cancel();
        self.heartbeat.detach();
        self.abandon_dial().await;
        self.close_transport().await;
        self.state = self.state.next(LinkEvent::Disconnect, self.config.require_liveness);
        self.connected_since = None;
        self.persist().await;
    }

    /// Connects with a fresh attempt counter unless the link is open.
    ///
    /// Refused (returns false) once the capped policy is exhausted; only
    /// [`manual_reconnect`](Self::manual_reconnect) or [`reset`](Self::reset)
    /// leave that condition.
    pub async fn reconnect(&mut self, now: Instant) -> bool {
        if self.is_active() {
            return true;
        }
        if self.exhausted {
            tracing::info!("reconnect refused: {}", MAX_ATTEMPTS_MESSAGE);
            return false;
        }
        self.policy.reset();
        self.connect(now).await;
        true
    }

    /// User-initiated reconnect; clears the exhausted condition.
    pub async fn manual_reconnect(&mut self, now: Instant) {
        if self.is_active() {
            return;
        }
        tracing::info!("manual reconnect requested");
        self.exhausted = false;
        self.policy.reset();
        self.connect(now).await;
    }

    /// Drops the current link and connects afresh.
    pub async fn reset(&mut self, now: Instant) {
        tracing::info!("resetting connection");
        self.disconnect().await;
        self.exhausted = false;
        self.last_error = None;
        self.policy.reset();
        self.connect(now).await;
    }

    /// External liveness signal from the download manager.
    pub async fn on_external_signal(&mut self, now: Instant) {
        match self.state {
            ConnectionState::AwaitingSignal => self.mark_live().await,
            ConnectionState::Disconnected
                if self.policy.mode() == ReconnectMode::SignalGated =>
            {
                tracing::info!("download manager signalled, reconnecting");
                self.policy.reset();
                self.connect(now).await;
            }
            _ => tracing::debug!("ignoring liveness signal in state {}", self.state),
        }
    }

    /// Handles the peer's `alive` frame.
    pub async fn on_alive(&mut self, now: Instant) {
        if !self.is_open() {
            return;
        }
        if self.config.echo_alive {
            self.send_message(ClientMessage::alive(), now).await;
        }
        if self.state == ConnectionState::AwaitingSignal {
            self.mark_live().await;
        }
    }

    /// Records a heartbeat acknowledgement.
    pub fn on_heartbeat_ack(&mut self, now: Instant) {
        self.heartbeat.acknowledge(now);
    }

    /// Sends `msg` if the link is open.
    ///
    /// Never queues. A failed send tears the link down like a close.
    pub async fn send(&mut self, msg: ClientMessage) -> bool {
        self.send_message(msg, Instant::now()).await
    }

    /// Waits for the next frame from the peer.
    pub async fn recv(&mut self) -> TransportResult<Option<ServerMessage>> {
        match self.transport.as_mut() {
            Some(transport) => transport.recv().await,
            None => Err(TransportError::NotConnected),
        }
    }

    /// Handles the outcome of [`recv`](Self::recv).
    ///
    /// Returns the frame for the caller to dispatch; closes and errors are
    /// handled here.
    pub async fn on_received(
        &mut self,
        result: TransportResult<Option<ServerMessage>>,
        now: Instant,
    ) -> Option<ServerMessage> {
        match result {
            Ok(Some(msg)) => Some(msg),
            Ok(None) => {
                self.fail(now, TransportError::PeerClosed).await;
                None
            }
            Err(e) => {
                self.fail(now, e).await;
                None
            }
        }
    }

    /// Fires due timers: scheduled reconnects and heartbeats.
    pub async fn tick(&mut self, now: Instant) {
        if self.retry_timer.fire(now) {
            self.connect(now).await;
        }
        if let Some(beat) = self.heartbeat.due(now) {
            if !self.send_message(beat, now).await {
                tracing::warn!("heartbeat failed, dropping connection");
            }
        }
    }

    async fn send_message(&mut self, msg: ClientMessage, now: Instant) -> bool {
        if !self.is_open() {
            return false;
        }
        let result = match self.transport.as_mut() {
            Some(transport) if transport.is_connected() => transport.send(msg).await,
            _ => return false,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                self.fail(now, e).await;
                false
            }
        }
    }

    /// Settles a pending dial as cancelled and takes the transport back.
    async fn abandon_dial(&mut self) {
        let Some(Dial { attempt, cancel }) = self.dial.take() else {
            return;
        };
        drop(cancel);
        let (transport, result) = attempt.await;
        tracing::debug!("abandoned connection attempt ({:?})", result.err());
        self.transport = Some(transport);
    }

    async fn close_transport(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if transport.is_connected() {
            if let Err(e) = transport.disconnect().await {
                tracing::debug!("error closing transport: {}", e);
            }
        }
    }

    async fn opened(&mut self, now: Instant) {
        self.state = self.state.next(LinkEvent::Open, self.config.require_liveness);
        if !self.is_open() {
            // disconnect() raced the attempt
            self.close_transport().await;
            return;
        }
        tracing::info!("connected to {} ({})", self.config.url, self.state);
        self.policy.reset();
        self.exhausted = false;
        self.last_error = None;
        self.connected_since = Some(Utc::now());
        self.heartbeat.attach(now);
        self.events.push(ConnectionEvent::Opened { state: self.state });
        self.persist().await;
    }

    async fn mark_live(&mut self) {
        self.state = self.state.next(LinkEvent::Alive, self.config.require_liveness);
        tracing::info!("download manager is alive");
        self.events.push(ConnectionEvent::Live);
        self.persist().await;
    }

    /// Tears the link down after a failure and consults the policy.
    ///
    /// `now` is when the failure was observed; the retry interval runs
    /// from there.
    async fn fail(&mut self, now: Instant, error: TransportError) {
        let was_open = self.is_open();
        self.state = self.state.next(LinkEvent::Error, self.config.require_liveness);
        self.heartbeat.detach();
        self.connected_since = None;
        self.close_transport().await;

        let retry = self.policy.decide();
        let message = match retry {
            RetryDecision::Retry(delay) => {
                self.retry_timer.arm_after(now, delay);
                let what = if error.is_refused() {
                    "download manager not running"
                } else {
                    "connection failed"
                };
                match self.policy.max_attempts() {
                    Some(max) => format!("{}, retrying ({}/{})", what, self.policy.attempts(), max),
                    None => format!("{}, retrying", what),
                }
            }
            RetryDecision::Exhausted => {
                self.exhausted = true;
                MAX_ATTEMPTS_MESSAGE.to_string()
            }
            RetryDecision::AwaitSignal => AWAITING_SIGNAL_MESSAGE.to_string(),
        };

        let cause = error.to_string();
        if was_open {
            tracing::warn!("connection to {} lost: {}", self.config.url, cause);
        } else if error.is_refused() {
            // Routine while the download manager is not running
            tracing::info!("connection to {} refused", self.config.url);
        } else {
            tracing::warn!("connection to {} failed: {}", self.config.url, cause);
        }
        if retry == RetryDecision::Exhausted {
            tracing::error!("{}", MAX_ATTEMPTS_MESSAGE);
        }

        self.last_error = Some(message);
        self.events.push(ConnectionEvent::Lost {
            error: cause,
            was_open,
            retry,
        });
        self.persist().await;
    }

    /// Mirrors the connection status into the store.
    async fn persist(&mut self) {
        let mut values = Map::new();
        values.insert(keys::CONNECTION_STATE.into(), json!(self.state.as_str()));
        values.insert(keys::IS_CONNECTED.into(), json!(self.is_open()));
        let status = if self.is_open() { "online" } else { "offline" };
        values.insert(keys::CLIENT_STATUS.into(), json!(status));
        values.insert(keys::RECONNECT_ATTEMPTS.into(), json!(self.policy.attempts()));
        if let Some(error) = &self.last_error {
            values.insert(keys::CONNECTION_ERROR.into(), json!(error));
        }

        if let Err(e) = self.store.set(values).await {
            tracing::warn!("failed to persist connection state: {}", e);
        }
        if self.last_error.is_none() {
            if let Err(e) = self.store.remove(keys::CONNECTION_ERROR).await {
                tracing::warn!("failed to clear connection error: {}", e);
            }
        }
    }
}

impl<T: Transport> ItemSink for ConnectionManager<T> {
    fn deliver<'a>(
        &'a mut self,
        item: &'a WorkItem,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            if !self.is_connected() {
                return false;
            }
            self.send(ClientMessage::download(item)).await
        })
    }
}
