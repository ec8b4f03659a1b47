// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Test server utilities and protocol tests.
//!
//! Provides a TestServer that runs on a random port, plus end-to-end tests
//! driving the dlrelay engine against it.

#![cfg(test)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::server;
use crate::state::{PeerOptions, PeerState};

/// A test server that runs on a random port and can be controlled.
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    state: PeerState,
}

impl TestServer {
    /// Start a new test server on a random available port.
    pub async fn start(options: PeerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::start_on(listener, options)
    }

    /// Start a test server on an already bound listener.
    pub fn start_on(listener: TcpListener, options: PeerOptions) -> Self {
        let addr = listener.local_addr().unwrap();
        let state = PeerState::new(options);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state_clone = state.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = server::serve(listener, state_clone) => {
                    if let Err(e) = result {
                        eprintln!("Test server error: {}", e);
                    }
                }
                _ = shutdown_rx => {
                    // Shutdown requested
                }
            }
        });

        TestServer {
            addr,
            shutdown_tx,
            state,
        }
    }

    /// Get the WebSocket URL for connecting to this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get access to the server state for verification.
    pub fn state(&self) -> &PeerState {
        &self.state
    }

    /// Shutdown the test server.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

mod protocol {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use relay_core::{ResponseStatus, ServerMessage};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect(server: &TestServer) -> Ws {
        let (ws, _) = connect_async(server.ws_url()).await.unwrap();
        ws
    }

    async fn next_message(ws: &mut Ws) -> ServerMessage {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        match msg {
            Message::Text(text) => ServerMessage::from_json(&text).unwrap(),
            other => unreachable!("unexpected frame {:?}", other),
        }
    }

    async fn send(ws: &mut Ws, json: serde_json::Value) {
        ws.send(Message::Text(json.to_string().into())).await.unwrap();
    }

    fn download(request_id: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "download",
            "url": "https://example.com/a.iso",
            "filename": "a.iso",
            "size": 1024,
            "mimeType": null,
            "timestamp": 1_700_000_000_000i64,
            "referrer": null,
            "headers": {},
            "requestId": request_id,
        })
    }

    #[tokio::test]
    async fn test_greets_with_version() {
        let server = TestServer::start(PeerOptions {
            client_version: "6.42".to_string(),
            latest_version: "1.3.0".to_string(),
            require_alive: false,
        })
        .await;
        let mut ws = connect(&server).await;

        assert_eq!(
            next_message(&mut ws).await,
            ServerMessage::version("6.42", "1.3.0")
        );
        server.shutdown();
    }

    #[tokio::test]
    async fn test_alive_handshake() {
        let server = TestServer::start(PeerOptions {
            require_alive: true,
            ..Default::default()
        })
        .await;
        let mut ws = connect(&server).await;

        assert!(matches!(
            next_message(&mut ws).await,
            ServerMessage::Version { .. }
        ));
        assert_eq!(next_message(&mut ws).await, ServerMessage::alive());
    }

    #[tokio::test]
    async fn test_heartbeat_acknowledged() {
        let server = TestServer::start(PeerOptions::default()).await;
        let mut ws = connect(&server).await;
        next_message(&mut ws).await;

        send(&mut ws, serde_json::json!({"type": "heartbeat", "timestamp": 42})).await;

        assert_eq!(
            next_message(&mut ws).await,
            ServerMessage::heartbeat(Some(42))
        );
        assert_eq!(server.state().heartbeats(), 1);
    }

    #[tokio::test]
    async fn test_download_deduplicated_by_request_id() {
        let server = TestServer::start(PeerOptions::default()).await;
        let mut ws = connect(&server).await;
        next_message(&mut ws).await;

        send(&mut ws, download("req-1")).await;
        send(&mut ws, download("req-1")).await;
        send(&mut ws, download("req-2")).await;

        for _ in 0..3 {
            assert!(matches!(
                next_message(&mut ws).await,
                ServerMessage::DownloadResponse {
                    status: ResponseStatus::Success,
                    ..
                }
            ));
        }
        let ids: Vec<String> = server
            .state()
            .downloads()
            .await
            .into_iter()
            .map(|d| d.request_id)
            .collect();
        assert_eq!(ids, vec!["req-1", "req-2"]);
    }

    #[tokio::test]
    async fn test_download_without_url_rejected() {
        let server = TestServer::start(PeerOptions::default()).await;
        let mut ws = connect(&server).await;
        next_message(&mut ws).await;

        let mut frame = download("req-1");
        frame["url"] = serde_json::json!("");
        send(&mut ws, frame).await;

        assert!(matches!(
            next_message(&mut ws).await,
            ServerMessage::DownloadResponse {
                status: ResponseStatus::Error,
                ..
            }
        ));
        assert!(server.state().downloads().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_frames_ignored() {
        let server = TestServer::start(PeerOptions::default()).await;
        let mut ws = connect(&server).await;
        next_message(&mut ws).await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        send(&mut ws, serde_json::json!({"type": "upload"})).await;
        send(&mut ws, serde_json::json!({"type": "alive"})).await;
        send(&mut ws, serde_json::json!({"type": "heartbeat", "timestamp": 7})).await;

        // Only the heartbeat is answered.
        assert_eq!(
            next_message(&mut ws).await,
            ServerMessage::heartbeat(Some(7))
        );
    }
}

mod end_to_end {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use dlrelay::relay::{ConnectionConfig, Input, LogNotifier, Relay, RelayConfig};
    use dlrelay::store::{JsonFileStore, Store};
    use relay_core::{ConnectionState, DownloadEvent, ReconnectMode};
    use relay_ipc::{ConnectionStatus, ControlRequest};
    use tokio::sync::mpsc;

    fn relay_config(url: String) -> RelayConfig {
        RelayConfig {
            connection: ConnectionConfig {
                url,
                mode: ReconnectMode::Continuous,
                interval: Duration::from_millis(100),
                ..Default::default()
            },
            drain_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn status(tx: &mpsc::Sender<Input>) -> ConnectionStatus {
        let (reply, response) = oneshot::channel();
        tx.send(Input::Control {
            request: ControlRequest::GetConnectionStatus,
            reply,
        })
        .await
        .unwrap();
        response.await.unwrap().status.unwrap()
    }

    /// Polls `check` until it holds or five seconds pass.
    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_relay_delivers_to_peer() {
        let server = TestServer::start(PeerOptions {
            client_version: "6.42".to_string(),
            latest_version: "99.0.0".to_string(),
            require_alive: true,
        })
        .await;
        let server = &server;
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> =
            Arc::new(JsonFileStore::open(&dir.path().join("store.json")).unwrap());

        let mut config = relay_config(server.ws_url());
        config.connection.require_liveness = true;
        let mut relay = Relay::open(config, store, Box::new(LogNotifier)).await;
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { relay.run(&mut rx).await });
        let tx = &tx;

        assert!(
            eventually(|| async move {
                let s = status(tx).await;
                s.state == ConnectionState::Connected && s.update_available
            })
            .await
        );

        tx.send(Input::Download(DownloadEvent::new("https://example.com/a.iso")))
            .await
            .unwrap();
        assert!(eventually(|| async move { server.state().downloads().await.len() == 1 }).await);
        assert_eq!(server.state().downloads().await[0].filename, "a.iso");

        tx.send(Input::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_queued_downloads_drain_when_peer_appears() {
        // Reserve a port, then leave it closed until the downloads are queued.
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);

        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("store.json");
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(&store_path).unwrap());
        let mut relay = Relay::open(
            relay_config(format!("ws://{}", addr)),
            store,
            Box::new(LogNotifier),
        )
        .await;
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { relay.run(&mut rx).await });
        let tx = &tx;

        for name in ["a.iso", "b.iso", "c.iso"] {
            tx.send(Input::Download(DownloadEvent::new(format!(
                "https://example.com/{}",
                name
            ))))
            .await
            .unwrap();
        }
        assert!(eventually(|| async move { status(tx).await.queue_length == 3 }).await);

        let server = TestServer::start_on(
            TcpListener::bind(addr).await.unwrap(),
            PeerOptions::default(),
        );
        let server = &server;
        assert!(eventually(|| async move { server.state().downloads().await.len() == 3 }).await);
        let names: Vec<String> = server
            .state()
            .downloads()
            .await
            .into_iter()
            .map(|d| d.filename)
            .collect();
        assert_eq!(names, vec!["a.iso", "b.iso", "c.iso"]);
        assert!(eventually(|| async move { status(tx).await.queue_length == 0 }).await);

        tx.send(Input::Shutdown).await.unwrap();
        handle.await.unwrap();

        let persisted: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&store_path).unwrap()).unwrap();
        assert_eq!(persisted["pendingDownloads"], serde_json::json!([]));
    }
}
