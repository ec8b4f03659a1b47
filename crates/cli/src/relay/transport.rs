// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The socket to the download manager.
//!
//! [`Transport`] is the seam between the connection manager and the wire;
//! [`WebSocketTransport`] is the only production implementation. Errors are
//! classified so the connection manager can tell "nothing is listening"
//! (the download manager is not running, which is routine while retrying)
//! apart from a link that broke.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_core::protocol::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nothing accepts connections at the peer address.
    #[error("connection refused; is the download manager running?")]
    Refused,

    /// The socket opened but the WebSocket handshake did not complete.
    #[error("download manager unreachable: {0}")]
    Unreachable(String),

    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The attempt was abandoned by a disconnect.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// The link is not open.
    #[error("not connected")]
    NotConnected,

    /// The peer hung up.
    #[error("connection closed by the download manager")]
    PeerClosed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("cannot encode frame: {0}")]
    Encode(String),
}

impl TransportError {
    /// True when the download manager is simply not there.
    pub fn is_refused(&self) -> bool {
        matches!(self, TransportError::Refused)
    }

    fn from_handshake(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                TransportError::Refused
            }
            other => TransportError::Unreachable(other.to_string()),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// A message socket to one peer.
///
/// Implementations are moved into an in-flight connection attempt and
/// handed back when it settles, hence the `'static` bound.
pub trait Transport: Send + Sync + 'static {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()>;

    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    /// Sends one frame. A failure leaves the transport closed.
    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()>;

    /// Waits for the next frame the relay understands.
    ///
    /// `Ok(None)` means the peer hung up.
    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>>;

    fn is_connected(&self) -> bool;
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for the download manager's local port.
#[derive(Default)]
pub struct WebSocketTransport {
    link: Option<(SplitSink<Socket, Message>, SplitStream<Socket>)>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            // Frames are small and latency matters more than batching
            let (socket, _) = tokio_tungstenite::connect_async_with_config(&url, None, true)
                .await
                .map_err(TransportError::from_handshake)?;
            self.link = Some(socket.split());
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let Some((mut sink, _)) = self.link.take() else {
                return Ok(());
            };
            sink.close()
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let (sink, _) = self.link.as_mut().ok_or(TransportError::NotConnected)?;
            let json = msg
                .to_json()
                .map_err(|e| TransportError::Encode(e.to_string()))?;

            // Flushing surfaces a dead peer now rather than on the next frame
            let sent = match sink.send(Message::Text(json.into())).await {
                Ok(()) => sink.flush().await,
                Err(e) => Err(e),
            };
            sent.map_err(|e| {
                self.link = None;
                TransportError::Send(e.to_string())
            })
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            let (_, stream) = self.link.as_mut().ok_or(TransportError::NotConnected)?;

            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerMessage::from_json(&text) {
                        Ok(msg) => return Ok(Some(msg)),
                        Err(e) => tracing::debug!("ignoring malformed frame: {}", e),
                    },
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            tracing::debug!(
                                "peer closed the link: {} {}",
                                u16::from(frame.code),
                                frame.reason.as_str()
                            );
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.link = None;
                        return Err(TransportError::Receive(e.to_string()));
                    }
                }
            }

            self.link = None;
            Ok(None)
        })
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
