// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Greets every relay with a `version` frame (and an `alive` signal when
//! configured), acknowledges heartbeats and answers each `download` frame
//! with a `download_response`.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use relay_core::protocol::{ClientMessage, ServerMessage};

use crate::state::PeerState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: PeerState) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state)
        .await
        .map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}

/// Accept relays on an already bound listener.
pub async fn serve(listener: TcpListener, state: PeerState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single relay connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: PeerState,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("Relay connected from: {}", peer_addr);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let options = state.options();
    let mut greeting = vec![ServerMessage::version(
        options.client_version.as_str(),
        options.latest_version.as_str(),
    )];
    if options.require_alive {
        greeting.push(ServerMessage::alive());
    }
    for msg in greeting {
        ws_sink.send(Message::Text(msg.to_json()?.into())).await?;
    }

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Some(response) = handle_client_message(&text, &state).await {
                    ws_sink.send(Message::Text(response.to_json()?.into())).await?;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Relay {} disconnected", peer_addr);
                break;
            }
            Ok(Message::Ping(data)) => {
                ws_sink.send(Message::Pong(data)).await?;
            }
            Ok(_) => {
                // Ignore other message types (Binary, Pong, Frame)
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    info!("Connection closed: {}", peer_addr);
    Ok(())
}

/// Process a relay frame and return an optional response.
async fn handle_client_message(text: &str, state: &PeerState) -> Option<ServerMessage> {
    let msg = match ClientMessage::from_json(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Ignoring unreadable frame: {}", e);
            return None;
        }
    };
    debug!("Received message: {:?}", msg);

    match msg {
        ClientMessage::Heartbeat { timestamp } => {
            state.record_heartbeat();
            Some(ServerMessage::heartbeat(Some(timestamp)))
        }

        ClientMessage::Download(request) => {
            if request.url.trim().is_empty() {
                return Some(ServerMessage::download_rejected("download has no url"));
            }
            let filename = request.filename.clone();
            let request_id = request.request_id.clone();
            if state.accept_download(request).await {
                info!("Accepted download {}", filename);
                Some(ServerMessage::download_accepted(format!(
                    "accepted {}",
                    filename
                )))
            } else {
                debug!("Duplicate download {}", request_id);
                Some(ServerMessage::download_accepted(format!(
                    "already accepted {}",
                    request_id
                )))
            }
        }

        ClientMessage::Alive => {
            debug!("Relay echoed alive");
            None
        }
    }
}
