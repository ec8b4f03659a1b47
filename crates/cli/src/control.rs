// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket for a running relay.
//!
//! The relay listens on a Unix socket in its state directory. Each
//! connection carries one framed [`ControlRequest`] and gets one framed
//! [`ControlResponse`] back. Requests are forwarded to the relay event loop
//! as [`Input::Control`], so they are handled in order with downloads and
//! timers.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use relay_ipc::{framing, framing_async, ControlRequest, ControlResponse};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::relay::Input;

/// Read/write timeout for control clients.
///
/// Covers a reconnect request, which waits for one connection attempt.
const TIMEOUT_SECS: u64 = 15;

/// Binds the control socket, replacing a stale one.
///
/// Callers must hold the single-instance lock, so an existing socket file
/// is left over from a relay that did not shut down cleanly.
pub fn bind(socket_path: &Path) -> Result<UnixListener> {
    if socket_path.exists() {
        tracing::debug!("removing stale socket {}", socket_path.display());
        fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("listening on {}", socket_path.display());
    Ok(listener)
}

/// Accepts control connections until the relay stops taking input.
pub async fn serve(listener: UnixListener, inputs: mpsc::Sender<Input>) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let inputs = inputs.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, inputs).await {
                            tracing::warn!("control connection failed: {}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("failed to accept control connection: {}", e),
            },
            _ = inputs.closed() => break,
        }
    }
    tracing::debug!("control socket closed");
}

async fn handle_connection(
    mut stream: tokio::net::UnixStream,
    inputs: mpsc::Sender<Input>,
) -> std::io::Result<()> {
    let request: ControlRequest = framing_async::read_message(&mut stream).await?;
    let (reply, response) = oneshot::channel();

    let response = if inputs.send(Input::Control { request, reply }).await.is_ok() {
        response
            .await
            .unwrap_or_else(|_| ControlResponse::failed("relay stopped before replying"))
    } else {
        ControlResponse::failed("relay is shutting down")
    };

    framing_async::write_message(&mut stream, &response).await
}

/// Sends one request to the relay listening on `socket_path`.
pub fn send_request(socket_path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let not_running = || Error::NotRunning {
        path: socket_path.display().to_string(),
    };

    let mut stream = match UnixStream::connect(socket_path) {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            return Err(not_running());
        }
        Err(e) => return Err(Error::Control(format!("failed to connect to relay: {}", e))),
    };

    let timeout = Some(Duration::from_secs(TIMEOUT_SECS));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    framing::write_message(&mut stream, request)?;
    Ok(framing::read_message(&mut stream)?)
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
