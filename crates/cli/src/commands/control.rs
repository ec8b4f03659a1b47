// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that talk to a running relay over its control socket.

use std::path::Path;

use relay_core::DownloadEvent;
use relay_ipc::{ConnectionStatus, ControlRequest, ControlResponse};

use crate::cli::OutputFormat;
use crate::config;
use crate::control;
use crate::error::{Error, Result};

/// Sends `request`, turning a failed response into an error.
fn request(state_dir: &Path, request: ControlRequest) -> Result<ControlResponse> {
    let response = control::send_request(&config::socket_path(state_dir), &request)?;
    if response.success {
        Ok(response)
    } else {
        Err(Error::Control(
            response
                .error
                .unwrap_or_else(|| format!("{} failed", request.action())),
        ))
    }
}

/// Show connection and queue status.
pub fn status(state_dir: &Path, output: OutputFormat) -> Result<()> {
    let response = request(state_dir, ControlRequest::GetConnectionStatus)?;
    let status = response
        .status
        .ok_or_else(|| Error::Control("relay sent no status".to_string()))?;

    match output {
        OutputFormat::Text => print!("{}", format_status(&status)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
    }
    Ok(())
}

/// Renders a status report, one `Label: value` line each.
pub fn format_status(status: &ConnectionStatus) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("{}: {}\n", label, value));
    };

    line("State", status.state.to_string());
    if let Some(since) = status.connected_since {
        line("Connected since", since.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    }
    let attempts = match status.max_attempts {
        Some(max) => format!("{}/{}", status.attempts, max),
        None => status.attempts.to_string(),
    };
    line("Attempts", attempts);
    if let Some(error) = &status.last_error {
        line("Error", error.clone());
    }

    let mut queue = format!("{}/{}", status.queue_length, status.queue_capacity);
    if status.evicted > 0 {
        queue.push_str(&format!(" ({} dropped)", status.evicted));
    }
    line("Queue", queue);
    line(
        "Interception",
        if status.enabled { "enabled" } else { "disabled" }.to_string(),
    );

    if let Some(version) = &status.client_version {
        line("Download manager", version.clone());
    }
    if status.update_available {
        if let Some(latest) = &status.latest_relay_version {
            line("Update available", latest.clone());
        }
    }
    out
}

/// Connect now, optionally past the reconnect limit.
pub fn reconnect(state_dir: &Path, manual: bool) -> Result<()> {
    let req = if manual {
        ControlRequest::ManualReconnect
    } else {
        ControlRequest::Reconnect
    };
    let response = request(state_dir, req)?;
    print_state(&response);
    Ok(())
}

/// Drop the connection and connect afresh.
pub fn reset(state_dir: &Path) -> Result<()> {
    let response = request(state_dir, ControlRequest::ResetConnection)?;
    print_state(&response);
    Ok(())
}

/// Discard the pending queue.
pub fn clear_queue(state_dir: &Path) -> Result<()> {
    let response = request(state_dir, ControlRequest::ClearQueue)?;
    println!("Cleared {} queued downloads", response.cleared.unwrap_or(0));
    Ok(())
}

/// Relay a download given on the command line.
pub fn download(state_dir: &Path, event: DownloadEvent) -> Result<()> {
    let url = event.final_url.clone();
    let response = request(
        state_dir,
        ControlRequest::ManualDownload {
            download_info: event,
        },
    )?;
    if response.delivered == Some(true) {
        println!("Sent {}", url);
    } else {
        println!("Queued {} (download manager not connected)", url);
    }
    Ok(())
}

/// Enable or disable interception of host downloads.
pub fn set_enabled(state_dir: &Path, enabled: bool) -> Result<()> {
    request(state_dir, ControlRequest::SetEnabled { enabled })?;
    println!("Relay {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Forward a liveness signal.
pub fn signal(state_dir: &Path) -> Result<()> {
    let response = request(state_dir, ControlRequest::Signal)?;
    print_state(&response);
    Ok(())
}

fn print_state(response: &ControlResponse) {
    if let Some(status) = &response.status {
        println!("State: {}", status.state);
        if let Some(error) = &status.last_error {
            println!("Error: {}", error);
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
