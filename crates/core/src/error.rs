// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for relay-core operations.

use thiserror::Error;

/// Errors raised while building or validating relay data.
///
/// Everything here is a validation failure: the offending download is
/// rejected before it reaches the pending queue and is never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("download url is empty")]
    EmptyUrl,

    #[error("unsupported url scheme '{scheme}' in {url}\n  hint: only http and https downloads can be relayed")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("invalid download url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for errors caused by a malformed work item.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Error::Json(_))
    }
}

/// A specialized Result type for relay-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
