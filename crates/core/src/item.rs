// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Work items: the unit the relay forwards to the download manager.
//!
//! A [`WorkItem`] is built from a [`DownloadEvent`] reported by the host
//! (or a manual download request) and carries only metadata about the
//! download. Items are validated on construction: the URL must be a
//! non-empty `http` or `https` URL.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Size reported when the host does not know the download length.
pub const UNKNOWN_SIZE: i64 = -1;

/// Filename used when neither the event nor the URL provide one.
const FALLBACK_FILENAME: &str = "download";

/// A "download started" event as reported by the host.
///
/// Accepts both the host naming (`finalUrl`, `totalBytes`, `mime`) and the
/// naming used by manual download requests (`url`, `size`, `mimeType`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
    /// Final URL after redirects.
    #[serde(alias = "url")]
    pub final_url: String,
    /// Target filename, possibly a full path on the host.
    #[serde(default)]
    pub filename: String,
    /// Total size in bytes, if known.
    #[serde(default, alias = "size")]
    pub total_bytes: Option<i64>,
    /// MIME type reported by the host.
    #[serde(default, alias = "mimeType")]
    pub mime: Option<String>,
    /// Page the download was started from.
    #[serde(default)]
    pub referrer: Option<String>,
}

impl DownloadEvent {
    /// Creates an event for the given URL with no other metadata.
    pub fn new(final_url: impl Into<String>) -> Self {
        DownloadEvent {
            final_url: final_url.into(),
            ..Default::default()
        }
    }
}

/// One download relayed to the download manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// HTTP(S) URL of the download.
    pub url: String,
    /// Bare filename (no directory part).
    pub filename: String,
    /// Size in bytes, or [`UNKNOWN_SIZE`].
    pub size_bytes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Request headers forwarded to the download manager.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// When the item was accepted.
    pub created_at: DateTime<Utc>,
    /// When delivery was last attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_attempt_at: Option<DateTime<Utc>>,
    /// Unique, immutable id used to track re-deliveries.
    request_id: String,
}

impl WorkItem {
    /// Creates a validated work item for `url`.
    ///
    /// An empty `filename` falls back to the last path segment of the URL.
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed = parse_http_url(&url)?;
        let filename = basename(&filename.into())
            .map(str::to_string)
            .unwrap_or_else(|| filename_from_url(&parsed));

        Ok(WorkItem {
            url,
            filename,
            size_bytes: UNKNOWN_SIZE,
            mime_type: None,
            referrer: None,
            headers: BTreeMap::new(),
            created_at: Utc::now(),
            send_attempt_at: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Builds a work item from a host download event.
    ///
    /// The item carries a `Referer` header when the referrer is known and a
    /// `User-Agent` header when one is given.
    pub fn from_event(event: &DownloadEvent, user_agent: Option<&str>) -> Result<Self> {
        let mut item = WorkItem::new(event.final_url.trim(), event.filename.as_str())?
            .with_size(event.total_bytes.unwrap_or(UNKNOWN_SIZE))
            .with_mime_type(event.mime.clone())
            .with_referrer(event.referrer.clone());

        if let Some(referrer) = item.referrer.clone() {
            item.headers.insert("Referer".to_string(), referrer);
        }
        if let Some(agent) = user_agent.filter(|a| !a.is_empty()) {
            item.headers
                .insert("User-Agent".to_string(), agent.to_string());
        }
        Ok(item)
    }

    /// Sets the size; negative values mean unknown.
    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.size_bytes = if size_bytes < 0 {
            UNKNOWN_SIZE
        } else {
            size_bytes
        };
        self
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type.filter(|m| !m.is_empty());
        self
    }

    pub fn with_referrer(mut self, referrer: Option<String>) -> Self {
        self.referrer = referrer.filter(|r| !r.is_empty());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The id assigned when the item was created.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Re-checks the URL invariant.
    ///
    /// Items deserialized from storage or from a command bypass [`WorkItem::new`],
    /// so the orchestrator validates again before accepting them.
    pub fn validate(&self) -> Result<()> {
        parse_http_url(&self.url).map(|_| ())
    }

    /// Records a delivery attempt.
    pub fn mark_attempt(&mut self, at: DateTime<Utc>) {
        self.send_attempt_at = Some(at);
    }
}

/// Validates that `url` is a non-empty HTTP(S) URL.
pub fn validate_url(url: &str) -> Result<()> {
    parse_http_url(url).map(|_| ())
}

fn parse_http_url(url: &str) -> Result<Url> {
    if url.trim().is_empty() {
        return Err(Error::EmptyUrl);
    }
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::UnsupportedScheme {
            scheme: scheme.to_string(),
            url: url.to_string(),
        }),
    }
}

/// Strips any directory part from a host-supplied filename.
fn basename(filename: &str) -> Option<&str> {
    filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
