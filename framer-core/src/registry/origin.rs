//! Origin access
//!
//! An origin is a base URL serving a registry document set:
//!
//! ```text
//! O/map.json                  ← origin name and offered modules
//! O/{m}/info.json             ← author, description, versions
//! O/{m}/latest.txt            ← latest version string
//! O/{m}/{v}/require.json      ← requirements of one version
//! O/{m}/{v}/file.zip          ← archive (referenced, never fetched by sync)
//! ```
//!
//! Fetches never write local state. A document that cannot be fetched is
//! returned as a [`FetchError`] value for the caller to record, not raised.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use std::time::Duration;
use tracing::{debug, warn};

use super::error::FetchError;
use crate::settings::ProjectSettings;

/// Identifying user agent sent with every request
pub const USER_AGENT: &str = concat!("framer/", env!("CARGO_PKG_VERSION"));

/// Source of registry documents
///
/// [`OriginClient`] fetches over HTTP; tests drive the sync engine with an
/// in-memory source.
#[async_trait]
pub trait OriginSource: Send + Sync {
    /// Fetch a document as text
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// HTTP client for origins with immediate, bounded retries
pub struct OriginClient {
    client: reqwest::Client,
    retries: u32,
}

impl OriginClient {
    /// Create a client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&ProjectSettings::default())
    }

    /// Create a client using the project's retry and timeout settings
    pub fn with_settings(settings: &ProjectSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            retries: settings.retries,
        })
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Fetch a document, retrying immediately up to `retries` more times
    ///
    /// Ctrl-C during an attempt aborts at once with [`FetchError::Cancelled`].
    pub async fn fetch_text_with_retries(
        &self,
        url: &str,
        retries: u32,
    ) -> std::result::Result<String, FetchError> {
        let attempts = retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!("GET {} (attempt {}/{})", url, attempt, attempts);

            let outcome = tokio::select! {
                result = self.attempt(url) => result,
                Ok(()) = tokio::signal::ctrl_c() => {
                    warn!("Fetch of {} cancelled", url);
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("Fetch {} failed (attempt {}/{}): {}", url, attempt, attempts, e);
                    last_error = e;
                }
            }
        }

        Err(FetchError::Unavailable {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl OriginSource for OriginClient {
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.fetch_text_with_retries(url, self.retries).await
    }
}

/// Join an origin base URL with path segments
fn origin_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_start_matches('/'));
    }
    url
}

pub fn map_url(base: &str) -> String {
    origin_url(base, &["map.json"])
}

pub fn info_url(base: &str, module: &str) -> String {
    origin_url(base, &[module, "info.json"])
}

pub fn latest_url(base: &str, module: &str) -> String {
    origin_url(base, &[module, "latest.txt"])
}

pub fn require_url(base: &str, module: &str, version: &str) -> String {
    origin_url(base, &[module, version, "require.json"])
}

pub fn archive_url(base: &str, module: &str, version: &str) -> String {
    origin_url(base, &[module, version, "file.zip"])
}

/// Rewrite an `@relpath` description into an absolute URL under the module
pub fn resolve_description(base: &str, module: &str, raw: &str) -> String {
    match raw.strip_prefix('@') {
        Some(relpath) => origin_url(base, &[module, relpath]),
        None => raw.to_string(),
    }
}
