//! Web store adapter
//!
//! The store client itself (catalog fetch, download, unpack) lives outside
//! the engine. This module parses store URLs into ids and wraps the client
//! calls in engine errors.

use async_trait::async_trait;
use quiver_core::types::Manifest;
use quiver_core::{Error, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use url::Url;

/// Hosts accepted in store URLs, with the path prefix before `<slug>/<id>`
const STORE_HOSTS: &[(&str, &str)] = &[
    ("chrome.google.com", "/webstore/detail/"),
    ("chromewebstore.google.com", "/detail/"),
];

/// Substrings that mark a URL as suspicious
const SUSPICIOUS_PATTERNS: &[&str] = &[
    "javascript:",
    "data:",
    "file:",
    "<script",
    "%3cscript",
    "@",
    "\\",
    "%00",
    "%2e%2e",
    "..",
];

fn store_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-p]{32}$").expect("static regex"))
}

/// What a store install produced
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInstall {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Unpacked version directory written by the client
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// Remote catalog client
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Download and unpack `id` into `<base>/<id>/<version>_0`
    async fn install_by_id(&self, id: &str) -> anyhow::Result<StoreInstall>;

    /// Fetch newer versions of every store extension into new version dirs
    async fn update_all(&self) -> anyhow::Result<()>;

    /// Remove the client's own state for `id`
    async fn uninstall_by_id(&self, id: &str) -> anyhow::Result<()>;
}

/// Parse a store URL or bare id into a store id
pub fn parse_store_input(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_url("Empty store URL"));
    }

    let candidate = trimmed.to_ascii_lowercase();
    if store_id_regex().is_match(&candidate) {
        return Ok(candidate);
    }

    if let Some(pattern) = SUSPICIOUS_PATTERNS
        .iter()
        .find(|p| candidate.contains(*p))
    {
        warn!("Rejected store URL containing {:?}", pattern);
        return Err(Error::invalid_url("URL contains a disallowed pattern"));
    }

    let url = Url::parse(trimmed).map_err(|e| Error::invalid_url(format!("{}", e)))?;
    if url.scheme() != "https" {
        return Err(Error::invalid_url("Store URLs must use HTTPS"));
    }
    if url.port().is_some() || !url.username().is_empty() || url.password().is_some() {
        return Err(Error::invalid_url("Store URL has unexpected components"));
    }
    let host = url.host_str().unwrap_or_default();
    let Some((_, prefix)) = STORE_HOSTS.iter().find(|(h, _)| *h == host) else {
        return Err(Error::invalid_url("Not a web store URL"));
    };

    let rest = url
        .path()
        .strip_prefix(prefix)
        .ok_or_else(|| Error::invalid_url("Not an extension detail URL"))?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    // `<slug>/<id>` or just `<id>`
    let id = match segments.as_slice() {
        [_, id] | [id] => *id,
        _ => return Err(Error::invalid_url("Not an extension detail URL")),
    };
    if !store_id_regex().is_match(id) {
        return Err(Error::invalid_id(id));
    }

    debug!("Parsed store id {}", id);
    Ok(id.to_string())
}

/// Engine-facing wrapper around an optional [`StoreClient`]
#[derive(Clone, Default)]
pub struct StoreAdapter {
    client: Option<Arc<dyn StoreClient>>,
    blocked_ids: Vec<String>,
}

impl StoreAdapter {
    pub fn new(client: Option<Arc<dyn StoreClient>>) -> Self {
        Self {
            client,
            blocked_ids: Vec::new(),
        }
    }

    /// Refuse these ids even when the URL is well-formed
    pub fn with_blocked_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.blocked_ids.extend(ids);
        self
    }

    /// Parse a URL or id and apply the blocklist
    pub fn parse(&self, input: &str) -> Result<String> {
        let id = parse_store_input(input)?;
        if self.blocked_ids.iter().any(|b| *b == id) {
            warn!("Store id {} is blocklisted", id);
            return Err(Error::invalid_id(id));
        }
        Ok(id)
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&Arc<dyn StoreClient>> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::not_available("Web store support is not available"))
    }

    pub async fn install_by_id(&self, id: &str) -> Result<StoreInstall> {
        let installed = self
            .client()?
            .install_by_id(id)
            .await
            .map_err(|e| Error::fetch_failed(format!("{:#}", e)))?;
        if installed.id != id {
            return Err(Error::install_failed(format!(
                "Store returned id {} for {}",
                installed.id, id
            )));
        }
        Ok(installed)
    }

    pub async fn update_all(&self) -> Result<()> {
        self.client()?
            .update_all()
            .await
            .map_err(|e| Error::update_failed(format!("{:#}", e)))
    }

    pub async fn uninstall_by_id(&self, id: &str) -> Result<()> {
        self.client()?
            .uninstall_by_id(id)
            .await
            .map_err(|e| Error::remove_failed(id, format!("{:#}", e)))
    }
}
