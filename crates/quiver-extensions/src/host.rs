//! Extension host capability interface
//!
//! The host is the browser's extension runtime. Loading and removal are
//! required; the toolbar capabilities are optional and default to
//! [`HostError::Unsupported`], which callers treat as "try the next one".

use crate::archive::id_from_public_key;
use crate::installer::read_manifest;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quiver_core::types::VersionTuple;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Host call failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host does not offer this capability
    #[error("host capability not supported: {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, HostError::Unsupported(_))
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Options for a host load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub allow_file_access: bool,
}

/// What the host reports after a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLoaded {
    pub host_id: String,
    pub name: String,
    pub version: String,
}

/// Browser window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u32);

/// Active tab as reported by a window's tab strip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTab {
    pub tab_id: i64,
    pub web_contents_id: i64,
    pub url: String,
}

/// The browser's extension runtime
#[async_trait]
pub trait HostExtensions: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Load the unpacked extension at `path`
    async fn load(&self, path: &Path, options: LoadOptions) -> HostResult<HostLoaded>;

    /// Unload by host id
    async fn remove(&self, host_id: &str) -> HostResult<()>;

    /// Tell the extension API which tab is active
    async fn set_active_tab(&self, _tab: &ActiveTab) -> HostResult<()> {
        Err(HostError::Unsupported("set_active_tab"))
    }

    /// Activate the extension for a tab
    async fn activate_extension(&self, _host_id: &str, _tab: &ActiveTab) -> HostResult<()> {
        Err(HostError::Unsupported("activate_extension"))
    }

    /// `browserAction.openPopup`
    async fn open_browser_action_popup(&self, _host_id: &str, _window: WindowId) -> HostResult<()> {
        Err(HostError::Unsupported("open_browser_action_popup"))
    }

    /// `action.openPopup`
    async fn open_action_popup(&self, _host_id: &str, _window: WindowId) -> HostResult<()> {
        Err(HostError::Unsupported("open_action_popup"))
    }

    /// Dispatch an action click to the extension
    async fn click_action(&self, _host_id: &str, _tab: &ActiveTab) -> HostResult<()> {
        Err(HostError::Unsupported("click_action"))
    }
}

/// Id a host derives from a manifest `key` (base64 DER public key)
pub fn host_id_from_manifest_key(key: &str) -> Option<String> {
    let compact: String = key.split_whitespace().collect();
    let der = STANDARD.decode(compact.as_bytes()).ok()?;
    (!der.is_empty()).then(|| id_from_public_key(&der))
}

/// Host for running the engine without a browser session
///
/// Loads are bookkeeping only. The host id follows the runtime's rule: the
/// manifest `key` when present, else the id directory name.
#[derive(Default)]
pub struct DetachedHost {
    loaded: Mutex<HashMap<String, PathBuf>>,
}

impl DetachedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HostExtensions for DetachedHost {
    fn name(&self) -> &'static str {
        "detached"
    }

    async fn load(&self, path: &Path, _options: LoadOptions) -> HostResult<HostLoaded> {
        let manifest = read_manifest(path).map_err(|e| HostError::Failed(e.to_string()))?;
        let host_id = manifest
            .key()
            .and_then(host_id_from_manifest_key)
            .or_else(|| {
                path.parent()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .ok_or_else(|| HostError::Failed("cannot derive an id for this path".into()))?;

        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| HostError::Failed("host state poisoned".into()))?;
        loaded.insert(host_id.clone(), path.to_path_buf());
        debug!("Detached host loaded {}", host_id);

        Ok(HostLoaded {
            host_id,
            name: manifest.name().unwrap_or_default().to_string(),
            version: VersionTuple::normalize(manifest.version()),
        })
    }

    async fn remove(&self, host_id: &str) -> HostResult<()> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| HostError::Failed("host state poisoned".into()))?;
        loaded.remove(host_id);
        Ok(())
    }
}
