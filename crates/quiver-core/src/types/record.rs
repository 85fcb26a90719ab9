//! Installed extension records
//!
//! One [`ExtensionRecord`] per installed extension, persisted in
//! `<base>/extensions.json` as:
//! ```json
//! { "extensions": [ { "id": "...", "installedPath": "...", ... } ] }
//! ```

use super::manifest::Manifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Icon size used for toolbar and list rendering
pub const DEFAULT_ICON_SIZE: u32 = 48;

/// Where an extension was installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionSource {
    Unpacked,
    FileZip,
    FileCrx,
    Webstore,
    Preinstalled,
}

impl std::fmt::Display for ExtensionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionSource::Unpacked => write!(f, "unpacked"),
            ExtensionSource::FileZip => write!(f, "file-zip"),
            ExtensionSource::FileCrx => write!(f, "file-crx"),
            ExtensionSource::Webstore => write!(f, "webstore"),
            ExtensionSource::Preinstalled => write!(f, "preinstalled"),
        }
    }
}

/// Result of the last update check for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOutcome {
    Updated,
    AlreadyLatest,
    Failed,
}

/// Update bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: Option<UpdateOutcome>,
}

fn default_true() -> bool {
    true
}

/// Durable descriptor of one installed extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionRecord {
    /// 32-char lowercase identifier, unique in the registry
    pub id: String,

    pub name: String,

    /// Dot-numeric version (normalized)
    pub version: String,

    /// Name after `__MSG_*__` resolution
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub display_description: String,

    pub manifest: Manifest,

    /// Active version directory `<base>/<id>/<version>_0`
    pub installed_path: PathBuf,

    pub source: ExtensionSource,

    pub enabled: bool,

    /// Identifier handed out by the host while loaded
    #[serde(default)]
    pub host_id: Option<String>,

    /// Virtual icon URL served by the asset handler
    #[serde(default)]
    pub icon_path: Option<String>,

    #[serde(default)]
    pub is_system: bool,

    #[serde(default = "default_true")]
    pub removable: bool,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub risk_score: u32,

    pub install_date: DateTime<Utc>,

    #[serde(default)]
    pub update: UpdateInfo,

    #[serde(default)]
    pub permissions: Vec<String>,

    /// Id derived from the package's embedded public key, for reference only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Bundle entry this record was imported from (bundled installs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_key: Option<String>,

    /// Privileged file-URL access, only ever set for bundled system entries
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_file_access: bool,
}

impl ExtensionRecord {
    /// Whether the manifest declares a toolbar action
    pub fn has_action(&self) -> bool {
        self.manifest.has_action()
    }

    /// Label for lists: display name, falling back to the raw name
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Whether the host currently holds a live load
    pub fn is_loaded(&self) -> bool {
        self.host_id.is_some()
    }
}

/// Build the virtual icon URL `<scheme>://extension-icon/<id>/<size>?v=<version>`
pub fn icon_url(scheme: &str, id: &str, size: u32, version: &str) -> String {
    format!("{scheme}://extension-icon/{id}/{size}?v={version}")
}

/// Whether an icon path already uses the virtual URL scheme
pub fn is_virtual_icon_url(scheme: &str, path: &str) -> bool {
    path.starts_with(&format!("{scheme}://extension-icon/"))
}

/// On-disk registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub extensions: Vec<ExtensionRecord>,
}

/// On-disk pin document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedFile {
    #[serde(default)]
    pub pinned_extensions: Vec<String>,
}
