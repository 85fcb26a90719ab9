//! Type definitions for extension records, manifests and policy

pub mod manifest;
pub mod policy;
pub mod record;
pub mod version;

pub use manifest::{Manifest, MANIFEST_FILENAME};
pub use policy::{
    BehaviorPolicy, FilePolicy, ManifestPolicy, OnBlocked, OnDangerousPermission, OnWarn,
    PermissionPolicy, Policy,
};
pub use record::{
    icon_url, is_virtual_icon_url, ExtensionRecord, ExtensionSource, PinnedFile, RegistryFile,
    UpdateInfo, UpdateOutcome, DEFAULT_ICON_SIZE,
};
pub use version::{VersionTuple, FALLBACK_VERSION};
