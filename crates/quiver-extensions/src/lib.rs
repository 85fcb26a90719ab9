//! Extension engine for Quiver
//!
//! This crate handles:
//! - Path sanitization and safe archive extraction (ZIP, CRX v2/v3)
//! - Manifest validation against the engine policy
//! - Identifier derivation and host id reconciliation
//! - The persistent registry and pinned toolbar list
//! - Install, toggle, update and uninstall lifecycle
//! - Bundled (preinstalled) extensions
//! - Toolbar actions and popups
//! - Activity ledger and IPC boundary guards

pub mod actions;
pub mod archive;
pub mod boundary;
pub mod context;
pub mod events;
pub mod fsutil;
pub mod host;
pub mod identity;
pub mod installer;
pub mod ledger;
pub mod lifecycle;
pub mod locale;
pub mod lock;
pub mod pins;
pub mod registry;
pub mod sanitize;
pub mod store;
pub mod validator;

pub use actions::{BrowserActionRow, BrowserActionService, ClickOutcome, ClickRoute};
pub use boundary::{RateLimiter, UploadArea};
pub use context::EngineContext;
pub use events::{EventEnvelope, ExtensionEvent, LifecycleState};
pub use host::{
    ActiveTab, DetachedHost, HostError, HostExtensions, HostLoaded, HostResult, LoadOptions,
    WindowId,
};
pub use installer::{InstallOptions, Installer};
pub use ledger::ActivityLedger;
pub use lifecycle::{
    EngineStatus, InstallOutcome, LifecycleCoordinator, StartReport, UpdateSummary,
};
pub use lock::KeyedMutex;
pub use pins::{PinService, PIN_CAPACITY};
pub use registry::{CleanReport, Registry};
pub use sanitize::{PathSanitizer, SanitizedPath};
pub use store::{StoreAdapter, StoreClient, StoreInstall};
pub use validator::{ManifestValidator, ValidationOutcome, ValidationReport};
