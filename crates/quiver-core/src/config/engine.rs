//! Engine configuration and on-disk layout
//!
//! Precedence (low to high):
//! 1. Built-in defaults (`~/.quiver/extensions`, Downloads/Desktop/Documents)
//! 2. Environment variables (`QUIVER_*`)
//! 3. Builder overrides (handled by the caller)

use crate::utils::get_home_dir;
use std::env;
use std::path::{Path, PathBuf};

/// Scheme used for virtual icon URLs
pub const DEFAULT_ICON_SCHEME: &str = "proto";

/// Home subdirectories an unpacked extension may be installed from
pub const DEFAULT_ALLOWED_DIRS: &[&str] = &["Downloads", "Desktop", "Documents"];

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all engine-owned state
    pub base_dir: PathBuf,

    /// Directory holding `preinstalled.json` and bundled packages
    pub bundled_dir: Option<PathBuf>,

    /// Real paths unpacked directories must live under
    pub allowed_roots: Vec<PathBuf>,

    /// Application locale used for `_locales` fallback (e.g. `en-US`)
    pub app_locale: String,

    /// Scheme of the icon asset handler
    pub icon_scheme: String,

    /// Log full source paths instead of hashes
    pub debug: bool,
}

impl EngineConfig {
    /// Configuration rooted at `base_dir` with no allowed roots
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            bundled_dir: None,
            allowed_roots: Vec::new(),
            app_locale: "en-US".to_string(),
            icon_scheme: DEFAULT_ICON_SCHEME.to_string(),
            debug: false,
        }
    }

    /// Load configuration from defaults and environment
    pub fn load() -> anyhow::Result<Self> {
        let home = get_home_dir()?;

        let base_dir = env::var_os("QUIVER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".quiver").join("extensions"));

        let mut config = Self::new(base_dir);
        config.allowed_roots = DEFAULT_ALLOWED_DIRS
            .iter()
            .map(|dir| home.join(dir))
            .collect();

        if let Some(extra) = env::var_os("QUIVER_ALLOWED_ROOTS") {
            config.allowed_roots.extend(env::split_paths(&extra));
        }
        if let Some(bundled) = env::var_os("QUIVER_BUNDLED_DIR") {
            config.bundled_dir = Some(PathBuf::from(bundled));
        }
        if let Ok(locale) = env::var("QUIVER_LOCALE") {
            if !locale.trim().is_empty() {
                config.app_locale = locale;
            }
        }
        config.debug = env::var("QUIVER_DEBUG")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(config)
    }

    pub fn with_allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.allowed_roots.push(root.into());
        self
    }

    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.app_locale = locale.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn paths(&self) -> EnginePaths {
        EnginePaths::new(&self.base_dir)
    }
}

/// Every engine-owned location, derived from the base directory
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub base: PathBuf,
}

impl EnginePaths {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    pub fn registry_file(&self) -> PathBuf {
        self.base.join("extensions.json")
    }

    pub fn pinned_file(&self) -> PathBuf {
        self.base.join("pinned.json")
    }

    pub fn policy_file(&self) -> PathBuf {
        self.base.join("policy.json")
    }

    pub fn activity_file(&self) -> PathBuf {
        self.base.join("activity.jsonl")
    }

    pub fn defaults_imported_file(&self) -> PathBuf {
        self.base.join("defaults-imported.json")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base.join("_staging")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.base.join("_uploads")
    }

    /// `<base>/<id>`
    pub fn id_root(&self, id: &str) -> PathBuf {
        self.base.join(id)
    }

    /// `<base>/<id>/<version>_0`
    pub fn version_dir(&self, id: &str, version: &str) -> PathBuf {
        self.base.join(id).join(format!("{version}_0"))
    }

    /// Whether `path` is strictly inside the base directory
    pub fn contains(&self, path: &Path) -> bool {
        path != self.base && path.starts_with(&self.base)
    }
}
