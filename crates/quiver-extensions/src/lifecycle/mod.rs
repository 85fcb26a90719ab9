//! Lifecycle coordinator
//!
//! Entry point for every mutating operation. Each operation takes the lock
//! for its scope (`install:<src>`, `extension:<id>`, `global:install`,
//! `global:update`), drives the installer and registry, and then talks to
//! the host. Reads (`list`, `status`, `get_info`) take no scoped lock.
//!
//! Per-extension states:
//!
//! ```text
//! None -> Staged -> Installed (disabled) <-> Loaded (enabled) -> Removed
//! ```

mod bundled;
mod reconcile;
mod update;

pub use bundled::{BundledEntry, BundledReport, PREINSTALLED_FILE};
pub use update::{SkipReason, UpdateError, UpdateSkip, UpdateSummary, UpdatedEntry};

use crate::context::EngineContext;
use crate::events::{ExtensionEvent, LifecycleState};
use crate::fsutil::{self, Placement};
use crate::host::{HostExtensions, HostLoaded, LoadOptions};
use crate::identity;
use crate::installer::{build_record, InstallOptions, Installer};
use crate::ledger::ActivityLedger;
use crate::lock::scope;
use crate::pins::PinService;
use crate::registry::{CleanReport, Registry};
use crate::sanitize::PathSanitizer;
use crate::store::{StoreAdapter, StoreClient};
use crate::validator::ManifestValidator;
use quiver_core::types::{ExtensionRecord, ExtensionSource};
use quiver_core::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful install
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub record: ExtensionRecord,
    pub warnings: Vec<String>,
    pub pinned: bool,
}

/// Counters for the settings page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub base_dir: PathBuf,
    pub host: &'static str,
    pub total: usize,
    pub enabled: usize,
    pub loaded: usize,
    pub system: usize,
    pub pinned: usize,
    pub store_available: bool,
}

/// What `start` did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReport {
    pub clean: CleanReport,
    pub bundled: BundledReport,
    pub loaded: usize,
    pub load_failures: Vec<String>,
}

/// Coordinates installs, toggles, updates and removals
pub struct LifecycleCoordinator {
    ctx: EngineContext,
    registry: Arc<Registry>,
    pins: Arc<PinService>,
    host: Arc<dyn HostExtensions>,
    store: StoreAdapter,
    installer: Installer,
    sanitizer: PathSanitizer,
    ledger: ActivityLedger,
}

impl LifecycleCoordinator {
    pub fn new(
        ctx: EngineContext,
        host: Arc<dyn HostExtensions>,
        store: Option<Arc<dyn StoreClient>>,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new(ctx.clone())),
            pins: Arc::new(PinService::new(ctx.clone())),
            installer: Installer::new(ctx.clone()),
            sanitizer: PathSanitizer::new(ctx.config.allowed_roots.clone()),
            ledger: ActivityLedger::new(ctx.paths.activity_file()),
            store: StoreAdapter::new(store),
            host,
            ctx,
        }
    }

    /// Replace the store adapter (e.g. to add a blocklist)
    pub fn with_store_adapter(mut self, store: StoreAdapter) -> Self {
        self.store = store;
        self
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn host(&self) -> Arc<dyn HostExtensions> {
        Arc::clone(&self.host)
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    fn load_options(record: &ExtensionRecord) -> LoadOptions {
        LoadOptions {
            allow_file_access: record.is_system && record.allow_file_access,
        }
    }

    /// Ask the host to load a record's active directory
    async fn host_load(&self, record: &ExtensionRecord) -> Result<HostLoaded> {
        self.host
            .load(&record.installed_path, Self::load_options(record))
            .await
            .map_err(|e| Error::load_failed(&record.id, e.to_string()))
    }

    /// Load a registered record and persist the host id, reconciling ids
    ///
    /// `fresh` marks a record registered by the current install, which is
    /// rolled back entirely on an id conflict.
    async fn load_registered(&self, record: ExtensionRecord, fresh: bool) -> Result<ExtensionRecord> {
        let loaded = match self.host_load(&record).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.ledger.record(
                    &record.id,
                    Some(LifecycleState::Installed),
                    Some(LifecycleState::Installed),
                    ExtensionEvent::LoadFailed {
                        version: record.version.clone(),
                        error_message: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        if loaded.host_id == record.id {
            let host_id = loaded.host_id;
            return self
                .registry
                .update(&record.id, |r| r.host_id = Some(host_id))
                .await;
        }
        self.reconcile_host_id(record, loaded, fresh).await
    }

    /// Start the engine: load and clean the registry, import bundled
    /// extensions and load every enabled record
    pub async fn start(&self) -> Result<StartReport> {
        self.pins.load().await;
        let clean = self.registry.load().await?;
        let bundled = self.import_bundled().await;

        let mut loaded = 0;
        let mut load_failures = Vec::new();
        for record in self.registry.list().await {
            let _guard = self.ctx.locks.lock(scope::extension(&record.id)).await;
            // host ids from a previous session are stale
            let record = self
                .registry
                .update(&record.id, |r| r.host_id = None)
                .await?;
            if !record.enabled {
                continue;
            }
            match self.load_registered(record.clone(), false).await {
                Ok(_) => loaded += 1,
                Err(e) => {
                    warn!("Failed to load {} at startup: {}", record.id, e);
                    load_failures.push(record.id.clone());
                }
            }
        }

        self.pins.retain_eligible(&self.registry.list().await).await?;
        info!(
            "Engine started: {} extensions, {} loaded",
            self.registry.list().await.len(),
            loaded
        );
        Ok(StartReport {
            clean,
            bundled,
            loaded,
            load_failures,
        })
    }

    /// Install from a local directory or archive path
    pub async fn install(&self, source: &str, options: InstallOptions) -> Result<InstallOutcome> {
        let sanitized = match self.sanitizer.sanitize(source) {
            Ok(sanitized) => sanitized,
            Err(e) => {
                debug!("Rejected install source: {}", e);
                return Err(e);
            }
        };
        let source_label = self.ctx.log_path(sanitized.path());
        let _source_guard = self
            .ctx
            .locks
            .lock(scope::install_source(sanitized.path()))
            .await;

        let plan = match self.installer.inspect(&sanitized, options) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Install from {} failed: {}", source_label, e);
                self.record_install_failure(&source_label, &e);
                return Err(e);
            }
        };

        let _id_guard = self.ctx.locks.lock(scope::extension(&plan.id)).await;
        if self.registry.contains(&plan.id).await {
            return Err(Error::already_exists(&plan.id));
        }

        let warnings = plan.warnings.clone();
        let record = self.installer.commit(plan).inspect_err(|e| {
            self.record_install_failure(&source_label, e);
        })?;
        info!("Installed {} from {}", record.id, source_label);
        self.finish_install(record, warnings).await
    }

    /// Install from the web store by URL or bare id
    pub async fn install_from_store(&self, url_or_id: &str) -> Result<InstallOutcome> {
        if !self.store.is_available() {
            return Err(Error::not_available("Web store support is not available"));
        }
        let id = self.store.parse(url_or_id)?;

        let _global = self.ctx.locks.lock(scope::GLOBAL_INSTALL).await;
        let _id_guard = self.ctx.locks.lock(scope::extension(&id)).await;
        if self.registry.contains(&id).await {
            return Err(Error::already_exists(&id));
        }

        let installed = match self.store.install_by_id(&id).await {
            Ok(installed) => installed,
            Err(e) => {
                self.record_install_failure(&id, &e);
                return Err(e);
            }
        };

        let report =
            ManifestValidator::new(&self.ctx.policy).validate(&installed.manifest, Some(&installed.path));
        if report.is_denied() {
            if self.ctx.paths.contains(&installed.path) {
                fsutil::remove_dir_best_effort(&installed.path);
                fsutil::remove_if_empty(&self.ctx.paths.id_root(&id));
            }
            let e = report.to_error();
            self.record_install_failure(&id, &e);
            return Err(e);
        }

        let version = quiver_core::types::VersionTuple::normalize(installed.manifest.version());
        let installed_path = if self.ctx.paths.contains(&installed.path) {
            installed.path.clone()
        } else {
            let target = self.ctx.paths.version_dir(&id, &version);
            fsutil::place_dir_atomic(&installed.path, &target, Placement::Copy)
                .map_err(|e| Error::install_failed(format!("{:#}", e)))?;
            target
        };

        let mut record = build_record(
            &self.ctx,
            &id,
            installed.manifest,
            installed_path,
            ExtensionSource::Webstore,
        );
        record.warnings = report.warnings.clone();
        record.risk_score = report.risk_score;
        info!("Installed {} from the web store", id);
        self.finish_install(record, report.warnings).await
    }

    /// Register a placed record, load it and auto-pin
    async fn finish_install(
        &self,
        record: ExtensionRecord,
        warnings: Vec<String>,
    ) -> Result<InstallOutcome> {
        if let Err(e) = self.registry.insert(record.clone()).await {
            fsutil::remove_dir_best_effort(&record.installed_path);
            fsutil::remove_if_empty(&self.ctx.paths.id_root(&record.id));
            return Err(e);
        }

        self.ledger.record(
            &record.id,
            Some(LifecycleState::Staged),
            Some(LifecycleState::Installed),
            ExtensionEvent::Installed {
                name: record.name.clone(),
                version: record.version.clone(),
                source: record.source.to_string(),
                warnings: warnings.clone(),
            },
        );

        let record = if record.enabled {
            self.load_registered(record, true).await?
        } else {
            record
        };

        let pinned = self.pins.auto_pin(&record).await;
        Ok(InstallOutcome {
            record,
            warnings,
            pinned,
        })
    }

    fn record_install_failure(&self, label: &str, error: &Error) {
        self.ledger.record(
            label,
            None,
            None,
            ExtensionEvent::InstallFailed {
                code: error.code().to_string(),
                error_message: error.to_string(),
            },
        );
    }

    /// Enable (load) or disable (unload) an extension
    pub async fn toggle(&self, id: &str, enabled: bool) -> Result<ExtensionRecord> {
        let _guard = self.ctx.locks.lock(scope::extension(id)).await;
        let record = self.get_info(id).await?;

        if enabled {
            if record.enabled && record.is_loaded() {
                return Ok(record);
            }
            let loaded = self.host_load(&record).await?;
            let record = if loaded.host_id == record.id {
                self.registry
                    .update(id, |r| {
                        r.enabled = true;
                        r.host_id = Some(loaded.host_id);
                    })
                    .await
            } else {
                let record = self.reconcile_host_id(record, loaded, false).await?;
                self.registry.update(&record.id, |r| r.enabled = true).await
            }
            .map_err(|e| e.persist_as(|m| Error::load_failed(id, m)))?;
            self.ledger.record(
                &record.id,
                Some(LifecycleState::Installed),
                Some(LifecycleState::Loaded),
                ExtensionEvent::Enabled {
                    version: record.version.clone(),
                },
            );
            Ok(record)
        } else {
            if !record.enabled && !record.is_loaded() {
                return Ok(record);
            }
            if let Some(host_id) = &record.host_id {
                self.host
                    .remove(host_id)
                    .await
                    .map_err(|e| Error::remove_failed(id, e.to_string()))?;
            }
            let record = self
                .registry
                .update(id, |r| {
                    r.enabled = false;
                    r.host_id = None;
                })
                .await
                .map_err(|e| e.persist_as(|m| Error::remove_failed(id, m)))?;
            self.pins.unpin(id).await?;
            self.ledger.record(
                id,
                Some(LifecycleState::Loaded),
                Some(LifecycleState::Installed),
                ExtensionEvent::Disabled {
                    version: record.version.clone(),
                },
            );
            Ok(record)
        }
    }

    /// Remove an extension, its files and its pin
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        let _guard = self.ctx.locks.lock(scope::extension(id)).await;
        let record = self.get_info(id).await?;
        if record.is_system || !record.removable {
            return Err(Error::invalid_state("System extensions cannot be uninstalled"));
        }

        if let Some(host_id) = &record.host_id {
            if let Err(e) = self.host.remove(host_id).await {
                warn!("Host failed to unload {}: {}", id, e);
            }
        }

        if record.source == ExtensionSource::Webstore && self.store.is_available() {
            if let Err(e) = self.store.uninstall_by_id(id).await {
                warn!("Store uninstall of {} failed: {}", id, e);
            }
        }

        // drop the record first so a failed write leaves the files in place
        self.registry
            .remove(id)
            .await
            .map_err(|e| e.persist_as(|m| Error::remove_failed(id, m)))?;
        self.pins.unpin(id).await?;

        let id_root = self.ctx.paths.id_root(id);
        if id_root.exists() {
            std::fs::remove_dir_all(&id_root).map_err(|e| Error::remove_failed(id, e.to_string()))?;
        }
        self.ledger.record(
            id,
            Some(if record.is_loaded() {
                LifecycleState::Loaded
            } else {
                LifecycleState::Installed
            }),
            Some(LifecycleState::Removed),
            ExtensionEvent::Uninstalled {
                version: record.version,
            },
        );
        info!("Uninstalled {}", id);
        Ok(())
    }

    pub async fn list(&self) -> Vec<ExtensionRecord> {
        self.registry.list().await
    }

    /// Record for `id`, `E_INVALID_ID` when unknown
    pub async fn get_info(&self, id: &str) -> Result<ExtensionRecord> {
        if !identity::is_valid_record_id(id) {
            return Err(Error::invalid_id(id));
        }
        self.registry
            .get(id)
            .await
            .ok_or_else(|| Error::invalid_id(id))
    }

    pub async fn status(&self) -> EngineStatus {
        let records = self.registry.list().await;
        EngineStatus {
            base_dir: self.ctx.paths.base.clone(),
            host: self.host.name(),
            total: records.len(),
            enabled: records.iter().filter(|r| r.enabled).count(),
            loaded: records.iter().filter(|r| r.is_loaded()).count(),
            system: records.iter().filter(|r| r.is_system).count(),
            pinned: self.pins.list().await.len(),
            store_available: self.store.is_available(),
        }
    }

    pub async fn get_pinned(&self) -> Vec<String> {
        self.pins.list().await
    }

    /// Pin an enabled extension with a toolbar action
    ///
    /// Holds the extension lock so a concurrent disable cannot slip in
    /// between the eligibility check and the pin.
    pub async fn pin(&self, id: &str) -> Result<Vec<String>> {
        let _guard = self.ctx.locks.lock(scope::extension(id)).await;
        let record = self.get_info(id).await?;
        self.pins.pin(&record).await
    }

    pub async fn unpin(&self, id: &str) -> Result<Vec<String>> {
        let _guard = self.ctx.locks.lock(scope::extension(id)).await;
        self.pins.unpin(id).await
    }

    /// Clean the registry and drop pins that no longer qualify
    pub async fn validate_and_clean(&self) -> Result<CleanReport> {
        let report = self.registry.validate_and_clean().await?;
        self.pins.retain_eligible(&self.registry.list().await).await?;
        Ok(report)
    }

    /// Persist state and unload every loaded extension
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.persist().await?;
        for record in self.registry.list().await {
            let Some(host_id) = &record.host_id else {
                continue;
            };
            if let Err(e) = self.host.remove(host_id).await {
                warn!("Host failed to unload {} at shutdown: {}", record.id, e);
            }
            self.registry.update(&record.id, |r| r.host_id = None).await?;
        }
        info!("Engine shut down");
        Ok(())
    }
}
