//! Bundled extensions shipped with the application
//!
//! `<bundled_dir>/preinstalled.json` lists packages relative to the bundle
//! directory:
//!
//! ```json
//! { "extensions": [ { "path": "reader", "system": true, "allowFileAccess": true } ] }
//! ```
//!
//! System entries are kept in sync with the list on every start: missing
//! ones are installed, newer bundled versions replace older ones, and system
//! records no longer listed are removed. Non-system ("default") entries are
//! imported once and remembered in `defaults-imported.json`, so a user who
//! uninstalls one does not get it back.

use super::LifecycleCoordinator;
use crate::events::{ExtensionEvent, LifecycleState};
use crate::fsutil;
use crate::installer::InstallPlan;
use crate::lock::scope;
use crate::sanitize::PathSanitizer;
use quiver_core::types::{ExtensionRecord, ExtensionSource, VersionTuple};
use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// Bundle manifest file name
pub const PREINSTALLED_FILE: &str = "preinstalled.json";

fn default_true() -> bool {
    true
}

/// One `preinstalled.json` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledEntry {
    /// Package directory or archive, relative to the bundle directory
    pub path: String,
    #[serde(default = "default_true")]
    pub system: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub allow_file_access: bool,
}

impl BundledEntry {
    /// Stable key for this entry (normalized relative path)
    pub fn key(&self) -> String {
        self.path.trim().trim_matches('/').replace('\\', "/")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PreinstalledFile {
    Wrapped { extensions: Vec<BundledEntry> },
    List(Vec<BundledEntry>),
}

impl PreinstalledFile {
    fn into_entries(self) -> Vec<BundledEntry> {
        match self {
            PreinstalledFile::Wrapped { extensions } => extensions,
            PreinstalledFile::List(entries) => entries,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DefaultsImported {
    #[serde(default)]
    imported: BTreeSet<String>,
}

/// What the bundled import did
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundledReport {
    pub imported: Vec<String>,
    pub refreshed: Vec<String>,
    pub pruned: Vec<String>,
    pub errors: Vec<String>,
}

fn is_safe_relative(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

fn read_entries(bundled_dir: &Path) -> Option<Vec<BundledEntry>> {
    let path = bundled_dir.join(PREINSTALLED_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<PreinstalledFile>(&content) {
        Ok(file) => Some(file.into_entries()),
        Err(e) => {
            warn!("Ignoring malformed {:?}: {}", path, e);
            None
        }
    }
}

impl LifecycleCoordinator {
    /// Sync registry records with the bundle; failures are reported, not raised
    pub(super) async fn import_bundled(&self) -> BundledReport {
        let mut report = BundledReport::default();
        let Some(bundled_dir) = self.ctx.config.bundled_dir.clone() else {
            return report;
        };
        let Some(entries) = read_entries(&bundled_dir) else {
            debug!("No bundled extensions listed in {:?}", bundled_dir);
            return report;
        };

        let _global = self.ctx.locks.lock(scope::GLOBAL_INSTALL).await;

        let listed: BTreeSet<String> = entries
            .iter()
            .filter(|e| e.system)
            .map(BundledEntry::key)
            .collect();
        self.prune_unlisted(&listed, &mut report).await;

        let defaults_path = self.ctx.paths.defaults_imported_file();
        let mut defaults: DefaultsImported =
            fsutil::read_json_or(&defaults_path, DefaultsImported::default());
        let defaults_before = defaults.imported.len();

        for entry in &entries {
            let key = entry.key();
            if !entry.system && defaults.imported.contains(&key) {
                continue;
            }
            match self.import_entry(&bundled_dir, entry, &mut report).await {
                Ok(()) => {
                    if !entry.system {
                        defaults.imported.insert(key);
                    }
                }
                Err(e) => {
                    warn!("Bundled entry {} failed: {}", key, e);
                    report.errors.push(format!("{}: {}", key, e));
                }
            }
        }

        if defaults.imported.len() != defaults_before {
            if let Err(e) = fsutil::write_json_atomic(&defaults_path, &defaults) {
                warn!("Failed to save imported defaults: {:#}", e);
            }
        }

        if !report.imported.is_empty() || !report.pruned.is_empty() {
            info!(
                "Bundled import: {} imported, {} refreshed, {} pruned",
                report.imported.len(),
                report.refreshed.len(),
                report.pruned.len()
            );
        }
        report
    }

    async fn prune_unlisted(&self, listed: &BTreeSet<String>, report: &mut BundledReport) {
        for record in self.registry.list().await {
            if !record.is_system {
                continue;
            }
            if record.bundle_key.as_ref().is_some_and(|k| listed.contains(k)) {
                continue;
            }
            if let Some(host_id) = &record.host_id {
                if let Err(e) = self.host.remove(host_id).await {
                    warn!("Host failed to unload {}: {}", record.id, e);
                }
            }
            fsutil::remove_dir_best_effort(&self.ctx.paths.id_root(&record.id));
            if let Err(e) = self.registry.remove(&record.id).await {
                report.errors.push(format!("{}: {}", record.id, e));
                continue;
            }
            if let Err(e) = self.pins.unpin(&record.id).await {
                warn!("Failed to unpin {}: {}", record.id, e);
            }
            self.ledger.record(
                &record.id,
                Some(LifecycleState::Installed),
                Some(LifecycleState::Removed),
                ExtensionEvent::Uninstalled {
                    version: record.version.clone(),
                },
            );
            info!("Removed bundled extension {} no longer shipped", record.id);
            report.pruned.push(record.id);
        }
    }

    async fn import_entry(
        &self,
        bundled_dir: &Path,
        entry: &BundledEntry,
        report: &mut BundledReport,
    ) -> Result<()> {
        let key = entry.key();
        if !is_safe_relative(&key) {
            return Err(Error::path_traversal(format!(
                "Bundled path must stay inside the bundle: {}",
                key
            )));
        }
        let package = bundled_dir.join(&key);

        let existing = self
            .registry
            .list()
            .await
            .into_iter()
            .find(|r| r.bundle_key.as_deref() == Some(key.as_str()));

        let mut plan = self.inspect_bundled(&package)?;

        if let Some(existing) = existing {
            let newer = match (
                VersionTuple::parse(&plan.version),
                VersionTuple::parse(&existing.version),
            ) {
                (Some(bundled), Some(current)) => bundled > current,
                _ => false,
            };
            if newer {
                plan.id = existing.id.clone();
                self.refresh_entry(plan, existing, report).await?;
            }
            return Ok(());
        }

        if self.registry.contains(&plan.id).await {
            debug!("Bundled entry {} is already installed as {}", key, plan.id);
            return Ok(());
        }

        let _guard = self.ctx.locks.lock(scope::extension(&plan.id)).await;
        let mut record = self.installer.commit(plan)?;
        record.source = ExtensionSource::Preinstalled;
        record.is_system = entry.system;
        record.removable = !entry.system;
        record.enabled = entry.enabled;
        record.allow_file_access = entry.system && entry.allow_file_access;
        record.bundle_key = Some(key);

        if let Err(e) = self.registry.insert(record.clone()).await {
            fsutil::remove_dir_best_effort(&self.ctx.paths.id_root(&record.id));
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
                warnings: record.warnings.clone(),
            },
        );
        report.imported.push(record.id);
        Ok(())
    }

    fn inspect_bundled(&self, package: &Path) -> Result<InstallPlan> {
        if package.is_dir() {
            self.installer.inspect_directory(package)
        } else if package.is_file() && PathSanitizer::has_archive_suffix(package) {
            self.installer.inspect_archive(package)
        } else {
            Err(Error::invalid_path(format!(
                "Bundled package not found: {}",
                self.ctx.log_path(package)
            )))
        }
    }

    /// Replace an imported record's files with a newer bundled version
    async fn refresh_entry(
        &self,
        plan: InstallPlan,
        existing: ExtensionRecord,
        report: &mut BundledReport,
    ) -> Result<()> {
        let _guard = self.ctx.locks.lock(scope::extension(&existing.id)).await;
        let mut record = self.installer.commit(plan)?;
        record.source = existing.source;
        record.is_system = existing.is_system;
        record.removable = existing.removable;
        record.enabled = existing.enabled;
        record.allow_file_access = existing.allow_file_access;
        record.bundle_key = existing.bundle_key.clone();
        record.install_date = existing.install_date;
        record.host_id = None;

        self.registry.upsert(record.clone()).await?;
        if existing.installed_path != record.installed_path {
            fsutil::remove_dir_best_effort(&existing.installed_path);
        }
        self.ledger.record(
            &record.id,
            Some(LifecycleState::Installed),
            Some(LifecycleState::Installed),
            ExtensionEvent::Updated {
                from_version: existing.version,
                to_version: record.version.clone(),
            },
        );
        report.refreshed.push(record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults() {
        let entry: BundledEntry = serde_json::from_str(r#"{"path": "reader/"}"#).unwrap();
        assert!(entry.system);
        assert!(entry.enabled);
        assert!(!entry.allow_file_access);
        assert_eq!(entry.key(), "reader");
    }

    #[test]
    fn test_both_file_shapes_parse() {
        let wrapped: PreinstalledFile =
            serde_json::from_str(r#"{"extensions": [{"path": "a"}]}"#).unwrap();
        let list: PreinstalledFile = serde_json::from_str(r#"[{"path": "a"}]"#).unwrap();
        assert_eq!(wrapped.into_entries(), list.into_entries());
    }

    #[test]
    fn test_safe_relative() {
        assert!(is_safe_relative("reader"));
        assert!(is_safe_relative("packs/reader.zip"));
        assert!(!is_safe_relative("../reader"));
        assert!(!is_safe_relative("/etc/reader"));
        assert!(!is_safe_relative(""));
    }
}
