//! Web store update sweep
//!
//! The store refreshes every package it manages in one call; the sweep then
//! walks the registry, switches each web store record to the newest version
//! directory found on disk and reloads it.

use super::LifecycleCoordinator;
use crate::events::{ExtensionEvent, LifecycleState};
use crate::fsutil;
use crate::installer::{preferred_icon_size, read_manifest};
use crate::locale;
use crate::lock::scope;
use crate::validator::ManifestValidator;
use chrono::Utc;
use quiver_core::types::{icon_url, ExtensionRecord, ExtensionSource, UpdateOutcome, VersionTuple};
use quiver_core::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedEntry {
    pub id: String,
    pub from: String,
    pub to: String,
    /// False when the new version is recorded but the host failed to load it
    pub loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    AlreadyLatest,
    NotWebstore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSkip {
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateError {
    pub id: String,
    pub error: String,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSummary {
    pub updated: Vec<UpdatedEntry>,
    pub skipped: Vec<UpdateSkip>,
    pub errors: Vec<UpdateError>,
}

/// Newest `<version>_<n>` directory under an id root
pub(crate) fn latest_version_dir(id_root: &Path) -> Option<(VersionTuple, PathBuf)> {
    let entries = fs::read_dir(id_root).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            VersionTuple::from_dir_name(&name).map(|v| (v, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
}

/// Remove every version directory under `id_root` except `keep`
fn prune_versions(id_root: &Path, keep: &Path) {
    let Ok(entries) = fs::read_dir(id_root) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path != keep && path.is_dir() {
            debug!("Pruning old version directory {:?}", path);
            fsutil::remove_dir_best_effort(&path);
        }
    }
}

enum SweepStep {
    Updated { from: String, to: String, loaded: bool },
    AlreadyLatest,
}

impl LifecycleCoordinator {
    /// Update every web store extension
    pub async fn update(&self) -> Result<UpdateSummary> {
        if !self.store.is_available() {
            return Err(Error::not_available("Web store support is not available"));
        }
        let _global = self.ctx.locks.lock(scope::GLOBAL_UPDATE).await;

        self.store.update_all().await?;

        let mut summary = UpdateSummary::default();
        for record in self.registry.list().await {
            if record.source != ExtensionSource::Webstore {
                summary.skipped.push(UpdateSkip {
                    id: record.id,
                    reason: SkipReason::NotWebstore,
                });
                continue;
            }

            let _guard = self.ctx.locks.lock(scope::extension(&record.id)).await;
            let id = record.id.clone();
            let outcome = self.update_one(record).await;
            let last_result = match &outcome {
                Ok(SweepStep::Updated { .. }) => UpdateOutcome::Updated,
                Ok(SweepStep::AlreadyLatest) => UpdateOutcome::AlreadyLatest,
                Err(_) => UpdateOutcome::Failed,
            };
            let stamped = self
                .registry
                .update(&id, |r| {
                    r.update.last_checked = Some(Utc::now());
                    r.update.last_result = Some(last_result);
                })
                .await;
            if let Err(e) = stamped {
                warn!("Failed to record update check for {}: {}", id, e);
            }

            match outcome {
                Ok(SweepStep::Updated { from, to, loaded }) => {
                    summary.updated.push(UpdatedEntry {
                        id,
                        from,
                        to,
                        loaded,
                    });
                }
                Ok(SweepStep::AlreadyLatest) => summary.skipped.push(UpdateSkip {
                    id,
                    reason: SkipReason::AlreadyLatest,
                }),
                Err(e) => {
                    warn!("Update of {} failed: {}", id, e);
                    summary.errors.push(UpdateError {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Update sweep: {} updated, {} skipped, {} failed",
            summary.updated.len(),
            summary.skipped.len(),
            summary.errors.len()
        );
        Ok(summary)
    }

    async fn update_one(&self, record: ExtensionRecord) -> Result<SweepStep> {
        let id_root = self.ctx.paths.id_root(&record.id);
        let current = VersionTuple::parse(&record.version);
        let Some((latest, latest_dir)) = latest_version_dir(&id_root) else {
            return Ok(SweepStep::AlreadyLatest);
        };
        if current.as_ref().is_some_and(|c| latest <= *c) {
            return Ok(SweepStep::AlreadyLatest);
        }

        let manifest = read_manifest(&latest_dir)?;
        let report = ManifestValidator::new(&self.ctx.policy).validate(&manifest, Some(&latest_dir));
        if report.is_denied() {
            return Err(report.to_error());
        }

        let from = record.version.clone();
        let to = VersionTuple::normalize(manifest.version());
        let (display_name, display_description) =
            locale::display_strings(&latest_dir, &manifest, &self.ctx.config.app_locale);

        if let Some(host_id) = &record.host_id {
            if let Err(e) = self.host.remove(host_id).await {
                warn!("Host failed to unload {} before update: {}", record.id, e);
            }
        }

        let mut updated = record.clone();
        updated.version = to.clone();
        updated.name = manifest.name().unwrap_or_default().to_string();
        updated.display_name = display_name;
        updated.display_description = display_description;
        updated.permissions = manifest.permissions();
        updated.icon_path = Some(icon_url(
            &self.ctx.config.icon_scheme,
            &record.id,
            preferred_icon_size(&manifest),
            &to,
        ));
        updated.manifest = manifest;
        updated.installed_path = latest_dir.clone();
        updated.warnings = report.warnings;
        updated.risk_score = report.risk_score;
        updated.host_id = None;
        self.registry
            .upsert(updated.clone())
            .await
            .map_err(|e| e.persist_as(|m| Error::update_failed(m)))?;

        self.ledger.record(
            &record.id,
            Some(LifecycleState::Installed),
            Some(LifecycleState::Installed),
            ExtensionEvent::Updated {
                from_version: from.clone(),
                to_version: to.clone(),
            },
        );

        // the new version may have dropped its toolbar action
        if !updated.has_action() && self.pins.is_pinned(&record.id).await {
            if let Err(e) = self.pins.unpin(&record.id).await {
                warn!("Failed to unpin {} after update: {}", record.id, e);
            }
        }

        let loaded = if updated.enabled {
            self.reload_updated(&updated).await
        } else {
            false
        };
        prune_versions(&id_root, &latest_dir);

        info!("Updated {} from {} to {}", record.id, from, to);
        Ok(SweepStep::Updated { from, to, loaded })
    }

    /// Load the new version; a failure leaves the record updated but unloaded
    async fn reload_updated(&self, updated: &ExtensionRecord) -> bool {
        let loaded = match self.host_load(updated).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Host failed to load updated {}: {}", updated.id, e);
                self.ledger.record(
                    &updated.id,
                    Some(LifecycleState::Installed),
                    Some(LifecycleState::Installed),
                    ExtensionEvent::LoadFailed {
                        version: updated.version.clone(),
                        error_message: e.to_string(),
                    },
                );
                return false;
            }
        };
        let host_id = loaded.host_id;
        match self
            .registry
            .update(&updated.id, |r| r.host_id = Some(host_id))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to record host id of updated {}: {}", updated.id, e);
                false
            }
        }
    }
}
