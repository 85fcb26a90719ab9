//! Host id reconciliation
//!
//! A package is placed under the id derived from its manifest, but the host
//! may assign a different id once loaded (e.g. from the manifest `key`).
//! The registry follows the host: the version directory is moved to
//! `<base>/<hostId>/`, the record is re-keyed and the extension reloaded
//! from its new location.

use super::LifecycleCoordinator;
use crate::events::{ExtensionEvent, LifecycleState};
use crate::fsutil;
use crate::host::HostLoaded;
use crate::identity;
use crate::installer::preferred_icon_size;
use crate::lock::scope;
use quiver_core::types::{icon_url, ExtensionRecord};
use quiver_core::{Error, Result};
use tracing::{info, warn};

impl LifecycleCoordinator {
    /// Re-key `record` to the id the host assigned in `loaded`
    pub(super) async fn reconcile_host_id(
        &self,
        record: ExtensionRecord,
        loaded: HostLoaded,
        fresh: bool,
    ) -> Result<ExtensionRecord> {
        let old_id = record.id.clone();
        let new_id = loaded.host_id;

        if !identity::is_valid_record_id(&new_id) {
            warn!(
                "Host id {:?} for {} is not usable as a directory name; keeping {}",
                new_id, old_id, old_id
            );
            return self
                .registry
                .update(&old_id, |r| r.host_id = Some(new_id))
                .await;
        }

        // The caller holds `extension:<old_id>`. Extension keys are only
        // awaited in ascending order; a lower key is taken only when free.
        let new_key = scope::extension(&new_id);
        let _guard = if new_key > scope::extension(&old_id) {
            self.ctx.locks.lock(new_key).await
        } else if let Some(guard) = self.ctx.locks.try_lock(new_key) {
            guard
        } else {
            warn!("Host id {} of {} is busy", new_id, old_id);
            let error = Error::invalid_state(format!(
                "Extension {} is busy with another operation",
                new_id
            ));
            return Err(self.reject_conflict(&record, &new_id, true, error, fresh).await);
        };

        if let Some(existing) = self.registry.get(&new_id).await {
            warn!(
                "Host id {} of {} is already taken by {}",
                existing.id,
                old_id,
                existing.label()
            );
            // the host load now belongs to the existing record if it was loaded
            let error = Error::already_exists(&existing.id);
            return Err(self
                .reject_conflict(&record, &existing.id, !existing.is_loaded(), error, fresh)
                .await);
        }

        if let Err(e) = self.host.remove(&new_id).await {
            warn!("Host failed to unload {} before re-keying: {}", new_id, e);
        }

        let new_dir = self.ctx.paths.version_dir(&new_id, &record.version);
        if let Err(e) = fsutil::rename_dir(&record.installed_path, &new_dir) {
            warn!("Could not move {} to its host id {}: {:#}", old_id, new_id, e);
            let reloaded = self.host_load(&record).await?;
            return self
                .registry
                .update(&old_id, |r| r.host_id = Some(reloaded.host_id))
                .await;
        }
        fsutil::remove_if_empty(&self.ctx.paths.id_root(&old_id));

        let mut moved = record.clone();
        moved.id = new_id.clone();
        moved.installed_path = new_dir;
        moved.icon_path = Some(icon_url(
            &self.ctx.config.icon_scheme,
            &new_id,
            preferred_icon_size(&moved.manifest),
            &moved.version,
        ));
        moved.host_id = None;

        if let Err(e) = self.registry.replace_id(&old_id, moved.clone()).await {
            if let Err(undo) = fsutil::rename_dir(&moved.installed_path, &record.installed_path) {
                warn!("Failed to move {} back after re-key failure: {:#}", old_id, undo);
            }
            return Err(e);
        }

        if self.pins.is_pinned(&old_id).await {
            self.pins.unpin(&old_id).await?;
            if let Err(e) = self.pins.pin(&moved).await {
                warn!("Could not carry pin over to {}: {}", new_id, e);
            }
        }

        info!("Re-keyed {} to host id {}", old_id, new_id);
        self.ledger.record(
            &new_id,
            Some(LifecycleState::Installed),
            Some(LifecycleState::Installed),
            ExtensionEvent::IdReassigned {
                from_id: old_id,
                to_id: new_id.clone(),
            },
        );

        self.load_moved(moved).await
    }

    async fn load_moved(&self, moved: ExtensionRecord) -> Result<ExtensionRecord> {
        match self.host_load(&moved).await {
            Ok(reloaded) => {
                self.registry
                    .update(&moved.id, |r| r.host_id = Some(reloaded.host_id))
                    .await
            }
            Err(e) => {
                self.ledger.record(
                    &moved.id,
                    Some(LifecycleState::Installed),
                    Some(LifecycleState::Installed),
                    ExtensionEvent::LoadFailed {
                        version: moved.version.clone(),
                        error_message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Undo a load whose host id could not be taken over
    ///
    /// A fresh install is removed completely; an existing record stays
    /// registered but unloaded. `unload` drops the host's copy under
    /// `host_id`.
    async fn reject_conflict(
        &self,
        record: &ExtensionRecord,
        host_id: &str,
        unload: bool,
        error: Error,
        fresh: bool,
    ) -> Error {
        if unload {
            if let Err(e) = self.host.remove(host_id).await {
                warn!("Host failed to unload {}: {}", host_id, e);
            }
        }

        if fresh {
            if let Err(e) = self.registry.remove(&record.id).await {
                warn!("Failed to drop {} from the registry: {}", record.id, e);
            }
            fsutil::remove_dir_best_effort(&record.installed_path);
            fsutil::remove_if_empty(&self.ctx.paths.id_root(&record.id));
            self.ledger.record(
                &record.id,
                Some(LifecycleState::Installed),
                Some(LifecycleState::Removed),
                ExtensionEvent::InstallFailed {
                    code: error.code().to_string(),
                    error_message: error.to_string(),
                },
            );
        } else if let Err(e) = self.registry.update(&record.id, |r| r.host_id = None).await {
            warn!("Failed to clear host id of {}: {}", record.id, e);
        }
        error
    }
}
