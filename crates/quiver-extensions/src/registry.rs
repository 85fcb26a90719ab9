//! Durable registry of installed extensions (`<base>/extensions.json`)
//!
//! The in-memory record list is the source of truth while the engine runs.
//! Every mutation is persisted with an atomic JSON write while the state
//! lock is held, so readers of the file see either the old or the new
//! document and writes never interleave.

use crate::context::EngineContext;
use crate::fsutil;
use crate::locale;
use quiver_core::types::{icon_url, is_virtual_icon_url, ExtensionRecord, RegistryFile};
use quiver_core::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Why a record was dropped during cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalReason {
    MissingPath,
    OutsideBase,
    DuplicateId,
    DuplicateHostId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedRecord {
    pub id: String,
    pub reason: RemovalReason,
}

/// Result of a registry clean pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub initial: usize,
    #[serde(rename = "final")]
    pub remaining: usize,
    pub removed: Vec<RemovedRecord>,
}

/// Registry service
pub struct Registry {
    ctx: EngineContext,
    records: Mutex<Vec<ExtensionRecord>>,
}

fn persist_error(e: anyhow::Error) -> Error {
    Error::Persist {
        what: "registry",
        message: format!("{:#}", e),
    }
}

impl Registry {
    /// Empty registry; call [`Registry::load`] to read the file
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Read the registry file, clean it and persist if anything changed
    pub async fn load(&self) -> Result<CleanReport> {
        let path = self.ctx.paths.registry_file();
        let file: RegistryFile = fsutil::read_json_or(&path, RegistryFile::default());
        debug!("Loaded {} registry entries", file.extensions.len());

        let mut records = self.records.lock().await;
        *records = file.extensions;
        self.clean_locked(&mut records)
    }

    /// Re-run the clean pass on the in-memory state
    pub async fn validate_and_clean(&self) -> Result<CleanReport> {
        let mut records = self.records.lock().await;
        self.clean_locked(&mut records)
    }

    fn clean_locked(&self, records: &mut Vec<ExtensionRecord>) -> Result<CleanReport> {
        let initial = records.len();
        let (cleaned, removed, changed) = self.clean(std::mem::take(records));
        *records = cleaned;

        if changed {
            info!(
                "Registry cleaned: {} -> {} entries",
                initial,
                records.len()
            );
            self.write(records)?;
        }

        Ok(CleanReport {
            initial,
            remaining: records.len(),
            removed,
        })
    }

    /// Reap stale entries, refresh derived fields and dedupe
    fn clean(
        &self,
        records: Vec<ExtensionRecord>,
    ) -> (Vec<ExtensionRecord>, Vec<RemovedRecord>, bool) {
        let mut removed = Vec::new();
        let mut changed = false;
        let mut seen_ids = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());

        for mut record in records {
            let reason = if !self.ctx.paths.contains(&record.installed_path) {
                Some(RemovalReason::OutsideBase)
            } else if !record.installed_path.is_dir() {
                Some(RemovalReason::MissingPath)
            } else if !seen_ids.insert(record.id.clone()) {
                Some(RemovalReason::DuplicateId)
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!("Dropping registry entry {} ({:?})", record.id, reason);
                removed.push(RemovedRecord {
                    id: record.id,
                    reason,
                });
                continue;
            }

            changed |= self.refresh_derived(&mut record);
            kept.push(record);
        }

        // One record per host id; a system record wins over the others
        let mut winners: HashMap<String, usize> = HashMap::new();
        for (index, record) in kept.iter().enumerate() {
            let Some(host_id) = &record.host_id else {
                continue;
            };
            match winners.get(host_id) {
                Some(&current) if kept[current].is_system || !record.is_system => {}
                _ => {
                    winners.insert(host_id.clone(), index);
                }
            }
        }
        let mut index = 0;
        kept.retain(|record| {
            let keep = match &record.host_id {
                Some(host_id) => winners.get(host_id) == Some(&index),
                None => true,
            };
            index += 1;
            if !keep {
                warn!("Dropping registry entry {} (duplicate host id)", record.id);
                removed.push(RemovedRecord {
                    id: record.id.clone(),
                    reason: RemovalReason::DuplicateHostId,
                });
            }
            keep
        });

        changed |= !removed.is_empty();
        (kept, removed, changed)
    }

    /// Fill display strings and upgrade legacy icon paths
    fn refresh_derived(&self, record: &mut ExtensionRecord) -> bool {
        let mut changed = false;
        let config = &self.ctx.config;

        if record.display_name.is_empty() {
            let (name, description) =
                locale::display_strings(&record.installed_path, &record.manifest, &config.app_locale);
            record.display_name = name;
            if record.display_description.is_empty() {
                record.display_description = description;
            }
            changed = true;
        }

        let legacy = match &record.icon_path {
            Some(path) => !is_virtual_icon_url(&config.icon_scheme, path),
            None => true,
        };
        if legacy {
            record.icon_path = Some(icon_url(
                &config.icon_scheme,
                &record.id,
                crate::installer::preferred_icon_size(&record.manifest),
                &record.version,
            ));
            changed = true;
        }

        changed
    }

    fn write(&self, records: &[ExtensionRecord]) -> Result<()> {
        let file = RegistryFile {
            extensions: records.to_vec(),
        };
        fsutil::write_json_atomic(&self.ctx.paths.registry_file(), &file).map_err(persist_error)
    }

    /// Persist the current state
    pub async fn persist(&self) -> Result<()> {
        let records = self.records.lock().await;
        self.write(&records)
    }

    pub async fn list(&self) -> Vec<ExtensionRecord> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ExtensionRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.lock().await.iter().any(|r| r.id == id)
    }

    /// Add a new record; fails if the id is taken
    pub async fn insert(&self, record: ExtensionRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(Error::already_exists(record.id));
        }
        records.push(record);
        if let Err(e) = self.write(&records) {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Insert or replace by id
    pub async fn upsert(&self, record: ExtensionRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let previous = match records.iter().position(|r| r.id == record.id) {
            Some(index) => Some((index, std::mem::replace(&mut records[index], record))),
            None => {
                records.push(record);
                None
            }
        };
        if let Err(e) = self.write(&records) {
            match previous {
                Some((index, old)) => records[index] = old,
                None => {
                    records.pop();
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Mutate one record in place and persist
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<ExtensionRecord>
    where
        F: FnOnce(&mut ExtensionRecord),
    {
        let mut records = self.records.lock().await;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::invalid_id(id))?;
        let previous = records[index].clone();
        mutate(&mut records[index]);
        let updated = records[index].clone();
        if let Err(e) = self.write(&records) {
            records[index] = previous;
            return Err(e);
        }
        Ok(updated)
    }

    /// Replace the record `old_id` with `record` (which carries a new id)
    pub async fn replace_id(&self, old_id: &str, record: ExtensionRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if record.id != old_id && records.iter().any(|r| r.id == record.id) {
            return Err(Error::already_exists(record.id));
        }
        let index = records
            .iter()
            .position(|r| r.id == old_id)
            .ok_or_else(|| Error::invalid_id(old_id))?;
        let previous = std::mem::replace(&mut records[index], record);
        if let Err(e) = self.write(&records) {
            records[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Remove a record, returning it
    pub async fn remove(&self, id: &str) -> Result<Option<ExtensionRecord>> {
        let mut records = self.records.lock().await;
        let Some(position) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(position);
        if let Err(e) = self.write(&records) {
            records.insert(position, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }
}
