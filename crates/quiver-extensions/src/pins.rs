//! Toolbar pin list (`<base>/pinned.json`)

use crate::context::EngineContext;
use crate::fsutil;
use quiver_core::types::{ExtensionRecord, PinnedFile};
use quiver_core::{Error, Result};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::debug;

/// Maximum number of pinned extensions
pub const PIN_CAPACITY: usize = 6;

/// Ordered list of pinned extension ids
pub struct PinService {
    ctx: EngineContext,
    pins: Mutex<Vec<String>>,
}

impl PinService {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            pins: Mutex::new(Vec::new()),
        }
    }

    /// Read the pin file
    pub async fn load(&self) -> Vec<String> {
        let file: PinnedFile =
            fsutil::read_json_or(&self.ctx.paths.pinned_file(), PinnedFile::default());
        let mut pins = self.pins.lock().await;
        let mut seen = HashSet::new();
        *pins = file
            .pinned_extensions
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        pins.clone()
    }

    fn write(&self, pins: &[String]) -> Result<()> {
        let file = PinnedFile {
            pinned_extensions: pins.to_vec(),
        };
        fsutil::write_json_atomic(&self.ctx.paths.pinned_file(), &file)
            .map_err(|e| Error::invalid_state(format!("Failed to write pin list: {:#}", e)))
    }

    pub async fn list(&self) -> Vec<String> {
        self.pins.lock().await.clone()
    }

    pub async fn is_pinned(&self, id: &str) -> bool {
        self.pins.lock().await.iter().any(|p| p == id)
    }

    /// Pin an enabled extension that declares a toolbar action
    ///
    /// Pinning an already pinned id is a no-op.
    pub async fn pin(&self, record: &ExtensionRecord) -> Result<Vec<String>> {
        if !record.enabled {
            return Err(Error::invalid_state("Disabled extensions cannot be pinned"));
        }
        if !record.has_action() {
            return Err(Error::invalid_state("Extension has no toolbar action"));
        }

        let mut pins = self.pins.lock().await;
        if pins.iter().any(|p| *p == record.id) {
            return Ok(pins.clone());
        }
        if pins.len() >= PIN_CAPACITY {
            return Err(Error::PinLimit {
                capacity: PIN_CAPACITY,
            });
        }
        pins.push(record.id.clone());
        if let Err(e) = self.write(&pins) {
            pins.pop();
            return Err(e);
        }
        debug!("Pinned {}", record.id);
        Ok(pins.clone())
    }

    /// Pin when eligible and a slot is free; never fails the caller
    pub async fn auto_pin(&self, record: &ExtensionRecord) -> bool {
        if !record.enabled || !record.has_action() {
            return false;
        }
        {
            let pins = self.pins.lock().await;
            if pins.len() >= PIN_CAPACITY || pins.iter().any(|p| *p == record.id) {
                return false;
            }
        }
        self.pin(record).await.is_ok()
    }

    /// Remove an id; unpinning an absent id is a no-op
    pub async fn unpin(&self, id: &str) -> Result<Vec<String>> {
        let mut pins = self.pins.lock().await;
        let before = pins.len();
        pins.retain(|p| p != id);
        if pins.len() != before {
            self.write(&pins)?;
            debug!("Unpinned {}", id);
        }
        Ok(pins.clone())
    }

    /// Drop every pin whose record no longer qualifies
    pub async fn retain_eligible(&self, records: &[ExtensionRecord]) -> Result<Vec<String>> {
        let mut pins = self.pins.lock().await;
        let before = pins.len();
        pins.retain(|id| {
            records
                .iter()
                .any(|r| r.id == *id && r.enabled && r.has_action())
        });
        pins.truncate(PIN_CAPACITY);
        if pins.len() != before {
            self.write(&pins)?;
        }
        Ok(pins.clone())
    }
}
