//! Keyed mutex and scoped lock names
//!
//! Each key owns a serial queue: holders of the same key run one after the
//! other in arrival order, different keys never block each other. A key's
//! slot is dropped as soon as the last holder or waiter goes away, so the map
//! only ever contains keys that are in use. Locks are cooperative with no
//! timeout.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Per-key serial executor
#[derive(Clone, Default)]
pub struct KeyedMutex {
    slots: Slots,
}

/// Held lock for one key; releasing it hands the key to the next waiter
pub struct KeyedGuard {
    key: String,
    slot: Arc<Mutex<()>>,
    slots: Slots,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `key` and hold it until the guard is dropped
    pub async fn lock(&self, key: impl Into<String>) -> KeyedGuard {
        let key = key.into();
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        KeyedGuard {
            key,
            slot,
            slots: Arc::clone(&self.slots),
            _guard: guard,
        }
    }

    /// Take `key` only if nobody holds or awaits it
    pub fn try_lock(&self, key: impl Into<String>) -> Option<KeyedGuard> {
        let key = key.into();
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = Arc::clone(&slot).try_lock_owned().ok()?;
        Some(KeyedGuard {
            key,
            slot,
            slots: Arc::clone(&self.slots),
            _guard: guard,
        })
    }

    /// Run `f` while holding `key`
    pub async fn run<F, Fut, T>(&self, key: impl Into<String>, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        f().await
    }

    /// Whether `key` is currently held or awaited
    pub fn is_busy(&self, key: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of keys currently held or awaited
    pub fn active_keys(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // The map, `slot` and the owned guard account for three references;
        // anything beyond that is a waiter that still needs the slot.
        if Arc::strong_count(&self.slot) <= 3 {
            if let Some(current) = slots.get(&self.key) {
                if Arc::ptr_eq(current, &self.slot) {
                    slots.remove(&self.key);
                }
            }
        }
    }
}

/// Well-known lock names
pub mod scope {
    use super::Path;

    /// One store install at a time
    pub const GLOBAL_INSTALL: &str = "global:install";

    /// One update sweep at a time
    pub const GLOBAL_UPDATE: &str = "global:update";

    /// All mutators of one record
    pub fn extension(id: &str) -> String {
        format!("extension:{id}")
    }

    /// Concurrent installs of the same source
    pub fn install_source(source: &Path) -> String {
        format!("install:{}", source.display())
    }
}
