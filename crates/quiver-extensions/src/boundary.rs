//! Pre-flight guards for the IPC boundary
//!
//! The IPC layer calls these before handing a request to the coordinator:
//! a per-sender rate limit on install attempts and a capped upload area for
//! archives the UI writes to disk.

use crate::sanitize::PathSanitizer;
use quiver_core::{EnginePaths, Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default install attempts per window
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Default sliding window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: u64 = 60 * 1024 * 1024;

/// Sliding-window limiter keyed by sender
pub struct RateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt from `sender`, failing with `E_RATE_LIMIT` when over
    pub fn check(&self, sender: &str) -> Result<()> {
        self.check_at(sender, Instant::now())
    }

    pub fn check_at(&self, sender: &str, now: Instant) -> Result<()> {
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| Error::rate_limit("limiter state poisoned"))?;

        // Forget senders with nothing left in the window
        attempts.retain(|_, times| {
            times.retain(|t| now.saturating_duration_since(*t) < self.window);
            !times.is_empty()
        });

        let times = attempts.entry(sender.to_string()).or_default();
        if times.len() >= self.max_attempts {
            debug!("Rate limit hit for sender {}", sender);
            return Err(Error::rate_limit(format!(
                "At most {} install attempts per {} seconds",
                self.max_attempts,
                self.window.as_secs()
            )));
        }
        times.push(now);
        Ok(())
    }
}

/// Engine-owned directory for uploaded archive blobs (`<base>/_uploads`)
pub struct UploadArea {
    dir: PathBuf,
    max_bytes: u64,
}

impl UploadArea {
    pub fn new(paths: &EnginePaths) -> Self {
        Self {
            dir: paths.uploads_dir(),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an uploaded blob, keeping only its archive suffix
    pub fn store(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        if !PathSanitizer::has_archive_suffix(Path::new(file_name)) {
            return Err(Error::invalid_path(
                "Only .zip, .crx and .crx3 files can be uploaded",
            ));
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(Error::invalid_path(format!(
                "Upload exceeds {} bytes",
                self.max_bytes
            )));
        }

        let suffix = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}.{}", Uuid::new_v4().simple(), suffix));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Remove an upload once it has been consumed
    pub fn discard(&self, path: &Path) {
        if path.starts_with(&self.dir) {
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to discard upload: {}", e);
            }
        }
    }

    /// Delete uploads older than `max_age`; returns how many were removed
    pub fn sweep(&self, max_age: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age >= max_age);
            if !expired {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to sweep upload: {}", e),
            }
        }
        removed
    }
}
