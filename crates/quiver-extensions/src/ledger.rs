//! Activity ledger (`<base>/activity.jsonl`)
//!
//! Append-only JSON lines, one [`EventEnvelope`] per line, written under an
//! exclusive file lock. The engine records through [`ActivityLedger::record`],
//! which logs failures instead of surfacing them.

use crate::events::{EventEnvelope, ExtensionEvent, LifecycleState};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use fs4::fs_std::FileExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Auto-compaction runs every N appends
const AUTO_COMPACT_INTERVAL: usize = 200;

/// Retention used by auto-compaction
const AUTO_COMPACT_RETENTION_DAYS: i64 = 90;

/// Ledger statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total_events: usize,
    pub file_size_bytes: u64,
    pub event_type_counts: HashMap<String, usize>,
}

pub struct ActivityLedger {
    ledger_path: PathBuf,
    // appends since this ledger was opened
    appends: AtomicUsize,
}

impl ActivityLedger {
    pub fn new(ledger_path: PathBuf) -> Self {
        Self {
            ledger_path,
            appends: AtomicUsize::new(0),
        }
    }

    /// Append an event, logging instead of failing
    pub fn record(
        &self,
        extension_id: &str,
        before: Option<LifecycleState>,
        after: Option<LifecycleState>,
        event: ExtensionEvent,
    ) {
        let envelope = EventEnvelope::new(extension_id, before, after, event);
        if let Err(e) = self.append(&envelope) {
            warn!("Failed to record {} event: {:#}", envelope.event.type_name(), e);
        }
    }

    /// Append event to ledger (file-locked) with auto-compaction
    pub fn append(&self, event: &EventEnvelope) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent).context("Failed to create ledger parent directory")?;
        }

        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.ledger_path)
                .context("Failed to open ledger file")?;

            // Released when `file` is dropped
            file.lock_exclusive()
                .context("Failed to acquire exclusive lock on ledger")?;

            let json_line = serde_json::to_string(event).context("Failed to serialize event")?;
            writeln!(file, "{}", json_line).context("Failed to write event to ledger")?;
            file.sync_all().context("Failed to sync ledger file")?;
        }

        self.maybe_auto_compact();
        Ok(())
    }

    fn maybe_auto_compact(&self) {
        let count = self.appends.fetch_add(1, Ordering::Relaxed) + 1;
        if count % AUTO_COMPACT_INTERVAL == 0 {
            match self.compact(AUTO_COMPACT_RETENTION_DAYS) {
                Ok(removed) if removed > 0 => {
                    info!("Auto-compacted activity ledger: removed {} events", removed)
                }
                Ok(_) => {}
                Err(e) => warn!("Auto-compaction failed: {:#}", e),
            }
        }
    }

    /// Every parseable event in file order; unparseable lines are skipped
    fn read_all(&self) -> Result<Vec<EventEnvelope>> {
        if !self.ledger_path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.ledger_path).context("Failed to open ledger file")?;
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read line from ledger")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(envelope) => events.push(envelope),
                Err(e) => debug!("Skipping unreadable ledger line: {}", e),
            }
        }
        Ok(events)
    }

    /// Events for one extension, oldest first, limited to the most recent `limit`
    pub fn history(&self, extension_id: &str, limit: Option<usize>) -> Result<Vec<EventEnvelope>> {
        let mut events: Vec<EventEnvelope> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.extension_id == extension_id)
            .collect();
        if let Some(limit) = limit {
            if events.len() > limit {
                events = events.split_off(events.len() - limit);
            }
        }
        Ok(events)
    }

    /// Most recent `limit` events across all extensions, oldest first
    pub fn recent(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let mut events = self.read_all()?;
        if events.len() > limit {
            events = events.split_off(events.len() - limit);
        }
        Ok(events)
    }

    /// Drop events older than the retention period, keeping the latest event
    /// of every extension
    pub fn compact(&self, retention_days: i64) -> Result<usize> {
        if !self.ledger_path.exists() {
            return Ok(0);
        }

        let events = self.read_all()?;
        let cutoff = Utc::now() - Duration::days(retention_days);

        let mut latest: HashMap<&str, &EventEnvelope> = HashMap::new();
        for event in &events {
            latest
                .entry(event.extension_id.as_str())
                .and_modify(|current| {
                    if event.timestamp >= current.timestamp {
                        *current = event;
                    }
                })
                .or_insert(event);
        }
        let keep_ids: HashSet<&str> = latest.values().map(|e| e.event_id.as_str()).collect();

        let temp_path = self.ledger_path.with_extension("jsonl.tmp");
        let mut temp_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .context("Failed to create temp ledger file")?;

        let mut removed = 0;
        for event in &events {
            if event.timestamp >= cutoff || keep_ids.contains(event.event_id.as_str()) {
                let line = serde_json::to_string(event).context("Failed to serialize event")?;
                writeln!(temp_file, "{}", line).context("Failed to write to temp ledger")?;
            } else {
                removed += 1;
            }
        }

        temp_file.sync_all().context("Failed to sync temp ledger")?;
        drop(temp_file);

        fs::rename(&temp_path, &self.ledger_path)
            .context("Failed to replace ledger with compacted version")?;
        Ok(removed)
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let events = self.read_all()?;
        let mut event_type_counts = HashMap::new();
        for event in &events {
            *event_type_counts
                .entry(event.event.type_name().to_string())
                .or_insert(0) += 1;
        }
        let file_size_bytes = fs::metadata(&self.ledger_path).map(|m| m.len()).unwrap_or(0);
        Ok(LedgerStats {
            total_events: events.len(),
            file_size_bytes,
            event_type_counts,
        })
    }
}
