//! Filesystem helpers: atomic JSON documents and atomic directory placement
//!
//! JSON documents are written to `<file>.<rand>.tmp` and renamed over the
//! target, so readers observe either the old or the new document. Directory
//! placement stages into `<target>.tmp.<ts>` next to the target and renames.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// How a prepared directory reaches its final location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Recursively copy, leaving the source untouched
    Copy,
    /// Rename the source (falls back to copy across filesystems)
    Move,
}

/// Read a JSON document, returning `fallback` for a missing, empty or invalid file
///
/// A UTF-8 byte order mark is stripped before parsing.
pub fn read_json_or<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {:?}: {}", path, e);
            }
            return fallback;
        }
    };
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return fallback;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring invalid JSON in {:?}: {}", path, e);
            fallback
        }
    }
}

/// Atomically replace `path` with the pretty-printed JSON of `value`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create parent directory")?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let temp_path = path.with_file_name(format!(
        "{}.{}.tmp",
        file_name,
        Uuid::new_v4().simple()
    ));

    let result = (|| -> Result<()> {
        let content = serde_json::to_vec_pretty(value).context("Failed to serialize document")?;
        let mut file = fs::File::create(&temp_path).context("Failed to create temp file")?;
        file.write_all(&content).context("Failed to write temp file")?;
        file.sync_all().context("Failed to sync temp file")?;
        drop(file);
        fs::rename(&temp_path, path).context("Failed to replace document")?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Recursively copy `src` into `dst`, returning the number of files copied
///
/// Symlinks are skipped so a package can never smuggle links to files
/// outside its own tree.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {:?}", dst))?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.context("Failed to walk source directory")?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .context("Walked outside of source directory")?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            warn!("Skipping symlink {:?}", relative);
        } else if file_type.is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("Failed to create {:?}", target))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {:?}", relative))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Staging sibling `<target>.tmp.<ts>` used while placing a directory
pub fn staging_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(
        "{}.tmp.{}",
        name,
        chrono::Utc::now().timestamp_millis()
    ))
}

/// Place `source` at `target`, replacing whatever is there
///
/// The content is first staged at `<target>.tmp.<ts>`; the existing target
/// is removed only once staging succeeded, then the staging directory is
/// renamed into place. The staging directory is removed on every failure.
pub fn place_dir_atomic(source: &Path, target: &Path, placement: Placement) -> Result<()> {
    let parent = target
        .parent()
        .context("Target directory has no parent")?;
    fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;

    let staging = staging_sibling(target);
    let result = (|| -> Result<()> {
        match placement {
            Placement::Copy => {
                copy_dir_recursive(source, &staging)?;
            }
            Placement::Move => {
                if let Err(e) = fs::rename(source, &staging) {
                    debug!("Rename failed ({}), copying instead", e);
                    copy_dir_recursive(source, &staging)?;
                    remove_dir_best_effort(source);
                }
            }
        }

        if target.exists() {
            fs::remove_dir_all(target)
                .with_context(|| format!("Failed to remove existing {:?}", target))?;
        }
        fs::rename(&staging, target)
            .with_context(|| format!("Failed to move staged directory into {:?}", target))?;
        Ok(())
    })();

    if result.is_err() && staging.exists() {
        remove_dir_best_effort(&staging);
    }
    result
}

/// Rename a directory, creating the destination's parent
pub fn rename_dir(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if to.exists() {
        anyhow::bail!("Destination already exists: {:?}", to);
    }
    fs::rename(from, to).with_context(|| format!("Failed to rename {:?} to {:?}", from, to))
}

/// Remove a directory tree, logging failures
pub fn remove_dir_best_effort(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Remove `dir` if it exists and is empty
pub fn remove_if_empty(dir: &Path) {
    if let Ok(mut entries) = fs::read_dir(dir) {
        if entries.next().is_none() {
            let _ = fs::remove_dir(dir);
        }
    }
}
