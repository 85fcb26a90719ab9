//! Contained ZIP extraction
//!
//! Entry names are checked before anything is read. Names with `..`
//! segments, absolute paths, drive letters or backslashes are skipped, as are
//! symlink entries and compression methods other than STORED and DEFLATE.
//! Skips are reported back to the caller; a malformed archive fails the
//! whole extraction.

use quiver_core::{Error, Result};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive};

/// Upper bound on bytes written by a single extraction
pub const MAX_EXTRACTED_BYTES: u64 = 1024 * 1024 * 1024;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// What an extraction produced
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ZipExtraction {
    /// Relative paths of files and directories written, in archive order
    pub files: Vec<String>,
    /// Human-readable reasons for every skipped entry
    pub skipped: Vec<String>,
}

/// Why an entry name was rejected
fn unsafe_name_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("empty name");
    }
    if name.contains('\\') {
        return Some("backslash in name");
    }
    if name.starts_with('/') {
        return Some("absolute path");
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Some("drive letter");
    }
    if name.contains('\0') {
        return Some("NUL in name");
    }
    if name.split('/').any(|segment| segment == "..") {
        return Some("parent directory segment");
    }
    None
}

/// Join a checked entry name onto `root`, refusing anything that leaves it
fn contained_join(root: &Path, name: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (out != root).then_some(out)
}

/// Extract a ZIP buffer into `root`
pub fn extract(bytes: &[u8], root: &Path) -> Result<ZipExtraction> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::install_failed(format!("Malformed ZIP archive: {}", e)))?;

    fs::create_dir_all(root)?;
    let canonical_root = fs::canonicalize(root)?;

    let mut result = ZipExtraction::default();
    let mut written: u64 = 0;

    for index in 0..archive.len() {
        let (name, method, mode) = {
            let raw = archive
                .by_index_raw(index)
                .map_err(|e| Error::install_failed(format!("Malformed ZIP entry: {}", e)))?;
            (raw.name().to_string(), raw.compression(), raw.unix_mode())
        };

        if let Some(reason) = unsafe_name_reason(&name) {
            warn!("Skipping ZIP entry {:?}: {}", name, reason);
            result.skipped.push(format!("{}: {}", name, reason));
            continue;
        }
        let Some(dest) = contained_join(&canonical_root, &name) else {
            warn!("Skipping ZIP entry {:?}: outside target root", name);
            result.skipped.push(format!("{}: outside target root", name));
            continue;
        };
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            warn!("Skipping ZIP symlink entry {:?}", name);
            result.skipped.push(format!("{}: symlink", name));
            continue;
        }

        let relative = name.trim_end_matches('/').to_string();
        if name.ends_with('/') {
            fs::create_dir_all(&dest)?;
            result.files.push(relative);
            continue;
        }

        if !matches!(method, CompressionMethod::Stored | CompressionMethod::Deflated) {
            warn!("Skipping ZIP entry {:?}: unsupported compression {:?}", name, method);
            result
                .skipped
                .push(format!("{}: unsupported compression {:?}", name, method));
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
            let real_parent = fs::canonicalize(parent)?;
            if !real_parent.starts_with(&canonical_root) {
                warn!("Skipping ZIP entry {:?}: parent escapes target root", name);
                result.skipped.push(format!("{}: outside target root", name));
                continue;
            }
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::install_failed(format!("Malformed ZIP entry {}: {}", name, e)))?;
        let mut out = fs::File::create(&dest)?;
        let budget = MAX_EXTRACTED_BYTES.saturating_sub(written);
        let copied = io::copy(&mut (&mut entry).take(budget + 1), &mut out)
            .map_err(|e| Error::install_failed(format!("Failed to extract {}: {}", name, e)))?;
        if copied > budget {
            return Err(Error::install_failed(
                "Archive expands beyond the extraction limit",
            ));
        }
        written += copied;
        result.files.push(relative);
    }

    debug!(
        "Extracted {} entries ({} bytes), skipped {}",
        result.files.len(),
        written,
        result.skipped.len()
    );
    Ok(result)
}
