//! User path sanitization
//!
//! Paths arriving from the UI are untrusted. They are checked lexically,
//! resolved to a canonical real path (following symlinks), then checked
//! again against the real filesystem: archives by suffix, unpacked
//! directories by containment in the allowed user directories.

use quiver_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest raw path accepted
pub const MAX_PATH_LENGTH: usize = 4096;

/// Archive suffixes accepted for file installs
pub const ARCHIVE_SUFFIXES: &[&str] = &["zip", "crx", "crx3"];

/// A path that passed sanitization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizedPath {
    /// Canonical path of an unpacked extension directory
    Directory(PathBuf),
    /// Canonical path of a `.zip`/`.crx`/`.crx3` file
    Archive(PathBuf),
}

impl SanitizedPath {
    pub fn path(&self) -> &Path {
        match self {
            SanitizedPath::Directory(p) | SanitizedPath::Archive(p) => p,
        }
    }
}

/// Validates user-supplied install paths
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    allowed_roots: Vec<PathBuf>,
}

impl PathSanitizer {
    pub fn new(allowed_roots: Vec<PathBuf>) -> Self {
        Self { allowed_roots }
    }

    /// Sanitize a raw path string
    pub fn sanitize(&self, raw: &str) -> Result<SanitizedPath> {
        let trimmed = raw.trim();
        Self::check_lexical(trimmed)?;

        let real = std::fs::canonicalize(trimmed)
            .map_err(|e| Error::invalid_path(format!("Cannot resolve path: {}", e)))?;
        let metadata = std::fs::metadata(&real)
            .map_err(|e| Error::invalid_path(format!("Cannot stat path: {}", e)))?;

        if metadata.is_file() {
            if !Self::has_archive_suffix(&real) {
                return Err(Error::invalid_path(
                    "Only .zip, .crx and .crx3 files can be installed",
                ));
            }
            return Ok(SanitizedPath::Archive(real));
        }

        if metadata.is_dir() {
            if !self.is_within_allowed_root(&real) {
                return Err(Error::path_traversal(
                    "Directory is outside the allowed user directories",
                ));
            }
            return Ok(SanitizedPath::Directory(real));
        }

        Err(Error::invalid_path("Path is neither a file nor a directory"))
    }

    fn check_lexical(raw: &str) -> Result<()> {
        if raw.is_empty() {
            return Err(Error::invalid_path("Path is empty"));
        }
        if raw.len() > MAX_PATH_LENGTH {
            return Err(Error::invalid_path("Path is too long"));
        }
        if raw.starts_with('~') {
            return Err(Error::invalid_path("Home-relative paths are not accepted"));
        }
        if raw.contains('\0') {
            return Err(Error::invalid_path("Path contains a NUL byte"));
        }
        if raw.contains("..") {
            return Err(Error::path_traversal("Path contains '..'"));
        }
        let path = Path::new(raw);
        if !path.is_absolute() {
            return Err(Error::invalid_path("Path must be absolute"));
        }
        Ok(())
    }

    /// Whether `path` ends with an accepted archive suffix
    pub fn has_archive_suffix(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| ARCHIVE_SUFFIXES.iter().any(|s| e.eq_ignore_ascii_case(s)))
            .unwrap_or(false)
    }

    fn is_within_allowed_root(&self, real: &Path) -> bool {
        self.allowed_roots.iter().any(|root| {
            let Ok(root) = std::fs::canonicalize(root) else {
                debug!("Allowed root {:?} does not exist", root);
                return false;
            };
            real != root && real.starts_with(&root)
        })
    }
}
