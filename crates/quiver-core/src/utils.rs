//! Shared utility functions for Quiver crates

use anyhow::anyhow;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so test
/// harnesses and sandboxed profiles can redirect it.
pub fn get_home_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Log-safe rendering of a user path
///
/// Without the debug flag only a short hash is shown, so logs never carry
/// user directory names.
pub fn log_path(path: &Path, debug: bool) -> String {
    if debug {
        path.display().to_string()
    } else {
        let digest = sha256_hex(path.to_string_lossy().as_bytes());
        format!("src#{}", &digest[..8])
    }
}
