//! Archive layer: CRX headers, contained ZIP extraction and staging
//!
//! Archives are unpacked into `<base>/_staging/arc-<rand>/`. The staging
//! directory is owned by [`UnpackedArchive`] and removed when it is dropped,
//! so every failure path after extraction cleans up on its own.

pub mod crx;
pub mod unzip;

use quiver_core::types::{ExtensionSource, MANIFEST_FILENAME};
use quiver_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub use crx::{id_from_public_key, CrxError, CrxPackage};
pub use unzip::ZipExtraction;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8; 4] = b"PK\x05\x06";

/// Archive container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Crx,
}

impl ArchiveKind {
    /// Record source for installs of this kind
    pub fn source(&self) -> ExtensionSource {
        match self {
            ArchiveKind::Zip => ExtensionSource::FileZip,
            ArchiveKind::Crx => ExtensionSource::FileCrx,
        }
    }
}

/// Classify an archive by its suffix and leading bytes
///
/// The magic bytes win over the suffix; a file whose magic matches neither
/// format is rejected.
pub fn classify(path: &Path, head: &[u8]) -> Result<ArchiveKind> {
    let by_suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let by_magic = if head.starts_with(crx::CRX_MAGIC) {
        Some(ArchiveKind::Crx)
    } else if head.starts_with(ZIP_MAGIC) || head.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveKind::Zip)
    } else {
        None
    };

    match (by_suffix.as_deref(), by_magic) {
        (Some("zip" | "crx" | "crx3"), Some(kind)) => {
            debug!("Archive classified as {:?}", kind);
            Ok(kind)
        }
        (Some("zip" | "crx" | "crx3"), None) => Err(Error::install_failed(
            "File content is neither a CRX nor a ZIP archive",
        )),
        _ => Err(Error::invalid_path(
            "Only .zip, .crx and .crx3 files can be installed",
        )),
    }
}

/// An archive extracted into a private staging directory
#[derive(Debug)]
pub struct UnpackedArchive {
    pub kind: ArchiveKind,
    /// CRX format version, for CRX packages
    pub crx_version: Option<u32>,
    /// Id derived from the embedded public key
    pub key_id: Option<String>,
    /// Extracted relative paths
    pub files: Vec<String>,
    /// Skipped entries, surfaced as install warnings
    pub warnings: Vec<String>,
    staging: TempDir,
}

impl UnpackedArchive {
    /// Staging directory holding the extracted tree
    pub fn root(&self) -> &Path {
        self.staging.path()
    }

    /// Directory containing `manifest.json`
    pub fn manifest_root(&self) -> Option<PathBuf> {
        locate_manifest_root(self.root())
    }
}

/// Classify and extract `archive_path` under `staging_base`
pub fn unpack(archive_path: &Path, staging_base: &Path) -> Result<UnpackedArchive> {
    let bytes = fs::read(archive_path)?;
    let kind = classify(archive_path, &bytes)?;

    fs::create_dir_all(staging_base)?;
    let staging = tempfile::Builder::new()
        .prefix("arc-")
        .tempdir_in(staging_base)?;

    let (zip_bytes, crx_version, key_id) = match kind {
        ArchiveKind::Crx => {
            let package = crx::parse(&bytes)
                .map_err(|e| Error::install_failed(format!("Invalid CRX package: {}", e)))?;
            let key_id = package.key_id();
            (package.zip, Some(package.version), key_id)
        }
        ArchiveKind::Zip => (bytes.as_slice(), None, None),
    };

    let extraction = unzip::extract(zip_bytes, staging.path())?;

    Ok(UnpackedArchive {
        kind,
        crx_version,
        key_id,
        files: extraction.files,
        warnings: extraction
            .skipped
            .into_iter()
            .map(|s| format!("Skipped archive entry {}", s))
            .collect(),
        staging,
    })
}

/// Find the directory holding the manifest
///
/// The root itself, or the single top-level directory when the archive was
/// packed with a wrapping folder. `__MACOSX` and dot entries are ignored.
pub fn locate_manifest_root(root: &Path) -> Option<PathBuf> {
    if root.join(MANIFEST_FILENAME).is_file() {
        return Some(root.to_path_buf());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).ok()?.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "__MACOSX" || name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        } else {
            return None;
        }
    }

    match dirs.as_slice() {
        [only] if only.join(MANIFEST_FILENAME).is_file() => Some(only.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::ErrorCode;

    #[test]
    fn test_classify_by_magic_and_suffix() {
        assert_eq!(
            classify(Path::new("/d/ext.crx3"), b"Cr24\x03\0\0\0").unwrap(),
            ArchiveKind::Crx
        );
        assert_eq!(
            classify(Path::new("/d/ext.zip"), b"PK\x03\x04").unwrap(),
            ArchiveKind::Zip
        );
        // renamed CRX keeps working
        assert_eq!(
            classify(Path::new("/d/ext.zip"), b"Cr24\x02\0\0\0").unwrap(),
            ArchiveKind::Crx
        );
        assert_eq!(
            classify(Path::new("/d/ext.crx"), b"MZ\x90\0").unwrap_err().code(),
            ErrorCode::InstallFailed
        );
        assert_eq!(
            classify(Path::new("/d/ext.tar"), b"PK\x03\x04").unwrap_err().code(),
            ErrorCode::InvalidPath
        );
    }

    #[test]
    fn test_locate_manifest_root() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path();
        assert_eq!(locate_manifest_root(root), None);

        fs::create_dir_all(root.join("__MACOSX")).unwrap();
        fs::create_dir_all(root.join("my-ext")).unwrap();
        fs::write(root.join(".DS_Store"), b"").unwrap();
        fs::write(root.join("my-ext/manifest.json"), b"{}").unwrap();
        assert_eq!(locate_manifest_root(root), Some(root.join("my-ext")));

        fs::create_dir_all(root.join("second")).unwrap();
        assert_eq!(locate_manifest_root(root), None);

        fs::write(root.join("manifest.json"), b"{}").unwrap();
        assert_eq!(locate_manifest_root(root), Some(root.to_path_buf()));
    }
}
