//! Directory and archive installers
//!
//! Installation is split in two phases. [`Installer::inspect`] reads and
//! validates the package and computes its id without touching the engine's
//! id directories. [`Installer::commit`] places the package atomically at
//! `<base>/<id>/<version>_0` and builds the record. The coordinator runs the
//! duplicate check between the two, under the id lock.

use crate::archive::{self, UnpackedArchive};
use crate::context::EngineContext;
use crate::fsutil::{self, Placement};
use crate::identity;
use crate::locale;
use crate::sanitize::SanitizedPath;
use crate::validator::{ManifestValidator, ValidationReport};
use chrono::Utc;
use quiver_core::types::{
    icon_url, ExtensionRecord, ExtensionSource, Manifest, UpdateInfo, VersionTuple,
    DEFAULT_ICON_SIZE, MANIFEST_FILENAME,
};
use quiver_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Caller choices for one install
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// The user accepted the dangerous permissions shown to them
    pub confirmed: bool,
}

/// A validated package ready to be placed
#[derive(Debug)]
pub struct InstallPlan {
    pub id: String,
    pub manifest: Manifest,
    /// Normalized version
    pub version: String,
    pub source: ExtensionSource,
    pub report: ValidationReport,
    /// Validation warnings plus missing files and skipped archive entries
    pub warnings: Vec<String>,
    pub key_id: Option<String>,
    content_root: PathBuf,
    placement: Placement,
    // Keeps the staging directory alive until commit
    _archive: Option<UnpackedArchive>,
}

impl InstallPlan {
    /// Directory whose contents will be placed
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Final location of the package
    pub fn target_dir(&self, ctx: &EngineContext) -> PathBuf {
        ctx.paths.version_dir(&self.id, &self.version)
    }
}

/// Read and parse `<dir>/manifest.json`
pub fn read_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join(MANIFEST_FILENAME);
    let bytes = fs::read(&path)
        .map_err(|e| Error::install_failed(format!("Cannot read {}: {}", MANIFEST_FILENAME, e)))?;
    let manifest = Manifest::from_slice(&bytes)
        .map_err(|e| Error::install_failed(format!("Invalid {}: {}", MANIFEST_FILENAME, e)))?;
    if manifest.0.is_empty() {
        return Err(Error::install_failed(format!("{} is empty", MANIFEST_FILENAME)));
    }
    Ok(manifest)
}

/// Referenced files (icons, service worker, content scripts, popup) absent from `root`
pub fn missing_referenced_files(root: &Path, manifest: &Manifest) -> Vec<String> {
    manifest
        .referenced_files()
        .into_iter()
        .filter(|file| {
            let relative = file.trim_start_matches('/');
            relative.split('/').any(|s| s == "..") || !root.join(relative).is_file()
        })
        .collect()
}

/// Icon size advertised in the record's icon URL
///
/// 48 when declared or when nothing is; otherwise the smallest declared size
/// above 48, falling back to the largest one.
pub fn preferred_icon_size(manifest: &Manifest) -> u32 {
    let icons = manifest.icons();
    if icons.is_empty() || icons.contains_key(&DEFAULT_ICON_SIZE) {
        return DEFAULT_ICON_SIZE;
    }
    icons
        .keys()
        .copied()
        .find(|size| *size > DEFAULT_ICON_SIZE)
        .or_else(|| icons.keys().next_back().copied())
        .unwrap_or(DEFAULT_ICON_SIZE)
}

/// Build a fresh record for a placed package
pub fn build_record(
    ctx: &EngineContext,
    id: &str,
    manifest: Manifest,
    installed_path: PathBuf,
    source: ExtensionSource,
) -> ExtensionRecord {
    let version = VersionTuple::normalize(manifest.version());
    let (display_name, display_description) =
        locale::display_strings(&installed_path, &manifest, &ctx.config.app_locale);
    let icon = icon_url(
        &ctx.config.icon_scheme,
        id,
        preferred_icon_size(&manifest),
        &version,
    );

    ExtensionRecord {
        id: id.to_string(),
        name: manifest.name().unwrap_or_default().to_string(),
        version,
        display_name,
        display_description,
        permissions: manifest.permissions(),
        installed_path,
        source,
        enabled: true,
        host_id: None,
        icon_path: Some(icon),
        is_system: false,
        removable: true,
        warnings: Vec::new(),
        risk_score: 0,
        install_date: Utc::now(),
        update: UpdateInfo::default(),
        key_id: None,
        bundle_key: None,
        allow_file_access: false,
        manifest,
    }
}

/// Prepares and places extension packages
pub struct Installer {
    ctx: EngineContext,
}

impl Installer {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Inspect a sanitized source
    pub fn inspect(&self, source: &SanitizedPath, options: InstallOptions) -> Result<InstallPlan> {
        let plan = match source {
            SanitizedPath::Directory(dir) => self.inspect_directory(dir)?,
            SanitizedPath::Archive(file) => self.inspect_archive(file)?,
        };
        if plan.report.requires_confirmation && !options.confirmed {
            let mut errors = vec![format!(
                "Confirmation required for permissions: {}",
                plan.report.dangerous_permissions.join(", ")
            )];
            errors.extend(plan.report.errors.iter().cloned());
            return Err(Error::validate_failed(errors, plan.warnings));
        }
        Ok(plan)
    }

    /// Inspect an unpacked extension directory (copied on commit)
    pub fn inspect_directory(&self, dir: &Path) -> Result<InstallPlan> {
        debug!("Inspecting directory {}", self.ctx.log_path(dir));
        self.plan(dir.to_path_buf(), ExtensionSource::Unpacked, Placement::Copy, None)
    }

    /// Inspect a `.zip`/`.crx`/`.crx3` file, extracting it into staging
    pub fn inspect_archive(&self, file: &Path) -> Result<InstallPlan> {
        debug!("Inspecting archive {}", self.ctx.log_path(file));
        let unpacked = archive::unpack(file, &self.ctx.paths.staging_dir())?;
        let root = unpacked
            .manifest_root()
            .ok_or_else(|| Error::install_failed("No manifest.json found in archive"))?;
        let source = unpacked.kind.source();
        self.plan(root, source, Placement::Move, Some(unpacked))
    }

    fn plan(
        &self,
        content_root: PathBuf,
        source: ExtensionSource,
        placement: Placement,
        unpacked: Option<UnpackedArchive>,
    ) -> Result<InstallPlan> {
        let manifest = read_manifest(&content_root)?;
        let report = ManifestValidator::new(&self.ctx.policy).validate(&manifest, Some(&content_root));

        let mut warnings = report.warnings.clone();
        if let Some(unpacked) = &unpacked {
            warnings.extend(unpacked.warnings.iter().cloned());
        }
        if report.is_denied() {
            return Err(Error::validate_failed(report.errors.clone(), warnings));
        }

        for missing in missing_referenced_files(&content_root, &manifest) {
            warnings.push(format!("Referenced file not found: {}", missing));
        }

        let key_id = unpacked.as_ref().and_then(|u| u.key_id.clone());
        Ok(InstallPlan {
            id: identity::derive_id(&manifest),
            version: VersionTuple::normalize(manifest.version()),
            manifest,
            source,
            report,
            warnings,
            key_id,
            content_root,
            placement,
            _archive: unpacked,
        })
    }

    /// Place the plan at `<base>/<id>/<version>_0` and build its record
    pub fn commit(&self, plan: InstallPlan) -> Result<ExtensionRecord> {
        let target = plan.target_dir(&self.ctx);
        fsutil::place_dir_atomic(&plan.content_root, &target, plan.placement)
            .map_err(|e| Error::install_failed(format!("Failed to place extension: {:#}", e)))?;

        info!("Placed extension {} v{}", plan.id, plan.version);

        let mut record = build_record(&self.ctx, &plan.id, plan.manifest, target, plan.source);
        record.warnings = plan.warnings;
        record.risk_score = plan.report.risk_score;
        record.key_id = plan.key_id;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{EngineConfig, ErrorCode};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Installer, EngineContext) {
        let temp = TempDir::new().unwrap();
        let ctx = EngineContext::new(EngineConfig::new(temp.path().join("base"))).unwrap();
        (temp, Installer::new(ctx.clone()), ctx)
    }

    fn write_extension(dir: &Path, manifest: serde_json::Value) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
    }

    #[test]
    fn test_directory_install_copies_and_keeps_source() {
        let (temp, installer, ctx) = setup();
        let src = temp.path().join("src");
        write_extension(
            &src,
            json!({"manifest_version": 3, "name": "Demo", "version": "1.2.3",
                   "icons": {"16": "icon16.png"}}),
        );

        let plan = installer.inspect_directory(&src).unwrap();
        assert_eq!(plan.warnings, vec!["Referenced file not found: icon16.png"]);
        let id = plan.id.clone();

        let record = installer.commit(plan).unwrap();
        assert_eq!(record.installed_path, ctx.paths.version_dir(&id, "1.2.3"));
        assert!(record.installed_path.join("manifest.json").is_file());
        assert!(src.join("manifest.json").is_file());
        assert_eq!(record.source, ExtensionSource::Unpacked);
        assert_eq!(
            record.icon_path.as_deref(),
            Some(format!("proto://extension-icon/{}/48?v=1.2.3", id).as_str())
        );
    }

    #[test]
    fn test_denied_manifest_reports_errors() {
        let (temp, installer, _ctx) = setup();
        let src = temp.path().join("src");
        write_extension(&src, json!({"manifest_version": 2, "name": "Old", "version": "1"}));

        let err = installer.inspect_directory(&src).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidateFailed);
        assert!(err.to_string().contains("Only Manifest V3 is supported"));
    }

    #[test]
    fn test_missing_manifest_fails() {
        let (temp, installer, _ctx) = setup();
        let src = temp.path().join("empty");
        fs::create_dir_all(&src).unwrap();
        let err = installer.inspect_directory(&src).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InstallFailed);
    }

    #[test]
    fn test_preferred_icon_size() {
        let none = Manifest::from_value(json!({}));
        assert_eq!(preferred_icon_size(&none), 48);
        let small = Manifest::from_value(json!({"icons": {"16": "a.png", "128": "b.png"}}));
        assert_eq!(preferred_icon_size(&small), 128);
        let only_small = Manifest::from_value(json!({"icons": {"16": "a.png", "32": "b.png"}}));
        assert_eq!(preferred_icon_size(&only_small), 32);
    }
}
