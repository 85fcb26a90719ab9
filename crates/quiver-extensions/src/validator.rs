//! Manifest and package validation
//!
//! Produces a tri-state [`ValidationOutcome`] from a parsed manifest and,
//! when given, the extension directory. Structural problems and policy
//! blocks are errors (deny); everything else the policy flags is a warning.

use quiver_core::types::{
    Manifest, OnDangerousPermission, OnWarn, Policy, VersionTuple, FALLBACK_VERSION,
};
use quiver_core::Error;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Risk points per finding, capped at [`MAX_RISK_SCORE`]
const RISK_DANGEROUS_PERMISSION: u32 = 15;
const RISK_BLOCKED_PERMISSION: u32 = 40;
const RISK_ALL_SITES_CONTENT_SCRIPT: u32 = 10;
const RISK_WARNING: u32 = 2;
pub const MAX_RISK_SCORE: u32 = 100;

/// CSP keys recognized in Manifest V3
const CSP_KEYS: &[&str] = &["extension_pages", "sandbox"];

/// Validation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationOutcome {
    Allow,
    Warn,
    Deny,
}

/// Full validation result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub outcome: ValidationOutcome,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub risk_score: u32,
    /// Dangerous permissions need explicit user confirmation
    pub requires_confirmation: bool,
    pub dangerous_permissions: Vec<String>,
    pub file_count: u64,
    pub total_bytes: u64,
}

impl ValidationReport {
    pub fn is_denied(&self) -> bool {
        self.outcome == ValidationOutcome::Deny
    }

    /// Convert a denied report into the caller-facing error
    pub fn to_error(&self) -> Error {
        Error::validate_failed(self.errors.clone(), self.warnings.clone())
    }
}

#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    risk: u32,
    dangerous: Vec<String>,
    file_count: u64,
    total_bytes: u64,
}

impl Findings {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validates manifests and package trees against a [`Policy`]
pub struct ManifestValidator<'a> {
    policy: &'a Policy,
}

impl<'a> ManifestValidator<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Validate a manifest, and the package tree under `root` when given
    pub fn validate(&self, manifest: &Manifest, root: Option<&Path>) -> ValidationReport {
        let mut findings = Findings::default();

        self.check_required(manifest, &mut findings);
        self.check_permissions(manifest, &mut findings);
        check_csp(manifest, &mut findings);
        check_background(manifest, &mut findings);
        check_content_scripts(manifest, &mut findings);
        check_action(manifest, &mut findings);
        check_web_accessible_resources(manifest, &mut findings);

        if let Some(root) = root {
            self.check_files(root, &mut findings);
        }

        self.finish(findings)
    }

    fn check_required(&self, manifest: &Manifest, f: &mut Findings) {
        match manifest.get("manifest_version") {
            None => f.error("Missing manifest_version"),
            Some(_) if manifest.manifest_version() == Some(3) => {}
            Some(_) => f.error("Only Manifest V3 is supported"),
        }

        match manifest.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => {
                let max = self.policy.manifest.max_name_length;
                if name.chars().count() > max {
                    f.error(format!("Name exceeds {} characters", max));
                }
            }
            Some(Value::String(_)) | None => f.error("Missing or empty name"),
            Some(_) => f.error("name must be a string"),
        }

        match manifest.get("version") {
            None => f.warning(format!("Missing version; using {}", FALLBACK_VERSION)),
            Some(Value::String(v)) if VersionTuple::is_valid(v) => {}
            Some(other) => f.warning(format!(
                "Invalid version {}; using {}",
                other, FALLBACK_VERSION
            )),
        }
    }

    fn check_permissions(&self, manifest: &Manifest, f: &mut Findings) {
        for key in ["permissions", "host_permissions", "optional_permissions"] {
            let Some(value) = manifest.get(key) else {
                continue;
            };
            let Some(items) = value.as_array() else {
                f.error(format!("{} must be an array", key));
                continue;
            };
            if items.iter().any(|v| !v.is_string()) {
                f.error(format!("{} must contain only strings", key));
            }
        }

        let requested = manifest
            .permissions()
            .into_iter()
            .chain(manifest.host_permissions());
        for permission in requested {
            if self.policy.permissions.is_blocked(&permission) {
                f.error(format!("Blocked permission: {}", permission));
                f.risk += RISK_BLOCKED_PERMISSION;
            } else if self.policy.permissions.is_dangerous(&permission) {
                f.warning(format!("Dangerous permission: {}", permission));
                f.risk += RISK_DANGEROUS_PERMISSION;
                if !f.dangerous.contains(&permission) {
                    f.dangerous.push(permission);
                }
            }
        }
    }

    fn check_files(&self, root: &Path, f: &mut Findings) {
        let files = &self.policy.files;

        for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    f.error(format!("Cannot read package: {}", e));
                    continue;
                }
            };
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if entry.path_is_symlink() {
                f.error(format!("Symbolic links are not allowed: {}", relative));
                continue;
            }
            if entry.file_type().is_dir() {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            f.file_count += 1;
            f.total_bytes += size;

            if let Some(pattern) = files.blocked_pattern(&relative) {
                f.error(format!("Blocked file pattern '{}': {}", pattern, relative));
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            match file_name.rfind('.').filter(|&i| i > 0) {
                Some(dot) => {
                    let suffix = file_name[dot..].to_ascii_lowercase();
                    if files.is_blocked_extension(&suffix) {
                        f.error(format!("Blocked file type: {}", relative));
                        continue;
                    }
                    if files.warn_unknown_extensions && !files.is_allowed_extension(&suffix) {
                        f.warning(format!("Unknown file type: {}", relative));
                    }
                }
                None => {
                    if files.warn_unknown_extensions && !files.is_allowed_basename(&file_name) {
                        f.warning(format!("File without extension: {}", relative));
                    }
                }
            }

            if size > files.max_file_size_block {
                f.error(format!("File too large: {} ({} bytes)", relative, size));
            } else if size >= files.max_file_size_warn {
                f.warning(format!("Large file: {} ({} bytes)", relative, size));
            }
        }

        if f.file_count > files.max_total_files_block {
            f.error(format!("Too many files: {}", f.file_count));
        } else if f.file_count >= files.max_total_files_warn {
            f.warning(format!("Many files: {}", f.file_count));
        }

        if f.total_bytes > files.max_total_bytes_block {
            f.error(format!("Package too large: {} bytes", f.total_bytes));
        } else if f.total_bytes >= files.max_total_bytes_warn {
            f.warning(format!("Large package: {} bytes", f.total_bytes));
        }
    }

    fn finish(&self, mut f: Findings) -> ValidationReport {
        let behavior = &self.policy.behavior;

        let requires_confirmation = f.errors.is_empty()
            && !f.dangerous.is_empty()
            && behavior.on_dangerous_permission == OnDangerousPermission::Confirm;

        let outcome = if !f.errors.is_empty() {
            ValidationOutcome::Deny
        } else if f.warnings.is_empty() {
            ValidationOutcome::Allow
        } else if behavior.on_warn == OnWarn::Deny {
            f.error("Warnings are not allowed by policy");
            ValidationOutcome::Deny
        } else {
            ValidationOutcome::Warn
        };

        let risk = f.risk + RISK_WARNING * f.warnings.len() as u32;
        debug!(
            "Validation finished: {:?} ({} errors, {} warnings)",
            outcome,
            f.errors.len(),
            f.warnings.len()
        );

        ValidationReport {
            outcome,
            errors: f.errors,
            warnings: f.warnings,
            risk_score: risk.min(MAX_RISK_SCORE),
            requires_confirmation,
            dangerous_permissions: f.dangerous,
            file_count: f.file_count,
            total_bytes: f.total_bytes,
        }
    }
}

fn check_csp(manifest: &Manifest, f: &mut Findings) {
    let Some(csp) = manifest.get("content_security_policy") else {
        return;
    };
    let Some(csp) = csp.as_object() else {
        f.error("content_security_policy must be an object in Manifest V3");
        return;
    };
    for (key, value) in csp {
        if !CSP_KEYS.contains(&key.as_str()) {
            f.warning(format!("Unknown content_security_policy key: {}", key));
        }
        match value.as_str() {
            Some(policy) if policy.contains("'unsafe-eval'") => {
                f.error(format!("content_security_policy.{} allows 'unsafe-eval'", key));
            }
            Some(_) => {}
            None => f.error(format!("content_security_policy.{} must be a string", key)),
        }
    }
}

fn check_background(manifest: &Manifest, f: &mut Findings) {
    let Some(background) = manifest.get("background") else {
        return;
    };
    let Some(background) = background.as_object() else {
        f.error("background must be an object");
        return;
    };
    if background.contains_key("scripts") || background.contains_key("page") {
        f.error("background.scripts and background.page are not supported in Manifest V3");
    }
    if let Some(worker) = background.get("service_worker") {
        if !worker.as_str().is_some_and(|s| !s.trim().is_empty()) {
            f.error("background.service_worker must be a non-empty string");
        }
    }
}

fn string_array(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

fn check_content_scripts(manifest: &Manifest, f: &mut Findings) {
    let Some(scripts) = manifest.get("content_scripts") else {
        return;
    };
    let Some(scripts) = scripts.as_array() else {
        f.error("content_scripts must be an array");
        return;
    };
    for (index, script) in scripts.iter().enumerate() {
        let Some(script) = script.as_object() else {
            f.error(format!("content_scripts[{}] must be an object", index));
            continue;
        };
        match script.get("matches").and_then(string_array) {
            Some(matches) if !matches.is_empty() => {
                if matches
                    .iter()
                    .any(|m| *m == "<all_urls>" || m.starts_with("*://*/"))
                {
                    f.warning(format!("content_scripts[{}] runs on all sites", index));
                    f.risk += RISK_ALL_SITES_CONTENT_SCRIPT;
                }
            }
            _ => f.error(format!(
                "content_scripts[{}].matches must be a non-empty array of strings",
                index
            )),
        }
        for key in ["js", "css"] {
            if script.get(key).is_some_and(|v| string_array(v).is_none()) {
                f.error(format!("content_scripts[{}].{} must be an array of strings", index, key));
            }
        }
    }
}

fn check_action_object(key: &str, action: &Map<String, Value>, f: &mut Findings) {
    if let Some(popup) = action.get("default_popup") {
        if !popup.is_string() {
            f.error(format!("{}.default_popup must be a string", key));
        }
    }
    if let Some(icon) = action.get("default_icon") {
        if !(icon.is_string() || icon.is_object()) {
            f.error(format!("{}.default_icon must be a string or an object", key));
        }
    }
    if let Some(title) = action.get("default_title") {
        if !title.is_string() {
            f.error(format!("{}.default_title must be a string", key));
        }
    }
}

fn check_action(manifest: &Manifest, f: &mut Findings) {
    for key in ["action", "browser_action"] {
        let Some(value) = manifest.get(key) else {
            continue;
        };
        match value.as_object() {
            Some(action) => check_action_object(key, action, f),
            None => f.error(format!("{} must be an object", key)),
        }
    }
    if manifest.get("browser_action").is_some() {
        f.warning("browser_action is replaced by action in Manifest V3");
    }
}

fn check_web_accessible_resources(manifest: &Manifest, f: &mut Findings) {
    let Some(resources) = manifest.get("web_accessible_resources") else {
        return;
    };
    let valid = resources
        .as_array()
        .is_some_and(|entries| entries.iter().all(|e| e.get("resources").is_some()));
    if !valid {
        f.error("web_accessible_resources must be an array of objects with resources");
    }
}
