//! Install policy (`<base>/policy.json`)
//!
//! The policy file is merged over the embedded defaults before it is
//! deserialized, so every field here is always present after loading.

use serde::{Deserialize, Serialize};

/// Complete install policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub manifest: ManifestPolicy,
    pub files: FilePolicy,
    pub permissions: PermissionPolicy,
    pub behavior: BehaviorPolicy,
}

/// Manifest-level rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPolicy {
    #[serde(rename = "requireMV3")]
    pub require_mv3: bool,
    pub max_name_length: usize,
}

/// Package file rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePolicy {
    /// Lowercase suffixes including the dot (e.g. `.js`)
    pub allowed_extensions: Vec<String>,
    pub blocked_extensions: Vec<String>,
    /// Substrings that block a file when found in its relative path
    pub blocked_patterns: Vec<String>,
    /// Extension-less basenames that are always allowed (e.g. `LICENSE`)
    pub allow_basenames: Vec<String>,
    pub warn_unknown_extensions: bool,
    pub max_file_size_warn: u64,
    pub max_file_size_block: u64,
    pub max_total_files_warn: u64,
    pub max_total_files_block: u64,
    pub max_total_bytes_warn: u64,
    pub max_total_bytes_block: u64,
}

/// Permission classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionPolicy {
    pub blocked: Vec<String>,
    pub dangerous: Vec<String>,
}

/// What a warning means for the install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnWarn {
    Allow,
    Deny,
}

/// How dangerous permissions are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDangerousPermission {
    Warn,
    Confirm,
}

/// How blocked items are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnBlocked {
    Deny,
}

/// Outcome mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorPolicy {
    pub on_warn: OnWarn,
    pub on_dangerous_permission: OnDangerousPermission,
    pub on_blocked: OnBlocked,
}

impl FilePolicy {
    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_blocked_extension(&self, ext: &str) -> bool {
        self.blocked_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_allowed_basename(&self, name: &str) -> bool {
        self.allow_basenames
            .iter()
            .any(|b| b.eq_ignore_ascii_case(name))
    }

    /// First blocked pattern contained in `relative_path`
    pub fn blocked_pattern<'a>(&'a self, relative_path: &str) -> Option<&'a str> {
        self.blocked_patterns
            .iter()
            .map(String::as_str)
            .find(|p| !p.is_empty() && relative_path.contains(p))
    }
}

impl PermissionPolicy {
    pub fn is_blocked(&self, permission: &str) -> bool {
        self.blocked.iter().any(|p| p == permission)
    }

    pub fn is_dangerous(&self, permission: &str) -> bool {
        self.dangerous.iter().any(|p| p == permission)
    }
}
