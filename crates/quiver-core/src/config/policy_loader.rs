//! Policy loading with embedded defaults
//!
//! `<base>/policy.json` is deep-merged over the embedded
//! `policy-defaults.json`: objects merge key by key, everything else
//! (arrays included) is replaced by the overlay.

use crate::error::{Error, Result};
use crate::types::Policy;
use rust_embed::RustEmbed;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const POLICY_DEFAULTS: &str = "policy-defaults.json";

/// Loads the install policy
pub struct PolicyLoader;

impl PolicyLoader {
    /// The embedded default policy document
    pub fn defaults_value() -> Result<Value> {
        let file = EmbeddedConfigs::get(POLICY_DEFAULTS).ok_or_else(|| {
            Error::install_failed(format!("Embedded config not found: {}", POLICY_DEFAULTS))
        })?;
        Ok(serde_json::from_slice(&file.data)?)
    }

    /// The built-in policy
    pub fn builtin() -> Result<Policy> {
        Ok(serde_json::from_value(Self::defaults_value()?)?)
    }

    /// Load `policy_path` merged over the defaults
    ///
    /// A missing file yields the defaults. An unreadable or malformed file is
    /// logged and ignored.
    pub fn load(policy_path: &Path) -> Result<Policy> {
        let mut merged = Self::defaults_value()?;

        match std::fs::read(policy_path) {
            Ok(bytes) => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
                match serde_json::from_slice::<Value>(bytes) {
                    Ok(overlay @ Value::Object(_)) => {
                        debug!("Merging policy overrides from {:?}", policy_path);
                        let candidate = {
                            let mut base = merged.clone();
                            merge_values(&mut base, overlay);
                            base
                        };
                        match serde_json::from_value::<Policy>(candidate.clone()) {
                            Ok(_) => merged = candidate,
                            Err(e) => warn!("Ignoring policy file with invalid values: {}", e),
                        }
                    }
                    Ok(_) => warn!("Ignoring policy file: top level is not an object"),
                    Err(e) => warn!("Ignoring malformed policy file: {}", e),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read policy file: {}", e),
        }

        let policy: Policy = serde_json::from_value(merged)?;
        if !policy.manifest.require_mv3 {
            warn!("Policy sets requireMV3=false; Manifest V3 is still enforced");
        }
        Ok(policy)
    }
}

/// Recursively merge `overlay` into `base`
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OnDangerousPermission, OnWarn};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_policy_parses() {
        let policy = PolicyLoader::builtin().unwrap();
        assert!(policy.manifest.require_mv3);
        assert_eq!(policy.manifest.max_name_length, 75);
        assert!(policy.permissions.is_blocked("nativeMessaging"));
        assert!(policy.permissions.is_dangerous("<all_urls>"));
        assert!(policy.files.is_blocked_extension(".EXE"));
        assert_eq!(policy.behavior.on_warn, OnWarn::Allow);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let policy = PolicyLoader::load(&temp.path().join("policy.json")).unwrap();
        assert_eq!(policy, PolicyLoader::builtin().unwrap());
    }

    #[test]
    fn test_overrides_are_merged() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("policy.json");
        std::fs::write(
            &path,
            json!({
                "files": {"maxFileSizeBlock": 1024},
                "permissions": {"blocked": ["tabs"]},
                "behavior": {"onDangerousPermission": "confirm"}
            })
            .to_string(),
        )
        .unwrap();

        let policy = PolicyLoader::load(&path).unwrap();
        assert_eq!(policy.files.max_file_size_block, 1024);
        assert_eq!(policy.files.max_file_size_warn, 10485760);
        assert_eq!(policy.permissions.blocked, vec!["tabs".to_string()]);
        assert!(!policy.permissions.dangerous.is_empty());
        assert_eq!(
            policy.behavior.on_dangerous_permission,
            OnDangerousPermission::Confirm
        );
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("policy.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            PolicyLoader::load(&path).unwrap(),
            PolicyLoader::builtin().unwrap()
        );

        std::fs::write(&path, r#"{"behavior": {"onWarn": "sometimes"}}"#).unwrap();
        assert_eq!(
            PolicyLoader::load(&path).unwrap(),
            PolicyLoader::builtin().unwrap()
        );
    }
}
