//! Extension manifest (`manifest.json`) view
//!
//! The manifest is kept as the raw JSON object so the registry can persist it
//! verbatim and the validator can check field types structurally. Typed
//! accessors return `None` when a field is absent or has the wrong type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// File name of the manifest at an extension root
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Parsed `manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub Map<String, Value>);

impl Manifest {
    /// Parse manifest bytes, tolerating a UTF-8 byte order mark
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        serde_json::from_slice(bytes)
    }

    /// Build a manifest from a JSON value (non-objects yield an empty manifest)
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn manifest_version(&self) -> Option<i64> {
        self.0.get("manifest_version").and_then(Value::as_i64)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    pub fn default_locale(&self) -> Option<&str> {
        self.str_field("default_locale")
    }

    /// The `key` field (base64 public key) if present
    pub fn key(&self) -> Option<&str> {
        self.str_field("key")
    }

    /// String entries of `permissions`
    pub fn permissions(&self) -> Vec<String> {
        Self::string_array(self.0.get("permissions"))
    }

    /// String entries of `host_permissions`
    pub fn host_permissions(&self) -> Vec<String> {
        Self::string_array(self.0.get("host_permissions"))
    }

    /// The toolbar action block: `action`, falling back to `browser_action`
    pub fn action(&self) -> Option<&Map<String, Value>> {
        self.0
            .get("action")
            .and_then(Value::as_object)
            .or_else(|| self.0.get("browser_action").and_then(Value::as_object))
    }

    /// Whether the manifest declares a toolbar action
    pub fn has_action(&self) -> bool {
        self.action().is_some()
    }

    /// `default_popup` of the toolbar action
    pub fn default_popup(&self) -> Option<&str> {
        self.action()
            .and_then(|a| a.get("default_popup"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// `default_title` of the toolbar action
    pub fn action_title(&self) -> Option<&str> {
        self.action()
            .and_then(|a| a.get("default_title"))
            .and_then(Value::as_str)
    }

    /// Declared icons by size, merging `icons` and the action's `default_icon`
    pub fn icons(&self) -> BTreeMap<u32, String> {
        let mut icons = BTreeMap::new();
        let mut collect = |value: Option<&Value>| match value {
            Some(Value::Object(map)) => {
                for (size, path) in map {
                    if let (Ok(size), Some(path)) = (size.parse::<u32>(), path.as_str()) {
                        icons.entry(size).or_insert_with(|| path.to_string());
                    }
                }
            }
            Some(Value::String(path)) => {
                icons.entry(16).or_insert_with(|| path.clone());
            }
            _ => {}
        };
        collect(self.0.get("icons"));
        collect(self.action().and_then(|a| a.get("default_icon")));
        icons
    }

    /// `background.service_worker`
    pub fn service_worker(&self) -> Option<&str> {
        self.0
            .get("background")
            .and_then(|b| b.get("service_worker"))
            .and_then(Value::as_str)
    }

    /// Every `js` and `css` file referenced by `content_scripts`
    pub fn content_script_files(&self) -> Vec<String> {
        let Some(scripts) = self.0.get("content_scripts").and_then(Value::as_array) else {
            return Vec::new();
        };
        scripts
            .iter()
            .flat_map(|script| {
                let mut files = Self::string_array(script.get("js"));
                files.extend(Self::string_array(script.get("css")));
                files
            })
            .collect()
    }

    /// Files the manifest points at that must exist in the package
    pub fn referenced_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.icons().into_values().collect();
        if let Some(worker) = self.service_worker() {
            files.push(worker.to_string());
        }
        files.extend(self.content_script_files());
        if let Some(popup) = self.default_popup() {
            files.push(popup.to_string());
        }
        files.sort();
        files.dedup();
        files
    }

    fn string_array(value: Option<&Value>) -> Vec<String> {
        value
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(value)
    }

    #[test]
    fn test_bom_is_tolerated() {
        let bytes = b"\xEF\xBB\xBF{\"name\":\"Demo\"}";
        let m = Manifest::from_slice(bytes).unwrap();
        assert_eq!(m.name(), Some("Demo"));
    }

    #[test]
    fn test_action_falls_back_to_browser_action() {
        let m = manifest(json!({"browser_action": {"default_popup": "popup.html"}}));
        assert!(m.has_action());
        assert_eq!(m.default_popup(), Some("popup.html"));

        let m = manifest(json!({"action": {}, "browser_action": {"default_popup": "x.html"}}));
        assert_eq!(m.default_popup(), None);
    }

    #[test]
    fn test_icons_merge_action_icons() {
        let m = manifest(json!({
            "icons": {"16": "icon16.png", "48": "icon48.png"},
            "action": {"default_icon": {"32": "a32.png", "48": "ignored.png"}}
        }));
        let icons = m.icons();
        assert_eq!(icons.get(&48).map(String::as_str), Some("icon48.png"));
        assert_eq!(icons.get(&32).map(String::as_str), Some("a32.png"));
    }

    #[test]
    fn test_referenced_files() {
        let m = manifest(json!({
            "background": {"service_worker": "bg.js"},
            "content_scripts": [{"matches": ["<all_urls>"], "js": ["cs.js"], "css": ["cs.css"]}],
            "action": {"default_popup": "popup.html"}
        }));
        assert_eq!(
            m.referenced_files(),
            vec!["bg.js", "cs.css", "cs.js", "popup.html"]
        );
    }
}
