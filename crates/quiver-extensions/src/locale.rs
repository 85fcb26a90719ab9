//! `__MSG_name__` resolution against `_locales/<locale>/messages.json`

use quiver_core::types::Manifest;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn message_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__MSG_([A-Za-z0-9_@]+)__").expect("static regex"))
}

/// Locale directories to try, most specific first
///
/// `en-US` expands to `en-US`, `en_US`, `en`; the manifest's
/// `default_locale` follows, then `en`.
pub fn locale_candidates(app_locale: &str, default_locale: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    push(app_locale.to_string());
    push(app_locale.replace('-', "_"));
    if let Some(language) = app_locale.split(['-', '_']).next() {
        push(language.to_string());
    }
    if let Some(default) = default_locale {
        push(default.to_string());
    }
    push("en".to_string());
    out
}

/// Message catalogs for one extension directory
#[derive(Debug, Default)]
pub struct Messages {
    /// Catalogs in lookup order; keys lowercased
    catalogs: Vec<HashMap<String, String>>,
}

impl Messages {
    /// Load catalogs from `<root>/_locales/` for the given locales
    pub fn load(root: &Path, manifest: &Manifest, app_locale: &str) -> Self {
        let mut catalogs = Vec::new();
        for locale in locale_candidates(app_locale, manifest.default_locale()) {
            let path = root.join("_locales").join(&locale).join("messages.json");
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
            match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Object(entries)) => {
                    let catalog = entries
                        .into_iter()
                        .filter_map(|(key, entry)| {
                            let message = entry.get("message")?.as_str()?.to_string();
                            Some((key.to_lowercase(), message))
                        })
                        .collect();
                    catalogs.push(catalog);
                }
                _ => debug!("Ignoring unreadable messages for locale {}", locale),
            }
        }
        Self { catalogs }
    }

    /// Look up a message name, case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.to_lowercase();
        self.catalogs
            .iter()
            .find_map(|catalog| catalog.get(&key))
            .map(String::as_str)
    }

    /// Replace every `__MSG_name__` placeholder; unknown names stay as-is
    pub fn resolve(&self, text: &str) -> String {
        if !text.contains("__MSG_") {
            return text.to_string();
        }
        message_regex()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                self.get(&caps[1])
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Display name and description for a manifest in `root`
pub fn display_strings(root: &Path, manifest: &Manifest, app_locale: &str) -> (String, String) {
    let messages = Messages::load(root, manifest, app_locale);
    let name = messages.resolve(manifest.name().unwrap_or_default());
    let description = messages.resolve(manifest.description().unwrap_or_default());
    (name, description)
}
