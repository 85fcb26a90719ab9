//! Extension identifiers
//!
//! Locally installed extensions get a provisional id derived from their
//! manifest content. Store installs use the store id, which the host also
//! reports once the extension is loaded.

use quiver_core::types::{Manifest, VersionTuple};
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Fields hashed into the provisional id, in canonical (sorted) order
const IDENTITY_FIELDS: &[&str] = &["author", "description", "homepage_url", "name", "version"];

fn record_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-p]{32}$").expect("static regex"))
}

fn store_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-p]{32}$").expect("static regex"))
}

/// Canonical JSON of the identity fields
///
/// Keys are sorted, absent fields are `null` and the version is normalized,
/// so `"1.x"` and a missing version hash the same.
pub fn canonical_identity(manifest: &Manifest) -> String {
    let mut map = Map::new();
    for field in IDENTITY_FIELDS {
        let value = match *field {
            "version" => Value::String(VersionTuple::normalize(manifest.version())),
            other => manifest.get(other).cloned().unwrap_or(Value::Null),
        };
        map.insert((*field).to_string(), value);
    }
    Value::Object(map).to_string()
}

/// Provisional id: first 32 hex chars of SHA-256 over [`canonical_identity`]
pub fn derive_id(manifest: &Manifest) -> String {
    let digest = Sha256::digest(canonical_identity(manifest).as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..32].to_string()
}

/// Whether `id` can name a record (derived hex or store alphabet)
pub fn is_valid_record_id(id: &str) -> bool {
    record_id_regex().is_match(id)
}

/// Whether `id` has the store shape `[a-p]{32}`
pub fn is_store_id(id: &str) -> bool {
    store_id_regex().is_match(id)
}
