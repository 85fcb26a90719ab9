//! Builders for manifests and extension packages
//!
//! Packages can be written as directories or serialized to ZIP, CRX v2 and
//! CRX v3 bytes. CRX headers are assembled by hand.

#![allow(dead_code)]

use super::constants::{ICON_BYTES, POPUP_HTML};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builder for `manifest.json` documents
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    fields: Map<String, Value>,
}

impl ManifestBuilder {
    pub fn new(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("manifest_version".into(), json!(3));
        fields.insert("name".into(), json!(name));
        fields.insert("version".into(), json!("1.0.0"));
        Self { fields }
    }

    pub fn with_version(self, version: &str) -> Self {
        self.with_field("version", json!(version))
    }

    pub fn with_manifest_version(self, version: i64) -> Self {
        self.with_field("manifest_version", json!(version))
    }

    pub fn with_description(self, description: &str) -> Self {
        self.with_field("description", json!(description))
    }

    pub fn with_permissions(self, permissions: &[&str]) -> Self {
        self.with_field("permissions", json!(permissions))
    }

    /// Toolbar action, optionally with a popup page
    pub fn with_action(self, popup: Option<&str>) -> Self {
        let action = match popup {
            Some(popup) => json!({"default_title": "Open", "default_popup": popup}),
            None => json!({"default_title": "Open"}),
        };
        self.with_field("action", action)
    }

    pub fn with_icons(self) -> Self {
        self.with_field("icons", json!({"16": "icon16.png", "48": "icon48.png"}))
    }

    pub fn with_key(self, key: &str) -> Self {
        self.with_field("key", json!(key))
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn build(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Builder for a complete extension package
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    manifest: ManifestBuilder,
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(manifest: ManifestBuilder) -> Self {
        Self {
            manifest,
            files: Vec::new(),
        }
    }

    /// A package with an action popup and icons, as most tests use
    pub fn with_popup(name: &str) -> Self {
        Self::new(ManifestBuilder::new(name).with_action(Some("popup.html")).with_icons())
            .with_file("popup.html", POPUP_HTML.as_bytes())
            .with_file("icon16.png", ICON_BYTES)
            .with_file("icon48.png", ICON_BYTES)
    }

    /// A package without a toolbar action
    pub fn plain(name: &str) -> Self {
        Self::new(ManifestBuilder::new(name)).with_file("bg.js", b"console.log('bg');")
    }

    pub fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.push((path.to_string(), bytes.to_vec()));
        self
    }

    pub fn map_manifest(mut self, f: impl FnOnce(ManifestBuilder) -> ManifestBuilder) -> Self {
        self.manifest = f(self.manifest);
        self
    }

    pub fn manifest(&self) -> Value {
        self.manifest.build()
    }

    pub fn manifest_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(&self.manifest()).unwrap()
    }

    /// Write the package as an unpacked directory at `dir`
    pub fn write_dir(&self, dir: &Path) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("manifest.json"), self.manifest_bytes()).unwrap();
        for (path, bytes) in &self.files {
            let target = dir.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, bytes).unwrap();
        }
        dir.to_path_buf()
    }

    /// Entries as (name, bytes), manifest first
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = vec![("manifest.json".to_string(), self.manifest_bytes())];
        entries.extend(self.files.iter().cloned());
        entries
    }

    pub fn zip_bytes(&self) -> Vec<u8> {
        zip_entries(&self.entries())
    }

    pub fn crx2_bytes(&self, public_key: &[u8]) -> Vec<u8> {
        crx2_wrap(public_key, b"signature", &self.zip_bytes())
    }

    pub fn crx3_bytes(&self, public_key: &[u8], header_len: usize) -> Vec<u8> {
        crx3_wrap(&crx3_header(public_key, header_len), &self.zip_bytes())
    }
}

/// Deflated ZIP of the given entries
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn crx2_wrap(public_key: &[u8], signature: &[u8], zip: &[u8]) -> Vec<u8> {
    let mut out = b"Cr24".to_vec();
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(public_key.len() as u32).to_le_bytes());
    out.extend_from_slice(&(signature.len() as u32).to_le_bytes());
    out.extend_from_slice(public_key);
    out.extend_from_slice(signature);
    out.extend_from_slice(zip);
    out
}

pub fn crx3_wrap(header: &[u8], zip: &[u8]) -> Vec<u8> {
    let mut out = b"Cr24".to_vec();
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(zip);
    out
}

fn varint(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn length_delimited(field: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![(field << 3) | 2];
    out.extend(varint(bytes.len()));
    out.extend_from_slice(bytes);
    out
}

/// CrxFileHeader with one sha256_with_rsa proof, padded to `total_len`
/// with an unknown field when there is room
pub fn crx3_header(public_key: &[u8], total_len: usize) -> Vec<u8> {
    let proof = length_delimited(1, public_key);
    let mut header = length_delimited(2, &proof);
    if total_len > header.len() + 2 {
        let room = total_len - header.len() - 1;
        for prefix in 1..=3 {
            let Some(content) = room.checked_sub(prefix) else {
                break;
            };
            if varint(content).len() == prefix {
                header.extend(length_delimited(15, &vec![0u8; content]));
                break;
            }
        }
    }
    header
}
