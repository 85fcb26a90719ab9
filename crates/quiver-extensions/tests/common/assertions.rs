//! Assertion helpers for extension lifecycle testing

#![allow(dead_code)]

use quiver_core::types::ExtensionRecord;
use quiver_core::{ErrorCode, Result};
use quiver_extensions::PIN_CAPACITY;
use std::fmt::Debug;
use std::path::Path;

/// Assert that an operation failed with `code`
pub fn assert_code<T: Debug>(result: &Result<T>, code: ErrorCode) {
    match result {
        Ok(value) => panic!("Expected {}, got success: {:?}", code, value),
        Err(e) => assert_eq!(e.code(), code, "Unexpected error: {}", e),
    }
}

/// Assert a record lives at `<base>/<id>/<version>_0` with its manifest
pub fn assert_record_layout(base: &Path, record: &ExtensionRecord) {
    let expected = base
        .join(&record.id)
        .join(format!("{}_0", record.version));
    assert_eq!(record.installed_path, expected, "Unexpected installed path");
    assert!(
        expected.join("manifest.json").is_file(),
        "Missing manifest in {:?}",
        expected
    );
}

/// Assert no staging leftovers remain under the base dir
pub fn assert_no_staging_leftovers(base: &Path) {
    for entry in walkdir::WalkDir::new(base).into_iter().filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy();
        assert!(
            !name.contains(".tmp."),
            "Staging leftover at {:?}",
            entry.path()
        );
    }
    let staging = base.join("_staging");
    if staging.exists() {
        assert_eq!(
            std::fs::read_dir(&staging).unwrap().count(),
            0,
            "Extraction staging not cleaned"
        );
    }
}

/// Assert pins only reference enabled records with a toolbar action
pub fn assert_pins_eligible(pins: &[String], records: &[ExtensionRecord]) {
    assert!(pins.len() <= PIN_CAPACITY);
    for pin in pins {
        let record = records
            .iter()
            .find(|r| &r.id == pin)
            .unwrap_or_else(|| panic!("Pinned {} has no record", pin));
        assert!(record.enabled, "Pinned {} is disabled", pin);
        assert!(record.has_action(), "Pinned {} has no action", pin);
    }
}

/// Assert no two records share a host id
pub fn assert_unique_host_ids(records: &[ExtensionRecord]) {
    let mut seen = std::collections::HashSet::new();
    for record in records {
        if let Some(host_id) = &record.host_id {
            assert!(seen.insert(host_id.clone()), "Duplicate host id {}", host_id);
        }
    }
}
