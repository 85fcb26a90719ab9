//! Dot-numeric version tuples
//!
//! Extension versions are `^\d+(\.\d+)*$`. Comparison is component-wise with
//! missing trailing components treated as zero, so `1.0` and `1.0.0` are equal.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Version used when a manifest has no usable version string
pub const FALLBACK_VERSION: &str = "1.0.0";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)*$").expect("static version pattern"))
}

/// Parsed dot-numeric version
#[derive(Debug, Clone)]
pub struct VersionTuple {
    parts: Vec<u64>,
    raw: String,
}

impl VersionTuple {
    /// Parse a version string; `None` if it does not match the pattern
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !version_pattern().is_match(raw) {
            return None;
        }
        let parts = raw
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            parts,
            raw: raw.to_string(),
        })
    }

    /// Parse a version, falling back to `1.0.0` when missing or invalid
    pub fn normalize(raw: Option<&str>) -> String {
        raw.and_then(Self::parse)
            .map(|v| v.raw)
            .unwrap_or_else(|| FALLBACK_VERSION.to_string())
    }

    /// Whether `raw` is an acceptable version string
    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_some()
    }

    /// Parse a version directory name of the form `<version>_<n>`
    ///
    /// Staging names (`<version>_0.tmp.<ts>`) and anything else return `None`.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let (version, suffix) = name.rsplit_once('_')?;
        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Self::parse(version)
    }

    /// Directory name for the active copy of this version
    pub fn dir_name(&self) -> String {
        format!("{}_0", self.raw)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }
}

impl Ord for VersionTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for VersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionTuple {}

impl std::fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
