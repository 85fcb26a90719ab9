//! Temporary engine environments
//!
//! Layout under one temp directory:
//! ```text
//! <tmp>/base/              engine base dir
//! <tmp>/home/Downloads/    allowed install root
//! <tmp>/bundle/            bundled packages + preinstalled.json
//! <tmp>/elsewhere/         outside every allowed root
//! ```

#![allow(dead_code)]

use super::builders::PackageBuilder;
use super::mocks::{MockHost, MockStore};
use quiver_core::EngineConfig;
use quiver_extensions::store::StoreClient;
use quiver_extensions::{EngineContext, LifecycleCoordinator};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    temp: TempDir,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        for dir in ["base", "home/Downloads", "bundle", "elsewhere"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn base(&self) -> PathBuf {
        self.temp.path().join("base")
    }

    pub fn downloads(&self) -> PathBuf {
        self.temp.path().join("home/Downloads")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.temp.path().join("bundle")
    }

    pub fn elsewhere(&self) -> PathBuf {
        self.temp.path().join("elsewhere")
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig::new(self.base())
            .with_allowed_root(self.downloads())
            .with_bundled_dir(self.bundle_dir())
    }

    pub fn context(&self) -> EngineContext {
        EngineContext::new(self.config()).expect("engine context")
    }

    /// Write `policy.json` into the base dir (before building a coordinator)
    pub fn write_policy(&self, policy: Value) {
        fs::write(self.base().join("policy.json"), policy.to_string()).unwrap();
    }

    /// Write a package directory under Downloads
    pub fn package_dir(&self, name: &str, package: &PackageBuilder) -> PathBuf {
        package.write_dir(&self.downloads().join(name))
    }

    /// Write archive bytes under Downloads
    pub fn archive(&self, file_name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.downloads().join(file_name);
        fs::write(&path, bytes).unwrap();
        path
    }

    /// Write a bundled package and return its relative key
    pub fn bundled_package(&self, key: &str, package: &PackageBuilder) -> String {
        package.write_dir(&self.bundle_dir().join(key));
        key.to_string()
    }

    pub fn write_preinstalled(&self, entries: Value) {
        fs::write(
            self.bundle_dir().join("preinstalled.json"),
            serde_json::json!({ "extensions": entries }).to_string(),
        )
        .unwrap();
    }

    pub fn coordinator(
        &self,
        host: Arc<MockHost>,
        store: Option<Arc<MockStore>>,
    ) -> LifecycleCoordinator {
        let store = store.map(|s| s as Arc<dyn StoreClient>);
        LifecycleCoordinator::new(self.context(), host, store)
    }

    /// Started coordinator with a fresh mock host and store
    pub async fn start(&self) -> (Arc<MockHost>, Arc<MockStore>, LifecycleCoordinator) {
        let host = Arc::new(MockHost::new());
        let store = Arc::new(MockStore::new(&self.base()));
        let engine = self.coordinator(host.clone(), Some(store.clone()));
        engine.start().await.expect("engine start");
        (host, store, engine)
    }
}

/// Source string for an install call
pub fn src(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
