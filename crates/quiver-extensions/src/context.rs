//! Shared engine context handed to each service

use crate::lock::KeyedMutex;
use quiver_core::types::Policy;
use quiver_core::{EngineConfig, EnginePaths, PolicyLoader, Result};
use std::path::Path;
use std::sync::Arc;

/// Paths, policy and locks shared by the engine services
///
/// Cloning is cheap; services hold their own copy and never call back into
/// the coordinator.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub paths: EnginePaths,
    pub policy: Arc<Policy>,
    pub locks: KeyedMutex,
}

impl EngineContext {
    /// Build a context, loading `<base>/policy.json` over the defaults
    pub fn new(config: EngineConfig) -> Result<Self> {
        let paths = config.paths();
        let policy = PolicyLoader::load(&paths.policy_file())?;
        Ok(Self::with_policy(config, policy))
    }

    pub fn with_policy(config: EngineConfig, policy: Policy) -> Self {
        Self {
            paths: config.paths(),
            config: Arc::new(config),
            policy: Arc::new(policy),
            locks: KeyedMutex::new(),
        }
    }

    /// Log-safe rendering of a user path
    pub fn log_path(&self, path: &Path) -> String {
        quiver_core::utils::log_path(path, self.config.debug)
    }
}
