//! Configuration loading

pub mod engine;
pub mod policy_loader;

pub use engine::{EngineConfig, EnginePaths, DEFAULT_ALLOWED_DIRS, DEFAULT_ICON_SCHEME};
pub use policy_loader::{merge_values, PolicyLoader};
