//! # quiver-core
//!
//! Core library for the Quiver extension engine providing:
//! - Stable, caller-facing error codes
//! - Extension record, manifest and policy types
//! - Engine configuration and on-disk layout
//! - Dot-numeric version handling

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::{EngineConfig, EnginePaths, PolicyLoader};
pub use error::{Error, ErrorCode, OperationResult, Result};
pub use utils::get_home_dir;
