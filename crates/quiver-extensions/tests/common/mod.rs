//! Common test utilities for quiver-extensions
//!
//! This module provides shared test infrastructure including:
//! - Constants used across suites
//! - Manifest and package builders (directories, ZIP, CRX v2/v3)
//! - Hand-written mocks of the host, store and window interfaces
//! - A temporary engine environment
//! - Assertion helpers for lifecycle testing

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod assertions;
pub mod builders;
pub mod constants;
pub mod fixtures;
pub mod mocks;

pub use assertions::*;
pub use builders::*;
pub use constants::*;
pub use fixtures::*;
pub use mocks::*;
