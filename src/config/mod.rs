//! Configuration
//!
//! Launcher configuration loading and the shared type definitions.

pub mod loader;
pub mod types;

pub use loader::{load, DEFAULT_CONFIG_PATH};
pub use types::{LauncherConfig, PrivilegeError, Result, Severity};
