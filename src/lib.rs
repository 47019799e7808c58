//! capjail: privilege bracketing for a Linux jail launcher
//!
//! The launcher starts with root-equivalent capabilities and builds a jail
//! (private mounts, devices, identity) for an untrusted command. This crate
//! governs exactly when, and which single capability, the process holds
//! while doing so.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::capabilities`]: baseline computation and the raise/drop state machine
//! - [`kernel::syscalls`]: mount, umount2, mknod and chown, each bracketed by one capability
//! - [`kernel::credentials`]: ordered group-then-user identity switch
//! - [`kernel::devpts`]: private devpts instance built on the bracketed calls
//!
//! ## Observability ([`observability`])
//! - [`observability::diagnostics`]: per-kind warn-once reporting of degraded setup
//!
//! ## Configuration ([`config`])
//! - [`config::loader`]: root-owned launcher configuration file
//! - [`config::types`]: error type, severities and shared definitions
//!
//! ## Testing Infrastructure ([`testing`])
//! - [`testing::fake_kernel`]: fake capability sets and system calls
//! - [`testing::recording_sink`]: diagnostics recorder
//!
//! # Lifecycle
//!
//! ```text
//! initialize -> (want|need -> syscall -> drop)* -> switch_identity -> drop_forever -> exec
//! ```
//!
//! Outside a bracket the effective set is empty; inside one it holds exactly
//! one capability. Nothing here terminates the process: fatal errors are
//! returned with [`Severity::Fatal`] and the launcher decides.

// Kernel Primitives
pub mod kernel;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Testing Infrastructure
pub mod testing;

// CLI entrypoint wiring for the capjail binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::{LauncherConfig, PrivilegeError, Result, Severity, SwitchStage};
pub use kernel::capabilities::{
    Capability, CapabilityMask, CapabilitySets, CapabilityState, LinuxCapabilities,
    PrivilegeBackend,
};
pub use kernel::credentials::switch_identity;
pub use kernel::devpts::{setup_devpts, DevptsLayout, DevptsOutcome};
pub use kernel::syscalls::{
    BracketedSyscalls, JailSyscalls, LinuxSyscalls, MountRequest, Requirement, UserEntry,
};
