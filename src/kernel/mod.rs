//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: capabilities -> syscalls -> credentials -> devpts

pub mod capabilities;
pub mod credentials;
pub mod devpts;
pub mod syscalls;
