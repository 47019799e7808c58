//! Observability
//!
//! Operator-facing diagnostics emitted while the jail is built.

pub mod diagnostics;

pub use diagnostics::{DiagnosticKind, DiagnosticSink, LogSink, WarnOnce};
