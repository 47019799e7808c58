//! Testing infrastructure
//!
//! In-memory stand-ins for the kernel so the capability state machine and
//! its callers can be exercised without elevated privilege.

pub mod fake_kernel;
pub mod recording_sink;

// Re-export commonly used items
pub use fake_kernel::*;
pub use recording_sink::*;
