//! UID/GID switch for the jailed command.
//!
//! CRITICAL: the group identity is changed BEFORE the user identity. Once the
//! uid changes, CAP_SETGID may no longer be usable.

mod transition;
mod validation;

pub use transition::switch_identity;
pub use validation::{validate_ids, validate_uid_range};
