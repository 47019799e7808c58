//! Target identity checks, made before any capability is raised.

use crate::config::types::{PrivilegeError, Result};
use std::ops::RangeInclusive;

/// Reject root as the target user or primary group.
pub fn validate_ids(uid: u32, gid: u32) -> Result<()> {
    if uid == 0 || gid == 0 {
        return Err(PrivilegeError::UnsafeIdentity(format!(
            "Cannot transition to root UID/GID (uid={}, gid={})",
            uid, gid
        )));
    }
    Ok(())
}

/// Reject a target uid outside the configured safe range.
pub fn validate_uid_range(uid: u32, range: &RangeInclusive<u32>) -> Result<()> {
    if uid == 0 || !range.contains(&uid) {
        return Err(PrivilegeError::UnsafeIdentity(format!(
            "uid {} is outside the allowed range {}-{}",
            uid,
            range.start(),
            range.end()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ids_rejects_root_uid() {
        let err = validate_ids(0, 1000).unwrap_err();
        assert!(matches!(err, PrivilegeError::UnsafeIdentity(_)));
        assert!(err.is_fatal());
        assert!(!err.is_internal());
    }

    #[test]
    fn validate_ids_rejects_root_gid() {
        assert!(validate_ids(1000, 0).is_err());
    }

    #[test]
    fn validate_ids_accepts_non_root() {
        assert!(validate_ids(1000, 1000).is_ok());
    }

    #[test]
    fn uid_range_bounds_are_inclusive() {
        let range = 1000..=65534;
        assert!(validate_uid_range(1000, &range).is_ok());
        assert!(validate_uid_range(65534, &range).is_ok());
        assert!(validate_uid_range(999, &range).is_err());
        assert!(validate_uid_range(65535, &range).is_err());
    }

    #[test]
    fn uid_zero_is_rejected_even_inside_the_range() {
        assert!(validate_uid_range(0, &(0..=10)).is_err());
    }
}
