//! Shared type definitions: the crate error, severities and the launcher configuration.

use crate::kernel::capabilities::Capability;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Lowest uid `--uid` may name unless the configuration says otherwise.
pub const DEFAULT_MIN_SAFE_UID: u32 = 1000;
/// Highest uid `--uid` may name unless the configuration says otherwise.
pub const DEFAULT_MAX_SAFE_UID: u32 = 65534;

/// How the launcher must react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The caller may continue jail construction in a degraded mode.
    Recoverable,
    /// Jail construction cannot continue; the launcher must terminate.
    Fatal,
}

/// Stage of an identity switch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStage {
    Group,
    User,
}

impl std::fmt::Display for SwitchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Errors raised while holding, raising or discarding privilege.
#[derive(Error, Debug)]
pub enum PrivilegeError {
    #[error("The process is lacking the CAP_SYS_ADMIN capability")]
    MissingSysAdmin,

    #[error("Failed to read process capabilities")]
    CapabilityRead(#[source] std::io::Error),

    #[error("{0} is not part of the capability baseline")]
    Unavailable(Capability),

    #[error("Failed to raise {capability}")]
    Elevation {
        capability: Capability,
        #[source]
        source: std::io::Error,
    },

    #[error("Required capability {capability} could not be raised")]
    Required {
        capability: Capability,
        #[source]
        source: Box<PrivilegeError>,
    },

    #[error("Failed to restore capability sets")]
    Restore(#[source] std::io::Error),

    #[error("Internal error: capability state used before initialization")]
    NotInitialized,

    #[error("Internal error: {requested} requested while {active} is still raised")]
    AlreadyElevated {
        active: Capability,
        requested: Capability,
    },

    #[error("Internal error: capability state used after the final privilege drop")]
    DroppedForever,

    #[error("{op} failed")]
    Syscall {
        op: &'static str,
        #[source]
        source: Errno,
    },

    #[error("No user database entry for uid {0}")]
    UnknownUser(u32),

    #[error("Identity switch to uid {uid} failed at the {stage} stage")]
    IdentitySwitch {
        uid: u32,
        stage: SwitchStage,
        #[source]
        source: Box<PrivilegeError>,
    },

    #[error("Unsafe target identity: {0}")]
    UnsafeIdentity(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PrivilegeError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Unavailable(_) | Self::Elevation { .. } | Self::Syscall { .. } => {
                Severity::Recoverable
            }
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// True for calls made outside the legal capability state machine.
    /// These are programming errors, never ordinary privilege failures.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::AlreadyElevated { .. } | Self::DroppedForever
        )
    }
}

/// Exit status used by the launcher when it terminates on an error.
impl From<&PrivilegeError> for i32 {
    fn from(err: &PrivilegeError) -> i32 {
        match err {
            PrivilegeError::Config(_) => 78,
            PrivilegeError::NotInitialized
            | PrivilegeError::AlreadyElevated { .. }
            | PrivilegeError::DroppedForever => 70,
            PrivilegeError::MissingSysAdmin | PrivilegeError::Required { .. } => 77,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrivilegeError>;

/// Launcher configuration, read from a root-owned JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Whether `--allow-new-privs` may be requested on the command line.
    pub permit_allow_new_privs: bool,
    pub min_safe_uid: u32,
    pub max_safe_uid: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            permit_allow_new_privs: false,
            min_safe_uid: DEFAULT_MIN_SAFE_UID,
            max_safe_uid: DEFAULT_MAX_SAFE_UID,
        }
    }
}

impl LauncherConfig {
    /// Uids the jailed command may run as.
    pub fn safe_uid_range(&self) -> RangeInclusive<u32> {
        self.min_safe_uid..=self.max_safe_uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_the_degraded_mode_ones() {
        assert_eq!(
            PrivilegeError::Unavailable(Capability::Mknod).severity(),
            Severity::Recoverable
        );
        assert_eq!(
            PrivilegeError::Syscall { op: "mount", source: Errno::EPERM }.severity(),
            Severity::Recoverable
        );
        assert!(PrivilegeError::MissingSysAdmin.is_fatal());
        assert!(PrivilegeError::Restore(std::io::Error::from_raw_os_error(libc::EPERM)).is_fatal());
    }

    #[test]
    fn internal_errors_are_fatal_and_distinct() {
        for err in [
            PrivilegeError::NotInitialized,
            PrivilegeError::DroppedForever,
            PrivilegeError::AlreadyElevated {
                active: Capability::Chown,
                requested: Capability::SysAdmin,
            },
        ] {
            assert!(err.is_internal());
            assert!(err.is_fatal());
            assert_eq!(i32::from(&err), 70);
        }
        assert!(!PrivilegeError::Unavailable(Capability::Chown).is_internal());
    }

    #[test]
    fn required_wraps_source() {
        let err = PrivilegeError::Required {
            capability: Capability::SysAdmin,
            source: Box::new(PrivilegeError::Unavailable(Capability::SysAdmin)),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("CAP_SYS_ADMIN"));
    }

    #[test]
    fn config_defaults_deny_new_privs() {
        let config: LauncherConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.permit_allow_new_privs);
        assert_eq!(config.safe_uid_range(), DEFAULT_MIN_SAFE_UID..=DEFAULT_MAX_SAFE_UID);
    }

    #[test]
    fn display_leaves_the_cause_to_the_source_chain() {
        let err = PrivilegeError::Restore(std::io::Error::from_raw_os_error(libc::EPERM));
        assert_eq!(err.to_string(), "Failed to restore capability sets");

        let err = PrivilegeError::IdentitySwitch {
            uid: 1000,
            stage: SwitchStage::User,
            source: Box::new(PrivilegeError::Syscall { op: "setreuid", source: Errno::EPERM }),
        };
        assert_eq!(err.to_string(), "Identity switch to uid 1000 failed at the user stage");
    }
}
