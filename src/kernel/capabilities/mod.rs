//! Linux capability bracketing for jail construction.
//!
//! The process keeps a fixed baseline of permitted capabilities and raises
//! at most one of them into the effective set at a time. Everything is
//! discarded for good right before the jailed command executes.

mod backend;
mod no_new_privs;
mod query;
mod state;

pub use backend::{LinuxCapabilities, PrivilegeBackend};
pub use no_new_privs::{check_no_new_privs, set_no_new_privs};
pub use query::get_capability_status;
pub use state::{compute_baseline, CapabilityState};

use std::fmt;

/// The capabilities the launcher may ever need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    NetAdmin,
    Chown,
    Mknod,
    Setgid,
    Setuid,
    SysAdmin,
}

impl Capability {
    /// Candidate list intersected with the starting permitted set at initialization.
    pub const ALL: [Capability; 6] = [
        Capability::NetAdmin,
        Capability::Chown,
        Capability::Mknod,
        Capability::Setgid,
        Capability::Setuid,
        Capability::SysAdmin,
    ];

    /// Kernel capability number, as in `linux/capability.h`.
    pub const fn number(self) -> u32 {
        match self {
            Self::Chown => 0,
            Self::Setgid => 6,
            Self::Setuid => 7,
            Self::NetAdmin => 12,
            Self::SysAdmin => 21,
            Self::Mknod => 27,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NetAdmin => "CAP_NET_ADMIN",
            Self::Chown => "CAP_CHOWN",
            Self::Mknod => "CAP_MKNOD",
            Self::Setgid => "CAP_SETGID",
            Self::Setuid => "CAP_SETUID",
            Self::SysAdmin => "CAP_SYS_ADMIN",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A 64-bit capability mask, one bit per kernel capability number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityMask(u64);

impl CapabilityMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn of(cap: Capability) -> Self {
        Self(1 << cap.number())
    }

    /// Mask holding every candidate capability.
    pub fn candidates() -> Self {
        Capability::ALL.iter().copied().collect()
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & (1 << cap.number()) != 0
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0 |= 1 << cap.number();
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Candidate capabilities present in the mask.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilityMask {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for cap in iter {
            mask.insert(cap);
        }
        mask
    }
}

impl fmt::Display for CapabilityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::name).collect();
        if names.is_empty() {
            f.write_str("{}")
        } else {
            write!(f, "{{{}}}", names.join(", "))
        }
    }
}

/// The three per-process capability sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySets {
    pub permitted: CapabilityMask,
    pub effective: CapabilityMask,
    pub inheritable: CapabilityMask,
}

impl CapabilitySets {
    pub const fn empty() -> Self {
        Self {
            permitted: CapabilityMask::empty(),
            effective: CapabilityMask::empty(),
            inheritable: CapabilityMask::empty(),
        }
    }

    /// Baseline projection: permitted kept, nothing effective or inheritable.
    pub const fn baseline(permitted: CapabilityMask) -> Self {
        Self {
            permitted,
            effective: CapabilityMask::empty(),
            inheritable: CapabilityMask::empty(),
        }
    }
}

pub(crate) const PR_SET_NO_NEW_PRIVS: libc::c_int = 38;
pub(crate) const PR_GET_NO_NEW_PRIVS: libc::c_int = 39;
pub(crate) const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_numbers_match_kernel_headers() {
        assert_eq!(Capability::Chown.number(), 0);
        assert_eq!(Capability::Setgid.number(), 6);
        assert_eq!(Capability::Setuid.number(), 7);
        assert_eq!(Capability::NetAdmin.number(), 12);
        assert_eq!(Capability::SysAdmin.number(), 21);
        assert_eq!(Capability::Mknod.number(), 27);
    }

    #[test]
    fn mask_intersection_keeps_only_shared_bits() {
        let held = CapabilityMask::from_bits(u64::MAX);
        assert_eq!(held.intersection(CapabilityMask::candidates()), CapabilityMask::candidates());

        let held: CapabilityMask = [Capability::SysAdmin, Capability::Mknod].into_iter().collect();
        let baseline = held.intersection(CapabilityMask::candidates());
        assert!(baseline.contains(Capability::SysAdmin));
        assert!(baseline.contains(Capability::Mknod));
        assert!(!baseline.contains(Capability::Chown));
    }

    #[test]
    fn non_candidate_bits_are_dropped_from_baseline() {
        // CAP_KILL (5) and CAP_SYS_PTRACE (19) are not candidates.
        let held = CapabilityMask::from_bits((1 << 5) | (1 << 19) | (1 << 21));
        let baseline = held.intersection(CapabilityMask::candidates());
        assert_eq!(baseline, CapabilityMask::of(Capability::SysAdmin));
    }

    #[test]
    fn mask_display_lists_names() {
        let mask: CapabilityMask = [Capability::Chown, Capability::SysAdmin].into_iter().collect();
        assert_eq!(mask.to_string(), "{CAP_CHOWN, CAP_SYS_ADMIN}");
        assert_eq!(CapabilityMask::empty().to_string(), "{}");
    }
}
