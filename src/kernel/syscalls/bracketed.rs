//! Raise one capability, make one call, drop back to the baseline.
//!
//! The drop happens whether or not the call succeeded. A failed call is
//! returned as a recoverable [`PrivilegeError::Syscall`].

use super::{JailSyscalls, MountRequest};
use crate::config::types::{PrivilegeError, Result};
use crate::kernel::capabilities::{Capability, CapabilityState, PrivilegeBackend};
use crate::observability::DiagnosticKind;
use nix::errno::Errno;
use nix::mount::MntFlags;
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{Gid, Uid};
use std::path::Path;

/// What happens when the capability of a bracket cannot be raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The jail cannot be built without it: failure is fatal.
    Essential,
    /// Best effort: report `DiagnosticKind` once, then fail recoverably.
    Optional(DiagnosticKind),
}

/// Bracketed privileged calls.
///
/// Holds the capability state by exclusive borrow for its whole lifetime,
/// which keeps brackets strictly sequential.
pub struct BracketedSyscalls<'a, B: PrivilegeBackend, S: JailSyscalls> {
    caps: &'a mut CapabilityState<B>,
    sys: &'a S,
}

pub(crate) fn syscall_error(op: &'static str) -> impl FnOnce(Errno) -> PrivilegeError {
    move |source| PrivilegeError::Syscall { op, source }
}

impl<'a, B: PrivilegeBackend, S: JailSyscalls> BracketedSyscalls<'a, B, S> {
    pub fn new(caps: &'a mut CapabilityState<B>, sys: &'a S) -> Self {
        Self { caps, sys }
    }

    /// Unbracketed access, for calls that need no privilege.
    pub fn syscalls(&self) -> &S {
        self.sys
    }

    /// Run `f` with `cap` as the only effective capability.
    pub fn privileged<T>(
        &mut self,
        cap: Capability,
        requirement: Requirement,
        f: impl FnOnce(&S) -> Result<T>,
    ) -> Result<T> {
        match requirement {
            Requirement::Essential => self.caps.need(cap)?,
            Requirement::Optional(kind) => {
                if let Err(err) = self.caps.want(cap) {
                    if !err.is_internal() {
                        self.caps.warn_once(kind);
                    }
                    return Err(err);
                }
            }
        }

        let result = f(self.sys);
        self.caps.drop()?;
        result
    }

    pub fn mount(&mut self, request: &MountRequest<'_>) -> Result<()> {
        log::debug!(
            "mount {:?} on {} (type {:?}, flags {:?})",
            request.source,
            request.target.display(),
            request.fstype,
            request.flags
        );
        self.privileged(Capability::SysAdmin, Requirement::Essential, |sys| {
            sys.mount(request).map_err(syscall_error("mount"))
        })
    }

    pub fn unmount(&mut self, target: &Path, flags: MntFlags) -> Result<()> {
        log::debug!("umount2 {} ({:?})", target.display(), flags);
        self.privileged(Capability::SysAdmin, Requirement::Essential, |sys| {
            sys.unmount(target, flags).map_err(syscall_error("umount2"))
        })
    }

    pub fn mknod(&mut self, path: &Path, kind: SFlag, perm: Mode, dev: libc::dev_t) -> Result<()> {
        self.privileged(
            Capability::Mknod,
            Requirement::Optional(DiagnosticKind::MissingMknod),
            |sys| sys.mknod(path, kind, perm, dev).map_err(syscall_error("mknod")),
        )
    }

    pub fn chown(&mut self, path: &Path, owner: Uid, group: Gid) -> Result<()> {
        self.privileged(
            Capability::Chown,
            Requirement::Optional(DiagnosticKind::MissingChown),
            |sys| sys.chown(path, owner, group).map_err(syscall_error("chown")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::capabilities::CapabilityMask;
    use crate::testing::{Call, FakePrivileges, FakeSyscalls, RecordingSink};
    use nix::mount::MsFlags;

    struct Harness {
        state: CapabilityState<FakePrivileges>,
        privileges: FakePrivileges,
        sys: FakeSyscalls,
        sink: RecordingSink,
    }

    fn harness(held: &[Capability]) -> Harness {
        let privileges = FakePrivileges::with_permitted(held.iter().copied().collect());
        let sink = RecordingSink::default();
        let mut state = CapabilityState::with_sink(privileges.clone(), Box::new(sink.clone()));
        state.initialize().unwrap();
        let sys = FakeSyscalls::new(&privileges);
        Harness { state, privileges, sys, sink }
    }

    fn devpts_request(target: &Path) -> MountRequest<'_> {
        MountRequest {
            source: Some("devpts"),
            target,
            fstype: Some("devpts"),
            flags: MsFlags::empty(),
            data: Some("newinstance"),
        }
    }

    #[test]
    fn mount_runs_with_sys_admin_only_and_drops_afterwards() {
        let mut h = harness(&[Capability::SysAdmin, Capability::Mknod]);
        let target = Path::new("/dev/pts");

        BracketedSyscalls::new(&mut h.state, &h.sys)
            .mount(&devpts_request(target))
            .unwrap();

        let records = h.sys.records();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0].call, Call::Mount { .. }));
        assert_eq!(records[0].effective, CapabilityMask::of(Capability::SysAdmin));
        assert!(h.privileges.current().effective.is_empty());
    }

    #[test]
    fn failed_mount_still_closes_the_bracket() {
        let mut h = harness(&[Capability::SysAdmin]);
        h.sys.fail("mount", Errno::EBUSY);

        let err = BracketedSyscalls::new(&mut h.state, &h.sys)
            .mount(&devpts_request(Path::new("/dev/pts")))
            .unwrap_err();

        assert!(matches!(err, PrivilegeError::Syscall { op: "mount", source: Errno::EBUSY }));
        assert!(!err.is_fatal());
        assert!(h.privileges.current().effective.is_empty());
        assert_eq!(h.state.active(), None);
    }

    #[test]
    fn unmount_uses_sys_admin() {
        let mut h = harness(&[Capability::SysAdmin]);

        BracketedSyscalls::new(&mut h.state, &h.sys)
            .unmount(Path::new("/dev/pts"), MntFlags::MNT_DETACH)
            .unwrap();

        let records = h.sys.records();
        assert_eq!(records[0].effective, CapabilityMask::of(Capability::SysAdmin));
        assert!(h.privileges.current().effective.is_empty());
    }

    #[test]
    fn mount_without_sys_admin_is_fatal_and_never_calls_the_kernel() {
        let mut h = harness(&[Capability::SysAdmin]);
        // Elevation fails at the kernel level.
        h.privileges.fail_next_apply(libc::EPERM);

        let err = BracketedSyscalls::new(&mut h.state, &h.sys)
            .mount(&devpts_request(Path::new("/dev/pts")))
            .unwrap_err();

        assert!(matches!(err, PrivilegeError::Required { capability: Capability::SysAdmin, .. }));
        assert!(err.is_fatal());
        assert!(h.sys.records().is_empty());
    }

    #[test]
    fn mknod_with_capability_succeeds_and_returns_to_baseline() {
        let mut h = harness(&[Capability::SysAdmin, Capability::Mknod]);

        BracketedSyscalls::new(&mut h.state, &h.sys)
            .mknod(
                Path::new("/dev/ptmx"),
                SFlag::S_IFCHR,
                Mode::from_bits_truncate(0o666),
                nix::sys::stat::makedev(5, 2),
            )
            .unwrap();

        assert_eq!(h.sys.records()[0].effective, CapabilityMask::of(Capability::Mknod));
        assert!(h.privileges.current().effective.is_empty());
        assert!(h.sink.is_empty());
    }

    #[test]
    fn missing_mknod_warns_once_across_repeated_calls() {
        let mut h = harness(&[Capability::SysAdmin]);
        let mut ops = BracketedSyscalls::new(&mut h.state, &h.sys);

        for _ in 0..4 {
            let err = ops
                .mknod(Path::new("/dev/null"), SFlag::S_IFCHR, Mode::from_bits_truncate(0o666), 0)
                .unwrap_err();
            assert!(matches!(err, PrivilegeError::Unavailable(Capability::Mknod)));
            assert!(!err.is_fatal());
        }

        assert_eq!(h.sink.count(DiagnosticKind::MissingMknod), 1);
        assert_eq!(h.sink.len(), 1);
        assert!(h.sys.records().is_empty());
    }

    #[test]
    fn missing_chown_warns_once_independently_of_mknod() {
        let mut h = harness(&[Capability::SysAdmin]);
        let mut ops = BracketedSyscalls::new(&mut h.state, &h.sys);
        let path = Path::new("/run/user");

        let _ = ops.mknod(path, SFlag::S_IFCHR, Mode::empty(), 0);
        for _ in 0..3 {
            assert!(ops.chown(path, Uid::from_raw(0), Gid::from_raw(0)).is_err());
        }

        assert_eq!(h.sink.count(DiagnosticKind::MissingMknod), 1);
        assert_eq!(h.sink.count(DiagnosticKind::MissingChown), 1);
        assert_eq!(h.sink.len(), 2);
    }

    #[test]
    fn failed_chown_is_recoverable_and_drops() {
        let mut h = harness(&[Capability::SysAdmin, Capability::Chown]);
        h.sys.fail("chown", Errno::ENOENT);

        let err = BracketedSyscalls::new(&mut h.state, &h.sys)
            .chown(Path::new("/missing"), Uid::from_raw(0), Gid::from_raw(0))
            .unwrap_err();

        assert!(matches!(err, PrivilegeError::Syscall { op: "chown", .. }));
        assert_eq!(h.sys.records()[0].effective, CapabilityMask::of(Capability::Chown));
        assert!(h.privileges.current().effective.is_empty());
        // A syscall failure is not a missing capability.
        assert!(h.sink.is_empty());
    }

    #[test]
    fn every_wrapper_reports_internal_error_after_drop_forever() {
        let mut h = harness(&[Capability::SysAdmin, Capability::Mknod, Capability::Chown]);
        h.state.drop_forever().unwrap();
        let mut ops = BracketedSyscalls::new(&mut h.state, &h.sys);
        let path = Path::new("/dev/pts");

        let errors = [
            ops.mount(&devpts_request(path)).unwrap_err(),
            ops.unmount(path, MntFlags::empty()).unwrap_err(),
            ops.mknod(path, SFlag::S_IFCHR, Mode::empty(), 0).unwrap_err(),
            ops.chown(path, Uid::from_raw(0), Gid::from_raw(0)).unwrap_err(),
        ];

        for err in errors {
            assert!(matches!(err, PrivilegeError::DroppedForever));
        }
        assert!(h.sys.records().is_empty());
        assert!(h.sink.is_empty());
    }
}
