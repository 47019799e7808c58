//! The real kernel behind [`JailSyscalls`].

use super::{JailSyscalls, MountRequest, UserEntry};
use nix::errno::Errno;
use nix::mount::MntFlags;
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{AccessFlags, Gid, Uid, User};
use std::ffi::{CStr, CString};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSyscalls;

impl JailSyscalls for LinuxSyscalls {
    fn mount(&self, request: &MountRequest<'_>) -> nix::Result<()> {
        nix::mount::mount(
            request.source,
            request.target,
            request.fstype,
            request.flags,
            request.data,
        )
    }

    fn unmount(&self, target: &Path, flags: MntFlags) -> nix::Result<()> {
        nix::mount::umount2(target, flags)
    }

    fn mknod(&self, path: &Path, kind: SFlag, perm: Mode, dev: libc::dev_t) -> nix::Result<()> {
        nix::sys::stat::mknod(path, kind, perm, dev)
    }

    fn chown(&self, path: &Path, owner: Uid, group: Gid) -> nix::Result<()> {
        nix::unistd::chown(path, Some(owner), Some(group))
    }

    fn access(&self, path: &Path, mode: AccessFlags) -> nix::Result<()> {
        nix::unistd::access(path, mode)
    }

    fn lookup_user(&self, uid: Uid) -> nix::Result<Option<UserEntry>> {
        let Some(user) = User::from_uid(uid)? else {
            return Ok(None);
        };
        let name = CString::new(user.name).map_err(|_| Errno::EINVAL)?;
        Ok(Some(UserEntry {
            name,
            uid: user.uid,
            gid: user.gid,
        }))
    }

    fn init_groups(&self, user: &CStr, group: Gid) -> nix::Result<()> {
        nix::unistd::initgroups(user, group)
    }

    fn set_real_effective_gid(&self, gid: Gid) -> nix::Result<()> {
        // SAFETY: setregid takes plain integers.
        let rc = unsafe { libc::setregid(gid.as_raw(), gid.as_raw()) };
        Errno::result(rc).map(drop)
    }

    fn keep_capabilities(&self, keep: bool) -> nix::Result<()> {
        // SAFETY: prctl(PR_SET_KEEPCAPS) takes no pointers.
        let rc = unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, libc::c_ulong::from(keep), 0, 0, 0) };
        Errno::result(rc).map(drop)
    }

    fn set_real_effective_uid(&self, uid: Uid) -> nix::Result<()> {
        // SAFETY: setreuid takes plain integers.
        let rc = unsafe { libc::setreuid(uid.as_raw(), uid.as_raw()) };
        Errno::result(rc).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_root_user() {
        let root = LinuxSyscalls.lookup_user(Uid::from_raw(0)).unwrap();
        if let Some(root) = root {
            assert_eq!(root.uid, Uid::from_raw(0));
            assert_eq!(root.gid, Gid::from_raw(0));
        }
    }

    #[test]
    fn access_reports_missing_paths() {
        let missing = Path::new("/nonexistent/capjail/path");
        assert_eq!(LinuxSyscalls.access(missing, AccessFlags::F_OK), Err(Errno::ENOENT));
        assert!(LinuxSyscalls.access(Path::new("/"), AccessFlags::F_OK).is_ok());
    }
}
