//! Fake capability sets and system calls.
//!
//! `FakePrivileges` behaves like capset(2): the permitted set can only shrink
//! and the effective set must stay within it. `FakeSyscalls` checks that the
//! capability a real call would need is effective, and records every call
//! together with the effective set seen at that moment.

use crate::kernel::capabilities::{Capability, CapabilityMask, CapabilitySets, PrivilegeBackend};
use crate::kernel::syscalls::{JailSyscalls, MountRequest, UserEntry};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{AccessFlags, Gid, Uid};
use std::collections::{HashMap, HashSet};
use std::ffi::{CStr, CString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn is_subset(inner: CapabilityMask, outer: CapabilityMask) -> bool {
    inner.bits() & !outer.bits() == 0
}

#[derive(Debug, Default)]
struct PrivilegeInner {
    sets: CapabilitySets,
    history: Vec<CapabilitySets>,
    fail_next_apply: Option<i32>,
    fail_read: Option<i32>,
}

/// In-memory process capability sets. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakePrivileges {
    inner: Arc<Mutex<PrivilegeInner>>,
}

impl FakePrivileges {
    pub fn new(sets: CapabilitySets) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PrivilegeInner {
                sets,
                ..PrivilegeInner::default()
            })),
        }
    }

    /// Starting state with `permitted` held and nothing effective.
    pub fn with_permitted(permitted: CapabilityMask) -> Self {
        Self::new(CapabilitySets::baseline(permitted))
    }

    pub fn current(&self) -> CapabilitySets {
        lock(&self.inner).sets
    }

    /// Overwrite the sets as if another party changed them.
    pub fn set_current(&self, sets: CapabilitySets) {
        lock(&self.inner).sets = sets;
    }

    /// Every set successfully applied, oldest first.
    pub fn history(&self) -> Vec<CapabilitySets> {
        lock(&self.inner).history.clone()
    }

    /// Make the next apply fail with `errno`, leaving the sets untouched.
    pub fn fail_next_apply(&self, errno: i32) {
        lock(&self.inner).fail_next_apply = Some(errno);
    }

    pub fn fail_reads(&self, errno: i32) {
        lock(&self.inner).fail_read = Some(errno);
    }
}

impl PrivilegeBackend for FakePrivileges {
    fn read(&self) -> io::Result<CapabilitySets> {
        let inner = lock(&self.inner);
        match inner.fail_read {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(inner.sets),
        }
    }

    fn apply(&mut self, sets: &CapabilitySets) -> io::Result<()> {
        let mut inner = lock(&self.inner);
        if let Some(errno) = inner.fail_next_apply.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if !is_subset(sets.permitted, inner.sets.permitted)
            || !is_subset(sets.effective, sets.permitted)
        {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        inner.sets = *sets;
        inner.history.push(*sets);
        Ok(())
    }
}

/// A call made through [`FakeSyscalls`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Mount {
        source: Option<String>,
        target: PathBuf,
        fstype: Option<String>,
        flags: MsFlags,
        data: Option<String>,
    },
    Unmount {
        target: PathBuf,
        flags: MntFlags,
    },
    Mknod {
        path: PathBuf,
        kind: SFlag,
        perm: Mode,
        dev: libc::dev_t,
    },
    Chown {
        path: PathBuf,
        owner: Uid,
        group: Gid,
    },
    Access {
        path: PathBuf,
        mode: AccessFlags,
    },
    LookupUser(Uid),
    InitGroups {
        user: String,
        group: Gid,
    },
    SetGid(Gid),
    KeepCapabilities(bool),
    SetUid(Uid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call: Call,
    /// Effective capabilities at the time of the call.
    pub effective: CapabilityMask,
}

/// Credentials of the fake process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeIdentity {
    pub uid: Uid,
    pub gid: Gid,
    pub groups: Vec<Gid>,
}

#[derive(Debug, Clone)]
struct FakeUser {
    name: String,
    gid: Gid,
    supplementary: Vec<Gid>,
}

#[derive(Debug)]
struct SyscallInner {
    records: Vec<CallRecord>,
    failures: HashMap<&'static str, Errno>,
    users: HashMap<Uid, FakeUser>,
    existing: HashSet<PathBuf>,
    writable: HashSet<PathBuf>,
    keep_caps: bool,
    identity: FakeIdentity,
}

/// In-memory kernel for the calls the launcher brackets.
#[derive(Debug)]
pub struct FakeSyscalls {
    privileges: FakePrivileges,
    inner: Mutex<SyscallInner>,
}

impl FakeSyscalls {
    /// Calls are checked against the effective set of `privileges`.
    /// The process starts as root with no supplementary groups.
    pub fn new(privileges: &FakePrivileges) -> Self {
        Self {
            privileges: privileges.clone(),
            inner: Mutex::new(SyscallInner {
                records: Vec::new(),
                failures: HashMap::new(),
                users: HashMap::new(),
                existing: HashSet::new(),
                writable: HashSet::new(),
                keep_caps: false,
                identity: FakeIdentity {
                    uid: Uid::from_raw(0),
                    gid: Gid::from_raw(0),
                    groups: Vec::new(),
                },
            }),
        }
    }

    /// Make every call named `op` fail with `errno`.
    /// Names: mount, umount2, mknod, chown, access, getpwuid, initgroups, setregid,
    /// prctl, setreuid.
    pub fn fail(&self, op: &'static str, errno: Errno) {
        lock(&self.inner).failures.insert(op, errno);
    }

    pub fn add_user(&self, uid: u32, name: &str, gid: u32, supplementary: &[u32]) {
        lock(&self.inner).users.insert(
            Uid::from_raw(uid),
            FakeUser {
                name: name.to_string(),
                gid: Gid::from_raw(gid),
                supplementary: supplementary.iter().map(|g| Gid::from_raw(*g)).collect(),
            },
        );
    }

    pub fn add_path(&self, path: impl Into<PathBuf>) {
        lock(&self.inner).existing.insert(path.into());
    }

    pub fn add_writable_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut inner = lock(&self.inner);
        inner.existing.insert(path.clone());
        inner.writable.insert(path);
    }

    pub fn path_exists(&self, path: &Path) -> bool {
        lock(&self.inner).existing.contains(path)
    }

    pub fn records(&self) -> Vec<CallRecord> {
        lock(&self.inner).records.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.records().into_iter().map(|r| r.call).collect()
    }

    pub fn identity(&self) -> FakeIdentity {
        lock(&self.inner).identity.clone()
    }

    /// Record the call, then apply injected failures and the capability check.
    fn enter(
        &self,
        op: &'static str,
        call: Call,
        required: Option<Capability>,
    ) -> nix::Result<MutexGuard<'_, SyscallInner>> {
        let effective = self.privileges.current().effective;
        let mut inner = lock(&self.inner);
        inner.records.push(CallRecord { call, effective });
        if let Some(errno) = inner.failures.get(op) {
            return Err(*errno);
        }
        if let Some(cap) = required {
            if !effective.contains(cap) {
                return Err(Errno::EPERM);
            }
        }
        Ok(inner)
    }
}

impl JailSyscalls for FakeSyscalls {
    fn mount(&self, request: &MountRequest<'_>) -> nix::Result<()> {
        let call = Call::Mount {
            source: request.source.map(str::to_string),
            target: request.target.to_path_buf(),
            fstype: request.fstype.map(str::to_string),
            flags: request.flags,
            data: request.data.map(str::to_string),
        };
        self.enter("mount", call, Some(Capability::SysAdmin)).map(drop)
    }

    fn unmount(&self, target: &Path, flags: MntFlags) -> nix::Result<()> {
        let call = Call::Unmount {
            target: target.to_path_buf(),
            flags,
        };
        self.enter("umount2", call, Some(Capability::SysAdmin)).map(drop)
    }

    fn mknod(&self, path: &Path, kind: SFlag, perm: Mode, dev: libc::dev_t) -> nix::Result<()> {
        let call = Call::Mknod {
            path: path.to_path_buf(),
            kind,
            perm,
            dev,
        };
        let mut inner = self.enter("mknod", call, Some(Capability::Mknod))?;
        if !inner.existing.insert(path.to_path_buf()) {
            return Err(Errno::EEXIST);
        }
        Ok(())
    }

    fn chown(&self, path: &Path, owner: Uid, group: Gid) -> nix::Result<()> {
        let call = Call::Chown {
            path: path.to_path_buf(),
            owner,
            group,
        };
        self.enter("chown", call, Some(Capability::Chown)).map(drop)
    }

    fn access(&self, path: &Path, mode: AccessFlags) -> nix::Result<()> {
        let call = Call::Access {
            path: path.to_path_buf(),
            mode,
        };
        let inner = self.enter("access", call, None)?;
        if !inner.existing.contains(path) {
            return Err(Errno::ENOENT);
        }
        if mode.contains(AccessFlags::W_OK) && !inner.writable.contains(path) {
            return Err(Errno::EACCES);
        }
        Ok(())
    }

    fn lookup_user(&self, uid: Uid) -> nix::Result<Option<UserEntry>> {
        let inner = self.enter("getpwuid", Call::LookupUser(uid), None)?;
        let Some(user) = inner.users.get(&uid) else {
            return Ok(None);
        };
        let name = CString::new(user.name.clone()).map_err(|_| Errno::EINVAL)?;
        Ok(Some(UserEntry {
            name,
            uid,
            gid: user.gid,
        }))
    }

    fn init_groups(&self, user: &CStr, group: Gid) -> nix::Result<()> {
        let name = user.to_string_lossy().into_owned();
        let call = Call::InitGroups {
            user: name.clone(),
            group,
        };
        let mut inner = self.enter("initgroups", call, Some(Capability::Setgid))?;
        let mut groups: Vec<Gid> = inner
            .users
            .values()
            .find(|u| u.name == name)
            .map(|u| u.supplementary.clone())
            .unwrap_or_default();
        if !groups.contains(&group) {
            groups.push(group);
        }
        inner.identity.groups = groups;
        Ok(())
    }

    fn set_real_effective_gid(&self, gid: Gid) -> nix::Result<()> {
        let mut inner = self.enter("setregid", Call::SetGid(gid), Some(Capability::Setgid))?;
        inner.identity.gid = gid;
        Ok(())
    }

    fn keep_capabilities(&self, keep: bool) -> nix::Result<()> {
        let mut inner = self.enter("prctl", Call::KeepCapabilities(keep), None)?;
        inner.keep_caps = keep;
        Ok(())
    }

    /// Leaving uid 0 clears the effective set, and the permitted set too
    /// unless capabilities are kept.
    fn set_real_effective_uid(&self, uid: Uid) -> nix::Result<()> {
        let mut inner = self.enter("setreuid", Call::SetUid(uid), Some(Capability::Setuid))?;
        let leaving_root = inner.identity.uid.is_root() && !uid.is_root();
        inner.identity.uid = uid;
        if leaving_root {
            let mut sets = self.privileges.current();
            sets.effective = CapabilityMask::empty();
            if !inner.keep_caps {
                sets.permitted = CapabilityMask::empty();
            }
            self.privileges.set_current(sets);
        }
        Ok(())
    }
}
