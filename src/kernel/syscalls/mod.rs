//! Privileged system calls used to build the jail.
//!
//! [`JailSyscalls`] is the raw kernel surface; [`BracketedSyscalls`] wraps each
//! call in a raise/drop bracket of exactly one capability.

mod bracketed;
mod linux;

pub use bracketed::{BracketedSyscalls, Requirement};
pub(crate) use bracketed::syscall_error;
pub use linux::LinuxSyscalls;

use nix::mount::{MntFlags, MsFlags};
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{AccessFlags, Gid, Uid};
use std::ffi::{CStr, CString};
use std::path::Path;

/// Arguments of a mount(2) call.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    pub source: Option<&'a str>,
    pub target: &'a Path,
    pub fstype: Option<&'a str>,
    pub flags: MsFlags,
    pub data: Option<&'a str>,
}

impl<'a> MountRequest<'a> {
    /// A bind mount of `source` onto `target`.
    pub fn bind(source: &'a str, target: &'a Path) -> Self {
        Self {
            source: Some(source),
            target,
            fstype: None,
            flags: MsFlags::MS_BIND,
            data: None,
        }
    }
}

/// An entry of the system user database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: CString,
    pub uid: Uid,
    /// Primary group.
    pub gid: Gid,
}

/// Kernel calls the jail launcher makes, unbracketed.
pub trait JailSyscalls {
    fn mount(&self, request: &MountRequest<'_>) -> nix::Result<()>;
    fn unmount(&self, target: &Path, flags: MntFlags) -> nix::Result<()>;
    fn mknod(&self, path: &Path, kind: SFlag, perm: Mode, dev: libc::dev_t) -> nix::Result<()>;
    fn chown(&self, path: &Path, owner: Uid, group: Gid) -> nix::Result<()>;
    fn access(&self, path: &Path, mode: AccessFlags) -> nix::Result<()>;
    fn lookup_user(&self, uid: Uid) -> nix::Result<Option<UserEntry>>;
    /// Reload the supplementary group list of `user`, adding `group`.
    fn init_groups(&self, user: &CStr, group: Gid) -> nix::Result<()>;
    fn set_real_effective_gid(&self, gid: Gid) -> nix::Result<()>;
    /// Keep the permitted set when every uid leaves 0 (`PR_SET_KEEPCAPS`).
    fn keep_capabilities(&self, keep: bool) -> nix::Result<()>;
    fn set_real_effective_uid(&self, uid: Uid) -> nix::Result<()>;
}
