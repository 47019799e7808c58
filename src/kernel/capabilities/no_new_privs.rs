//! `PR_SET_NO_NEW_PRIVS` handling for the final exec.
use super::{PR_GET_NO_NEW_PRIVS, PR_SET_NO_NEW_PRIVS};
use crate::config::types::{PrivilegeError, Result};
use nix::errno::Errno;

/// Prevent privilege gain via execve (setuid binaries, file capabilities).
/// Idempotent and irreversible once set.
pub fn set_no_new_privs() -> Result<()> {
    // SAFETY: prctl(PR_SET_NO_NEW_PRIVS, 1) takes no pointers and is idempotent.
    let result = unsafe { libc::prctl(PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if result != 0 {
        return Err(PrivilegeError::Syscall {
            op: "prctl(PR_SET_NO_NEW_PRIVS)",
            source: Errno::last(),
        });
    }
    log::info!("Set PR_SET_NO_NEW_PRIVS");
    Ok(())
}

pub fn check_no_new_privs() -> Result<bool> {
    // SAFETY: prctl(PR_GET_NO_NEW_PRIVS) takes no pointers.
    let result = unsafe { libc::prctl(PR_GET_NO_NEW_PRIVS, 0, 0, 0, 0) };
    if result < 0 {
        return Err(PrivilegeError::Syscall {
            op: "prctl(PR_GET_NO_NEW_PRIVS)",
            source: Errno::last(),
        });
    }
    Ok(result == 1)
}
