//! Ordered identity switch: resolve user -> groups + gid -> uid.
//!
//! There is no rollback. If the user stage fails after the group stage
//! succeeded, the process is half-switched and the caller must terminate.

use super::validation::validate_ids;
use crate::config::types::{PrivilegeError, Result, SwitchStage};
use crate::kernel::capabilities::{Capability, PrivilegeBackend};
use crate::kernel::syscalls::{syscall_error, BracketedSyscalls, JailSyscalls, Requirement};
use crate::observability::DiagnosticKind;
use nix::unistd::Uid;

fn stage_error(uid: u32, stage: SwitchStage) -> impl FnOnce(PrivilegeError) -> PrivilegeError {
    move |err| {
        if err.is_internal() {
            err
        } else {
            PrivilegeError::IdentitySwitch {
                uid,
                stage,
                source: Box::new(err),
            }
        }
    }
}

/// Switch the real and effective ids to `target` and its primary group.
///
/// Every failure is fatal. An unknown uid, or root as the target user or
/// primary group, fails before any id is changed.
pub fn switch_identity<B, S>(ops: &mut BracketedSyscalls<'_, B, S>, target: Uid) -> Result<()>
where
    B: PrivilegeBackend,
    S: JailSyscalls,
{
    let uid = target.as_raw();
    let user = ops
        .syscalls()
        .lookup_user(target)
        .map_err(syscall_error("getpwuid"))
        .map_err(stage_error(uid, SwitchStage::Group))?
        .ok_or(PrivilegeError::UnknownUser(uid))?;
    validate_ids(uid, user.gid.as_raw())?;

    // CRITICAL: groups and gid before uid
    ops.privileged(
        Capability::Setgid,
        Requirement::Optional(DiagnosticKind::MissingSetgid),
        |sys| {
            sys.init_groups(&user.name, user.gid)
                .map_err(syscall_error("initgroups"))?;
            sys.set_real_effective_gid(user.gid)
                .map_err(syscall_error("setregid"))
        },
    )
    .map_err(stage_error(uid, SwitchStage::Group))?;
    log::info!("Set GID to {} for {:?}", user.gid, user.name);

    // Leaving uid 0 would otherwise empty the permitted set, and the bracket
    // could not return to the baseline.
    ops.syscalls()
        .keep_capabilities(true)
        .map_err(syscall_error("prctl(PR_SET_KEEPCAPS)"))
        .map_err(stage_error(uid, SwitchStage::User))?;

    ops.privileged(
        Capability::Setuid,
        Requirement::Optional(DiagnosticKind::MissingSetuid),
        |sys| {
            sys.set_real_effective_uid(target)
                .map_err(syscall_error("setreuid"))
        },
    )
    .map_err(stage_error(uid, SwitchStage::User))?;
    log::info!("Set UID to {}", uid);

    ops.syscalls()
        .keep_capabilities(false)
        .map_err(syscall_error("prctl(PR_SET_KEEPCAPS)"))
        .map_err(stage_error(uid, SwitchStage::User))?;

    Ok(())
}
