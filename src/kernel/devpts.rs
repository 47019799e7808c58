//! Private devpts instance for the jail.
//!
//! Expects to run inside the jail's own mount namespace. Prefers binding the
//! new instance's ptmx over /dev/ptmx; falls back to a device node.

use crate::config::types::Result;
use crate::kernel::capabilities::PrivilegeBackend;
use crate::kernel::syscalls::{BracketedSyscalls, JailSyscalls, MountRequest};
use nix::mount::{MntFlags, MsFlags};
use nix::sys::stat::{makedev, Mode, SFlag};
use nix::unistd::AccessFlags;
use std::path::PathBuf;

const DEV_MAJ_TTY: u64 = 5;
const DEV_MIN_PTMX: u64 = 2;
const DEVPTS_OPTIONS: &str = "newinstance,gid=5,mode=620,ptmxmode=0666";

/// Where the devpts instance and the ptmx multiplexer live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevptsLayout {
    pub pts_dir: PathBuf,
    pub ptmx: PathBuf,
}

impl Default for DevptsLayout {
    fn default() -> Self {
        Self {
            pts_dir: PathBuf::from("/dev/pts"),
            ptmx: PathBuf::from("/dev/ptmx"),
        }
    }
}

/// How /dev/ptmx was provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevptsOutcome {
    /// The new instance's ptmx is bind-mounted over the ptmx path.
    BoundPtmx,
    /// A character device node was created.
    CreatedPtmx,
    /// A ptmx node already existed and was left in place.
    ExistingPtmx,
}

/// Mount a fresh devpts instance and wire up ptmx.
pub fn setup_devpts<B, S>(
    ops: &mut BracketedSyscalls<'_, B, S>,
    layout: &DevptsLayout,
) -> Result<DevptsOutcome>
where
    B: PrivilegeBackend,
    S: JailSyscalls,
{
    // Nothing may be mounted there yet.
    if let Err(err) = ops.unmount(&layout.pts_dir, MntFlags::MNT_DETACH) {
        if err.is_fatal() {
            return Err(err);
        }
        log::debug!("No previous mount on {}: {}", layout.pts_dir.display(), err);
    }

    ops.mount(&MountRequest {
        source: Some("devpts"),
        target: &layout.pts_dir,
        fstype: Some("devpts"),
        flags: MsFlags::empty(),
        data: Some(DEVPTS_OPTIONS),
    })?;

    let instance_ptmx = layout.pts_dir.join("ptmx");
    if ops.syscalls().access(&instance_ptmx, AccessFlags::W_OK).is_ok() {
        let source = instance_ptmx.to_string_lossy();
        ops.mount(&MountRequest::bind(&source, &layout.ptmx))?;
        log::info!("Bound {} over {}", instance_ptmx.display(), layout.ptmx.display());
        return Ok(DevptsOutcome::BoundPtmx);
    }

    log::warn!(
        "Creating {} via mknod: this may allow sandbox escape via TTY on older kernels",
        layout.ptmx.display()
    );
    if ops.syscalls().access(&layout.ptmx, AccessFlags::F_OK).is_ok() {
        return Ok(DevptsOutcome::ExistingPtmx);
    }

    ops.mknod(
        &layout.ptmx,
        SFlag::S_IFCHR,
        Mode::from_bits_truncate(0o666),
        makedev(DEV_MAJ_TTY, DEV_MIN_PTMX),
    )?;
    log::info!("Created {} via mknod", layout.ptmx.display());
    Ok(DevptsOutcome::CreatedPtmx)
}
