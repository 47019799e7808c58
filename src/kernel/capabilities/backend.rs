//! Access to the process capability sets.

use super::{CapabilityMask, CapabilitySets, LINUX_CAPABILITY_VERSION_3};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reads and replaces the permitted/effective/inheritable sets of the process.
pub trait PrivilegeBackend {
    fn read(&self) -> io::Result<CapabilitySets>;
    fn apply(&mut self, sets: &CapabilitySets) -> io::Result<()>;
}

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// The real kernel capability sets, through raw capget(2)/capset(2).
///
/// The effective set is process-wide, so at most one handle exists at a time.
#[derive(Debug)]
pub struct LinuxCapabilities {
    _claim: (),
}

impl LinuxCapabilities {
    /// Claim the process capability sets. Fails if another handle is alive.
    pub fn acquire() -> io::Result<Self> {
        if CLAIMED.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "process capability sets are already owned by another handle",
            ));
        }
        Ok(Self { _claim: () })
    }
}

impl Drop for LinuxCapabilities {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::SeqCst);
    }
}

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

fn join(low: u32, high: u32) -> CapabilityMask {
    CapabilityMask::from_bits(u64::from(low) | (u64::from(high) << 32))
}

fn split(mask: CapabilityMask) -> (u32, u32) {
    let bits = mask.bits();
    (bits as u32, (bits >> 32) as u32)
}

impl PrivilegeBackend for LinuxCapabilities {
    fn read(&self) -> io::Result<CapabilitySets> {
        let mut header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        // Version 3 uses two data entries: caps 0-31 and caps 32-63.
        let mut data = [CapUserData::default(); 2];

        // SAFETY: capget(2) with a version 3 header for the calling thread (pid 0)
        // writes exactly two CapUserData entries into `data`.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_capget,
                &mut header as *mut CapUserHeader,
                data.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(CapabilitySets {
            permitted: join(data[0].permitted, data[1].permitted),
            effective: join(data[0].effective, data[1].effective),
            inheritable: join(data[0].inheritable, data[1].inheritable),
        })
    }

    fn apply(&mut self, sets: &CapabilitySets) -> io::Result<()> {
        let header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let (p_low, p_high) = split(sets.permitted);
        let (e_low, e_high) = split(sets.effective);
        let (i_low, i_high) = split(sets.inheritable);
        let data = [
            CapUserData { effective: e_low, permitted: p_low, inheritable: i_low },
            CapUserData { effective: e_high, permitted: p_high, inheritable: i_high },
        ];

        // SAFETY: capset(2) with a valid version 3 header and two initialized
        // data entries. The kernel only reads through these pointers.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_capset,
                &header as *const CapUserHeader,
                data.as_ptr(),
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
