use crate::config::types::{PrivilegeError, Result};
use std::fs;

/// Capability lines (`CapInh`, `CapPrm`, `CapEff`, `CapBnd`, `CapAmb`) from /proc/self/status.
pub fn get_capability_status() -> Result<String> {
    let status = fs::read_to_string("/proc/self/status").map_err(PrivilegeError::CapabilityRead)?;
    Ok(capability_lines(&status))
}

fn capability_lines(status: &str) -> String {
    status
        .lines()
        .filter(|line| line.starts_with("Cap"))
        .collect::<Vec<_>>()
        .join("\n")
}
