//! Configuration loading from a root-owned JSON file.
//!
//! The file is trusted only when root owns it and nobody else can write it.

use super::types::{LauncherConfig, PrivilegeError, Result};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/capjail.json";

const GROUP_OR_OTHER_WRITABLE: u32 = (libc::S_IWGRP | libc::S_IWOTH) as u32;

/// Load the launcher configuration after checking ownership and permissions.
pub fn load<P: AsRef<Path>>(path: P) -> Result<LauncherConfig> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|e| {
        PrivilegeError::Config(format!(
            "Configuration file {} does not exist: {}",
            path.display(),
            e
        ))
    })?;
    check_permissions(path, metadata.uid(), metadata.mode())?;

    let content = fs::read_to_string(path)
        .map_err(|e| PrivilegeError::Config(format!("Failed to read config file: {}", e)))?;
    let config = parse(&content)?;
    log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
    Ok(config)
}

pub(crate) fn check_permissions(path: &Path, owner: u32, mode: u32) -> Result<()> {
    if owner != 0 {
        return Err(PrivilegeError::Config(format!(
            "Configuration file {} is not owned by root",
            path.display()
        )));
    }
    if mode & GROUP_OR_OTHER_WRITABLE != 0 {
        return Err(PrivilegeError::Config(format!(
            "Configuration file {} must only be writable by root",
            path.display()
        )));
    }
    Ok(())
}

pub(crate) fn parse(content: &str) -> Result<LauncherConfig> {
    let config: LauncherConfig = serde_json::from_str(content)
        .map_err(|e| PrivilegeError::Config(format!("Failed to parse configuration file: {}", e)))?;

    // uid 0 is never a valid jail identity.
    if config.min_safe_uid == 0 {
        return Err(PrivilegeError::Config(
            "min_safe_uid must be at least 1".to_string(),
        ));
    }
    if config.min_safe_uid > config.max_safe_uid {
        return Err(PrivilegeError::Config(format!(
            "Empty safe uid range {}-{}",
            config.min_safe_uid, config.max_safe_uid
        )));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_config_error() {
        let path = std::env::temp_dir().join("capjail-does-not-exist.json");
        let err = load(&path).unwrap_err();
        assert!(matches!(err, PrivilegeError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejects_non_root_owner() {
        let err = check_permissions(Path::new("/etc/capjail.json"), 1000, 0o644).unwrap_err();
        assert!(err.to_string().contains("not owned by root"));
    }

    #[test]
    fn rejects_group_and_world_writable() {
        let path = Path::new("/etc/capjail.json");
        assert!(check_permissions(path, 0, 0o664).is_err());
        assert!(check_permissions(path, 0, 0o646).is_err());
        assert!(check_permissions(path, 0, 0o644).is_ok());
        assert!(check_permissions(path, 0, 0o600).is_ok());
    }

    #[test]
    fn parses_permit_flag() {
        let config = parse(r#"{"permit_allow_new_privs": true}"#).unwrap();
        assert!(config.permit_allow_new_privs);
    }

    #[test]
    fn parses_safe_uid_range() {
        let config = parse(r#"{"min_safe_uid": 2000, "max_safe_uid": 2999}"#).unwrap();
        assert_eq!(config.safe_uid_range(), 2000..=2999);
    }

    #[test]
    fn rejects_unsafe_uid_ranges() {
        let err = parse(r#"{"min_safe_uid": 0}"#).unwrap_err();
        assert!(matches!(err, PrivilegeError::Config(_)));
        assert!(parse(r#"{"min_safe_uid": 5000, "max_safe_uid": 4000}"#).is_err());
    }

    #[test]
    fn malformed_value_is_rejected() {
        assert!(parse(r#"{"permit_allow_new_privs": "yes"}"#).is_err());
        assert!(parse("not json").is_err());
    }
}
