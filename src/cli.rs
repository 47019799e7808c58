use crate::config::{self, LauncherConfig, PrivilegeError, DEFAULT_CONFIG_PATH};
use crate::kernel::capabilities::{
    check_no_new_privs, compute_baseline, get_capability_status, set_no_new_privs, CapabilityState,
    LinuxCapabilities, PrivilegeBackend,
};
use crate::kernel::credentials::{switch_identity, validate_uid_range};
use crate::kernel::syscalls::{BracketedSyscalls, LinuxSyscalls};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nix::unistd::Uid;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the process capabilities and the baseline capjail would keep
    Status,
    /// Run a command after discarding all privilege
    Run {
        /// Launcher configuration file (must be owned and only writable by root)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Switch to this user id (and its primary group) before executing
        #[arg(long)]
        uid: Option<u32>,
        /// Do not set PR_SET_NO_NEW_PRIVS (must be permitted by the configuration)
        #[arg(long)]
        allow_new_privs: bool,
        /// Command and arguments to execute
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
}

/// Exit status for an error that reached the top of the launcher.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PrivilegeError>().map(i32::from).unwrap_or(1)
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Status => status(),
        Commands::Run {
            config,
            uid,
            allow_new_privs,
            command,
        } => run_command(&config, uid, allow_new_privs, &command),
    }
}

fn status() -> Result<()> {
    println!("{}", get_capability_status()?);

    let backend = LinuxCapabilities::acquire().context("Failed to claim process capabilities")?;
    let current = backend.read().map_err(PrivilegeError::CapabilityRead)?;
    match compute_baseline(&current) {
        Ok(baseline) => println!("Baseline: {}", baseline),
        Err(e) => println!("Baseline: unavailable ({})", e),
    }
    println!("NoNewPrivs: {}", check_no_new_privs()?);
    Ok(())
}

fn to_cstrings(command: &[OsString]) -> Result<Vec<CString>> {
    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .with_context(|| format!("Argument contains a NUL byte: {:?}", arg))
        })
        .collect()
}

/// Reject the request before any privilege is touched.
fn check_request(
    config: &LauncherConfig,
    config_path: &Path,
    uid: Option<u32>,
    allow_new_privs: bool,
) -> Result<()> {
    if allow_new_privs && !config.permit_allow_new_privs {
        bail!(
            "--allow-new-privs is not permitted by {}",
            config_path.display()
        );
    }
    if let Some(uid) = uid {
        validate_uid_range(uid, &config.safe_uid_range())?;
    }
    Ok(())
}

fn run_command(
    config_path: &Path,
    uid: Option<u32>,
    allow_new_privs: bool,
    command: &[OsString],
) -> Result<()> {
    let config = config::load(config_path)?;
    check_request(&config, config_path, uid, allow_new_privs)?;

    // Everything that can fail without privilege is prepared first.
    let argv = to_cstrings(command)?;
    let Some(program) = argv.first() else {
        bail!("missing command");
    };

    let backend = LinuxCapabilities::acquire().context("Failed to claim process capabilities")?;
    let mut caps = CapabilityState::new(backend);
    caps.initialize()?;

    if let Some(uid) = uid {
        let sys = LinuxSyscalls;
        switch_identity(&mut BracketedSyscalls::new(&mut caps, &sys), Uid::from_raw(uid))?;
    }

    caps.drop_forever()?;
    if !allow_new_privs {
        set_no_new_privs()?;
    }

    log::info!("Executing {:?}", command);
    match nix::unistd::execvp(program, &argv) {
        Ok(never) => match never {},
        Err(errno) => Err(anyhow::anyhow!("Failed to execute {:?}: {}", command[0], errno)),
    }
}
