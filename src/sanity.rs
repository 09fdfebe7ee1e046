//! Pre-flight checks before any step runs
//!
//! - running as root (EUID 0)
//! - required binaries are on `PATH`
//! - booted in UEFI mode (systemd-boot needs it)
//!
//! Live runs fail on any problem. Dry runs only warn, so an install can be
//! previewed on a machine that is not the target.

use crate::error::{InstallError, Result};
use crate::hardware::{self, FirmwareMode};
use crate::ui;
use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, info};

/// Binaries the live install cannot proceed without
pub const REQUIRED_BINARIES: &[&str] = &[
    "sgdisk",
    "wipefs",
    "pvcreate",
    "lvcreate",
    "mkfs.fat",
    "pacstrap",
    "genfstab",
    "arch-chroot",
    "lsblk",
    "findmnt",
];

/// Result of environment verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityReport {
    pub missing_binaries: Vec<String>,
    pub firmware: FirmwareMode,
}

impl SanityReport {
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.firmware.is_uefi()
    }
}

/// Returns true if running as root
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Look for an executable `name` in a `PATH`-style list
pub fn binary_in_path(name: &str, path_var: &str) -> bool {
    env::split_paths(path_var).any(|dir| is_executable(&dir.join(name)))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Check binaries against `path_var` and firmware against the live sysfs
pub fn verify_environment(path_var: &str) -> SanityReport {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|bin| !binary_in_path(bin, path_var))
        .map(|bin| (*bin).to_string())
        .collect();

    SanityReport {
        missing_binaries,
        firmware: hardware::detect_firmware_mode(),
    }
}

/// Map binary names to their Arch Linux package names
pub fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "sgdisk" => "gptfdisk",
        "wipefs" | "lsblk" | "findmnt" => "util-linux",
        "pvcreate" | "lvcreate" => "lvm2",
        "mkfs.fat" => "dosfstools",
        "pacstrap" | "genfstab" | "arch-chroot" => "arch-install-scripts",
        _ => "unknown",
    }
}

/// Report problems; fail in live mode, warn in dry runs.
///
/// # Errors
///
/// [`InstallError::Config`] when a live run would break on missing tools or BIOS firmware.
pub fn check_report(report: &SanityReport, dry_run: bool) -> Result<()> {
    if report.is_ok() {
        info!("Pre-flight checks passed");
        return Ok(());
    }

    let notify = |msg: &str| if dry_run { ui::warn(msg) } else { ui::error(msg) };

    if !report.missing_binaries.is_empty() {
        notify(&format!(
            "Missing required binaries: {}",
            report.missing_binaries.join(", ")
        ));
        let mut packages: Vec<&str> = report
            .missing_binaries
            .iter()
            .map(|b| package_for_binary(b))
            .collect();
        packages.dedup();
        ui::info(&format!("Install them with: pacman -S {}", packages.join(" ")));
    }

    if !report.firmware.is_uefi() {
        notify("System is booted in BIOS mode; systemd-boot requires UEFI");
    }

    if dry_run {
        debug!("dry run: continuing despite failed pre-flight checks");
        Ok(())
    } else {
        Err(InstallError::config("Pre-flight checks failed"))
    }
}

/// Run every pre-flight check against the live system
pub fn run_preflight_checks(dry_run: bool) -> Result<()> {
    debug!("Running pre-flight sanity checks...");
    let path_var = env::var("PATH").unwrap_or_default();
    check_report(&verify_environment(&path_var), dry_run)
}
