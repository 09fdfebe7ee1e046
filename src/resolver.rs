//! Package & service resolver
//!
//! Translates config choices into concrete package names for pacstrap and
//! systemd units for the chroot script. Pure logic, no I/O.
//!
//! | Config key                    | Resolved to                       |
//! |-------------------------------|-----------------------------------|
//! | `kernel`                      | kernel + `<kernel>-headers`       |
//! | `microcode`                   | microcode package (if set)        |
//! | `root_filesystem`             | filesystem tools                  |
//! | `desktop`                     | desktop packages and services     |
//! | `default_monospace_font_pkg`  | font package                      |
//! | `extra_packages`              | appended as-is                    |

use crate::config::{UserConfig, keys};
use crate::error::Result;

/// Always installed into the target
pub const BASE_PACKAGES: &[&str] = &[
    "base",
    "base-devel",
    "systemd",
    "linux-firmware",
    "sof-firmware",
    "mkinitcpio",
    "efibootmgr",
    "lvm2",
    "networkmanager",
    "openssh",
    "sudo",
    "neovim",
    "gnupg",
    "git",
    "go",
    "curl",
    "zram-generator",
];

/// Installed on the live ISO before partitioning
pub const INSTALLER_TOOLS: &[&str] = &[
    "gptfdisk",
    "dosfstools",
    "lvm2",
    "btrfs-progs",
    "e2fsprogs",
    "arch-install-scripts",
];

/// Every package pacstrap installs, deduplicated and sorted
pub fn resolve_packages(config: &UserConfig) -> Result<Vec<String>> {
    let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();

    let kernel = config.text(keys::KERNEL);
    packages.push(format!("{}-headers", kernel));
    packages.push(kernel);

    let microcode = config.text(keys::MICROCODE);
    if !microcode.trim().is_empty() {
        packages.push(microcode);
    }

    packages.extend(config.root_filesystem()?.packages().iter().map(|p| p.to_string()));
    packages.extend(config.desktop()?.packages().iter().map(|p| p.to_string()));

    let font = config.text(keys::MONOSPACE_FONT_PKG);
    if !font.trim().is_empty() {
        packages.push(font);
    }

    packages.extend(config.extra_packages());

    packages.sort();
    packages.dedup();
    Ok(packages)
}

/// systemd units enabled in the chroot, deduplicated and sorted
pub fn resolve_services(config: &UserConfig) -> Result<Vec<String>> {
    let mut services = vec![
        "NetworkManager.service".to_string(),
        "fstrim.timer".to_string(),
    ];
    services.extend(config.desktop()?.services().iter().map(|s| s.to_string()));
    services.sort();
    services.dedup();
    Ok(services)
}
