//! Simulated command output for dry runs
//!
//! Destructive commands never execute in dry-run mode, yet later steps still
//! probe the target (lsblk, findmnt, swapon, pacman -Q) and parse what comes
//! back. Each probe tags its [`CommandSpec`](crate::command::CommandSpec)
//! with an [`Operation`]; the runner asks a [`DryRunOutputs`] provider for the
//! stdout that operation would have produced on a freshly installed system.

use crate::config::UserConfig;
use crate::layout::DiskLayout;
use std::fmt::Write as _;

/// Fixed UUID reported for the root LV during dry runs
pub const SIMULATED_ROOT_UUID: &str = "0d1e2f3a-4b5c-4d6e-8f70-81a2b3c4d5e6";

/// Fixed UUID reported for the EFI partition during dry runs
pub const SIMULATED_EFI_UUID: &str = "A1B2-C3D4";

/// Logical meaning of a captured command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `lsblk -dnpo NAME,SIZE,MODEL`
    ListBlockDevices,
    /// `lsblk -fno FSTYPE <device>`
    ListFilesystems { device: String },
    /// `findmnt --real --noheadings --output=TARGET,SOURCE,FSTYPE,OPTIONS`
    FindMounts,
    /// `findmnt -no SOURCE <target>`: empty means not mounted
    FindMount { target: String },
    /// `swapon --show=NAME --noheadings`
    ShowSwap,
    /// `arch-chroot /mnt pacman -Q <package>`
    QueryPackage { package: String },
    /// `genfstab -U /mnt`
    GenerateFstab,
    /// `findmnt -no UUID /mnt`
    RootUuid,
}

/// Source of synthetic stdout for dry-run commands
pub trait DryRunOutputs: Send + Sync {
    /// Stdout for `op` given the current config; `None` falls back to a
    /// generic placeholder.
    fn output_for(&self, op: &Operation, config: &UserConfig) -> Option<String>;
}

/// Placeholder used when no operation-specific output exists
pub fn placeholder_output(command: &str) -> String {
    format!("[DRY RUN SIMULATED OUTPUT FOR: {}]", command)
}

/// Answers probes as if every earlier step had succeeded on the configured drive
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSystem;

impl DryRunOutputs for SimulatedSystem {
    fn output_for(&self, op: &Operation, config: &UserConfig) -> Option<String> {
        match op {
            Operation::ListBlockDevices => Some("/dev/sdX 64G DRY-RUN-DISK\n".to_string()),
            Operation::FindMount { .. } => Some(String::new()),
            Operation::QueryPackage { package } => Some(format!("{} 1.0-1\n", package)),
            Operation::RootUuid => Some(format!("{}\n", SIMULATED_ROOT_UUID)),
            Operation::ListFilesystems { device } => {
                let layout = DiskLayout::from_config(config).ok()?;
                filesystem_type(&layout, device).map(|fs| format!("{}\n", fs))
            }
            Operation::FindMounts => {
                let layout = DiskLayout::from_config(config).ok()?;
                Some(find_mounts(&layout))
            }
            Operation::ShowSwap => {
                let layout = DiskLayout::from_config(config).ok()?;
                Some(if layout.has_swap() { "/dev/dm-1\n".to_string() } else { String::new() })
            }
            Operation::GenerateFstab => {
                let layout = DiskLayout::from_config(config).ok()?;
                Some(generate_fstab(&layout))
            }
        }
    }
}

fn filesystem_type(layout: &DiskLayout, device: &str) -> Option<&'static str> {
    if device == layout.efi_partition() {
        Some("vfat")
    } else if device == layout.lvm_partition() {
        Some("LVM2_member")
    } else if device == layout.root_device() {
        Some(layout.filesystem.to_string_static())
    } else if layout.swap_device().as_deref() == Some(device) {
        Some("swap")
    } else {
        None
    }
}

/// `findmnt` rows for every planned mount under `/mnt`
fn find_mounts(layout: &DiskLayout) -> String {
    let root_mapper = format!("/dev/mapper/{}", layout.mapper_name(&layout.root_lv_name));
    let mut out = String::new();
    for mount in layout.mounts() {
        let target = mnt_path(&mount.target);
        let (source, options) = match (mount.fstype, &mount.options) {
            ("vfat", _) => (
                mount.source.clone(),
                "rw,relatime,fmask=0022,dmask=0022,codepage=437,iocharset=ascii".to_string(),
            ),
            ("btrfs", Some(opts)) => {
                let subvol = opts
                    .split(',')
                    .find_map(|o| o.strip_prefix("subvol="))
                    .unwrap_or("/");
                (format!("{}[{}]", root_mapper, subvol), format!("rw,{}", opts))
            }
            _ => (root_mapper.clone(), "rw,relatime".to_string()),
        };
        let _ = writeln!(out, "{} {} {} {}", target, source, mount.fstype, options);
    }
    out
}

/// fstab that `genfstab -U` would print for the planned layout
fn generate_fstab(layout: &DiskLayout) -> String {
    let mut out = String::from("# Static information about the filesystems.\n");
    for mount in layout.mounts() {
        let _ = writeln!(out, "# {}", mount.source);
        let (uuid, options, pass) = if mount.fstype == "vfat" {
            (SIMULATED_EFI_UUID, "rw,relatime,fmask=0022,dmask=0022".to_string(), 2)
        } else {
            let options = match &mount.options {
                Some(opts) => format!("rw,{}", opts),
                None => "rw,relatime".to_string(),
            };
            let pass = if mount.target == "/" { 1 } else { 2 };
            (SIMULATED_ROOT_UUID, options, if mount.fstype == "btrfs" { 0 } else { pass })
        };
        let _ = writeln!(
            out,
            "UUID={}\t{}\t{}\t{}\t0 {}\n",
            uuid, mount.target, mount.fstype, options, pass
        );
    }
    if let Some(swap) = layout.swap_device() {
        let _ = writeln!(out, "# {}", swap);
        let _ = writeln!(out, "{}\tnone\tswap\tdefaults\t0 0", swap);
    }
    out
}

/// `/` → `/mnt`, `/home` → `/mnt/home`
fn mnt_path(target: &str) -> String {
    if target == "/" {
        "/mnt".to_string()
    } else {
        format!("/mnt{}", target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;

    fn config(fs: &str, swap: &str) -> UserConfig {
        let mut config = UserConfig::default();
        config.set(keys::TARGET_DRIVE, "/dev/nvme0n1");
        config.set(keys::ROOT_FILESYSTEM, fs);
        config.set(keys::SWAP_SIZE_GB, swap);
        config
    }

    #[test]
    fn test_placeholder_format() {
        assert_eq!(
            placeholder_output("echo hi"),
            "[DRY RUN SIMULATED OUTPUT FOR: echo hi]"
        );
    }

    #[test]
    fn test_filesystem_types_follow_layout() {
        let c = config("btrfs", "4");
        let ask = |device: &str| {
            SimulatedSystem.output_for(
                &Operation::ListFilesystems { device: device.to_string() },
                &c,
            )
        };
        assert_eq!(ask("/dev/nvme0n1p1").as_deref(), Some("vfat\n"));
        assert_eq!(ask("/dev/nvme0n1p2").as_deref(), Some("LVM2_member\n"));
        assert_eq!(ask("/dev/vg_arch/lv_root").as_deref(), Some("btrfs\n"));
        assert_eq!(ask("/dev/vg_arch/lv_swap").as_deref(), Some("swap\n"));
        assert_eq!(ask("/dev/other"), None);
    }

    #[test]
    fn test_find_mounts_lists_every_planned_target() {
        let out = SimulatedSystem
            .output_for(&Operation::FindMounts, &config("btrfs", "4"))
            .unwrap();
        let targets: Vec<&str> = out.lines().filter_map(|l| l.split_whitespace().next()).collect();
        assert_eq!(targets, vec!["/mnt", "/mnt/home", "/mnt/var", "/mnt/.snapshots", "/mnt/boot"]);
        assert!(out.contains("/dev/mapper/vg_arch-lv_root[/@root] btrfs"));
        assert!(out.contains("/mnt/boot /dev/nvme0n1p1 vfat"));
    }

    #[test]
    fn test_show_swap_empty_without_swap() {
        let out = SimulatedSystem
            .output_for(&Operation::ShowSwap, &config("ext4", "0"))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_fstab_root_line() {
        let out = SimulatedSystem
            .output_for(&Operation::GenerateFstab, &config("ext4", "0"))
            .unwrap();
        let root = out
            .lines()
            .find(|l| l.split_whitespace().nth(1) == Some("/"))
            .expect("root line");
        assert!(root.starts_with(&format!("UUID={}", SIMULATED_ROOT_UUID)));
        assert!(root.contains("ext4"));
    }

    #[test]
    fn test_layout_dependent_ops_need_a_drive() {
        let c = UserConfig::default();
        assert_eq!(SimulatedSystem.output_for(&Operation::FindMounts, &c), None);
        assert!(SimulatedSystem.output_for(&Operation::RootUuid, &c).is_some());
    }
}
