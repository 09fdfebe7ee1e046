//! Disk layout derived from the user config
//!
//! Pure logic, no I/O. The partition, mount, fstab and dry-run simulation
//! code all read device paths and mount points from here so they agree.
//!
//! ```text
//! <drive>1  EFI System Partition (vfat)        → /boot
//! <drive>2  LVM PV → VG <lvm_vg_name>
//!             ├─ LV <lvm_lv_swap_name> (swap)   [if swap_size_gb > 0]
//!             └─ LV <lvm_lv_root_name> (btrfs|ext4, 100%FREE)
//!                  btrfs subvolumes: @root → /, @home → /home,
//!                  @var → /var, @snapshots → /.snapshots
//! ```

use crate::config::{UserConfig, keys};
use crate::error::{InstallError, Result};
use crate::types::RootFilesystem;

/// One filesystem mounted under the target root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Absolute path inside the installed system ("/", "/home", "/boot")
    pub target: String,
    pub source: String,
    pub fstype: &'static str,
    /// Options passed to `mount -o`
    pub options: Option<String>,
}

/// Resolved device paths and mount plan
#[derive(Debug, Clone, PartialEq)]
pub struct DiskLayout {
    pub drive: String,
    pub efi_size: String,
    pub swap_size_gb: f64,
    pub vg_name: String,
    pub root_lv_name: String,
    pub swap_lv_name: String,
    pub filesystem: RootFilesystem,
    pub btrfs_options: String,
    pub subvol_root: String,
    pub subvol_home: String,
    pub subvol_var: String,
    pub subvol_snapshots: String,
}

impl DiskLayout {
    /// Build the layout from config.
    ///
    /// # Errors
    ///
    /// Fails if no target drive is set or the root filesystem is unknown.
    pub fn from_config(config: &UserConfig) -> Result<Self> {
        if !config.has_target_drive() {
            return Err(InstallError::config("Target drive is not set"));
        }
        Ok(Self {
            drive: config.target_drive(),
            efi_size: config.text(keys::EFI_PARTITION_SIZE),
            swap_size_gb: config.swap_size_gb(),
            vg_name: config.text(keys::LVM_VG_NAME),
            root_lv_name: config.text(keys::LVM_LV_ROOT_NAME),
            swap_lv_name: config.text(keys::LVM_LV_SWAP_NAME),
            filesystem: config.root_filesystem()?,
            btrfs_options: config.text(keys::BTRFS_MOUNT_OPTIONS),
            subvol_root: config.text(keys::BTRFS_SUBVOL_ROOT),
            subvol_home: config.text(keys::BTRFS_SUBVOL_HOME),
            subvol_var: config.text(keys::BTRFS_SUBVOL_VAR),
            subvol_snapshots: config.text(keys::BTRFS_SUBVOL_SNAPSHOTS),
        })
    }

    pub fn efi_partition(&self) -> String {
        partition_path(&self.drive, 1)
    }

    pub fn lvm_partition(&self) -> String {
        partition_path(&self.drive, 2)
    }

    pub fn root_device(&self) -> String {
        format!("/dev/{}/{}", self.vg_name, self.root_lv_name)
    }

    pub fn has_swap(&self) -> bool {
        self.swap_size_gb > 0.0
    }

    /// Swap LV path, when swap is configured
    pub fn swap_device(&self) -> Option<String> {
        self.has_swap()
            .then(|| format!("/dev/{}/{}", self.vg_name, self.swap_lv_name))
    }

    /// Size argument for `lvcreate -L`
    pub fn swap_size_arg(&self) -> String {
        format!("{}G", self.swap_size_gb)
    }

    /// Device-mapper name as `findmnt` and `lsblk` report it
    pub fn mapper_name(&self, lv: &str) -> String {
        format!("{}-{}", self.vg_name.replace('-', "--"), lv.replace('-', "--"))
    }

    /// btrfs subvolumes to create, with their mount targets
    pub fn subvolumes(&self) -> Vec<(&str, &'static str)> {
        if !self.filesystem.uses_subvolumes() {
            return Vec::new();
        }
        vec![
            (self.subvol_root.as_str(), "/"),
            (self.subvol_home.as_str(), "/home"),
            (self.subvol_var.as_str(), "/var"),
            (self.subvol_snapshots.as_str(), "/.snapshots"),
        ]
    }

    /// Mounts in the order they must be performed (parents first)
    pub fn mounts(&self) -> Vec<MountSpec> {
        let root = self.root_device();
        let fstype = self.filesystem.to_string_static();
        let mut mounts: Vec<MountSpec> = match self.filesystem {
            RootFilesystem::Btrfs => self
                .subvolumes()
                .into_iter()
                .map(|(subvol, target)| MountSpec {
                    target: target.to_string(),
                    source: root.clone(),
                    fstype,
                    options: Some(self.btrfs_mount_options(subvol)),
                })
                .collect(),
            RootFilesystem::Ext4 => vec![MountSpec {
                target: "/".to_string(),
                source: root.clone(),
                fstype,
                options: None,
            }],
        };
        mounts.push(MountSpec {
            target: "/boot".to_string(),
            source: self.efi_partition(),
            fstype: "vfat",
            options: None,
        });
        mounts
    }

    /// `subvol=/<name>` plus the configured btrfs options
    pub fn btrfs_mount_options(&self, subvol: &str) -> String {
        if self.btrfs_options.trim().is_empty() {
            format!("subvol=/{}", subvol)
        } else {
            format!("subvol=/{},{}", subvol, self.btrfs_options)
        }
    }

    /// Human-readable summary for the confirmation screen
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("  {}  EFI System Partition ({}, vfat) → /boot", self.efi_partition(), self.efi_size),
            format!("  {}  LVM physical volume → VG {}", self.lvm_partition(), self.vg_name),
        ];
        if let Some(swap) = self.swap_device() {
            lines.push(format!("    {}  swap ({})", swap, self.swap_size_arg()));
        } else {
            lines.push("    no disk swap (ZRAM only)".to_string());
        }
        lines.push(format!("    {}  {} (100%FREE)", self.root_device(), self.filesystem));
        for (subvol, target) in self.subvolumes() {
            lines.push(format!("      subvolume {} → {}", subvol, target));
        }
        lines.join("\n")
    }
}

/// Partition device path for a disk.
///
/// Disks whose name ends in a digit (`nvme0n1`, `mmcblk0`, `loop0`) get a `p`
/// separator: `/dev/sda` → `/dev/sda1`, `/dev/nvme0n1` → `/dev/nvme0n1p1`.
pub fn partition_path(disk: &str, number: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, number)
    } else {
        format!("{}{}", disk, number)
    }
}
