//! User configuration
//!
//! A flat map of string keys to scalar values. It is filled with documented
//! defaults, edited by the gather-config step and stored verbatim in the
//! progress file so a resumed run sees exactly the same choices.
//!
//! | key                        | default                                  |
//! |----------------------------|------------------------------------------|
//! | `username`                 | `arch`                                   |
//! | `hostname`                 | `archlinux`                              |
//! | `timezone`                 | `UTC`                                    |
//! | `locale_lang`              | `en_US.UTF-8`                            |
//! | `locale_gen`               | `en_US.UTF-8 UTF-8`                      |
//! | `vconsole_keymap`          | `us`                                     |
//! | `target_drive`             | empty (set by gather_config)             |
//! | `efi_partition_size`       | `1G`                                     |
//! | `swap_size_gb`             | `4`                                      |
//! | `zram_fraction`            | `0.5`                                    |
//! | `lvm_vg_name`              | `vg_arch`                                |
//! | `lvm_lv_root_name`         | `lv_root`                                |
//! | `lvm_lv_swap_name`         | `lv_swap`                                |
//! | `root_filesystem`          | `btrfs`                                  |
//! | `btrfs_subvol_root`        | `@root`                                  |
//! | `btrfs_subvol_home`        | `@home`                                  |
//! | `btrfs_subvol_var`         | `@var`                                   |
//! | `btrfs_subvol_snapshots`   | `@snapshots`                             |
//! | `btrfs_mount_options`      | `compress=zstd,ssd,noatime,discard=async`|
//! | `kernel`                   | `linux`                                  |
//! | `microcode`                | `intel-ucode`                            |
//! | `cpu_march`                | `x86-64`                                 |
//! | `desktop`                  | `gnome`                                  |
//! | `default_monospace_font_pkg` | `ttf-sourcecodepro-nerd`               |
//! | `extra_packages`           | empty                                    |
//! | `add_chaotic_aur`          | `false`                                  |
//! | `ssh_key_email`            | empty (skip SSH key)                     |
//! | `gpg_key_name`             | empty                                    |
//! | `gpg_key_email`            | empty (skip GPG key)                     |

use crate::error::{InstallError, Result};
use crate::types::{Desktop, RootFilesystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known config keys
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const HOSTNAME: &str = "hostname";
    pub const TIMEZONE: &str = "timezone";
    pub const LOCALE_LANG: &str = "locale_lang";
    pub const LOCALE_GEN: &str = "locale_gen";
    pub const VCONSOLE_KEYMAP: &str = "vconsole_keymap";
    pub const TARGET_DRIVE: &str = "target_drive";
    pub const EFI_PARTITION_SIZE: &str = "efi_partition_size";
    pub const SWAP_SIZE_GB: &str = "swap_size_gb";
    pub const ZRAM_FRACTION: &str = "zram_fraction";
    pub const LVM_VG_NAME: &str = "lvm_vg_name";
    pub const LVM_LV_ROOT_NAME: &str = "lvm_lv_root_name";
    pub const LVM_LV_SWAP_NAME: &str = "lvm_lv_swap_name";
    pub const ROOT_FILESYSTEM: &str = "root_filesystem";
    pub const BTRFS_SUBVOL_ROOT: &str = "btrfs_subvol_root";
    pub const BTRFS_SUBVOL_HOME: &str = "btrfs_subvol_home";
    pub const BTRFS_SUBVOL_VAR: &str = "btrfs_subvol_var";
    pub const BTRFS_SUBVOL_SNAPSHOTS: &str = "btrfs_subvol_snapshots";
    pub const BTRFS_MOUNT_OPTIONS: &str = "btrfs_mount_options";
    pub const KERNEL: &str = "kernel";
    pub const MICROCODE: &str = "microcode";
    pub const CPU_MARCH: &str = "cpu_march";
    pub const DESKTOP: &str = "desktop";
    pub const MONOSPACE_FONT_PKG: &str = "default_monospace_font_pkg";
    pub const EXTRA_PACKAGES: &str = "extra_packages";
    pub const ADD_CHAOTIC_AUR: &str = "add_chaotic_aur";
    pub const SSH_KEY_EMAIL: &str = "ssh_key_email";
    pub const GPG_KEY_NAME: &str = "gpg_key_name";
    pub const GPG_KEY_EMAIL: &str = "gpg_key_email";
}

/// One scalar config value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    /// Truthiness as the chroot script sees it
    pub fn as_flag(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        }
    }

    /// Numeric value, parsing text when needed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(_) => None,
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Booleans render lower-case so shell tests like `[ "$X" = "true" ]` work.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Flat installer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserConfig(BTreeMap<String, ConfigValue>);

impl Default for UserConfig {
    fn default() -> Self {
        let defaults: [(&str, ConfigValue); 29] = [
            (keys::USERNAME, "arch".into()),
            (keys::HOSTNAME, "archlinux".into()),
            (keys::TIMEZONE, "UTC".into()),
            (keys::LOCALE_LANG, "en_US.UTF-8".into()),
            (keys::LOCALE_GEN, "en_US.UTF-8 UTF-8".into()),
            (keys::VCONSOLE_KEYMAP, "us".into()),
            (keys::TARGET_DRIVE, "".into()),
            (keys::EFI_PARTITION_SIZE, "1G".into()),
            (keys::SWAP_SIZE_GB, "4".into()),
            (keys::ZRAM_FRACTION, "0.5".into()),
            (keys::LVM_VG_NAME, "vg_arch".into()),
            (keys::LVM_LV_ROOT_NAME, "lv_root".into()),
            (keys::LVM_LV_SWAP_NAME, "lv_swap".into()),
            (keys::ROOT_FILESYSTEM, "btrfs".into()),
            (keys::BTRFS_SUBVOL_ROOT, "@root".into()),
            (keys::BTRFS_SUBVOL_HOME, "@home".into()),
            (keys::BTRFS_SUBVOL_VAR, "@var".into()),
            (keys::BTRFS_SUBVOL_SNAPSHOTS, "@snapshots".into()),
            (
                keys::BTRFS_MOUNT_OPTIONS,
                "compress=zstd,ssd,noatime,discard=async".into(),
            ),
            (keys::KERNEL, "linux".into()),
            (keys::MICROCODE, "intel-ucode".into()),
            (keys::CPU_MARCH, "x86-64".into()),
            (keys::DESKTOP, "gnome".into()),
            (keys::MONOSPACE_FONT_PKG, "ttf-sourcecodepro-nerd".into()),
            (keys::EXTRA_PACKAGES, "".into()),
            (keys::ADD_CHAOTIC_AUR, false.into()),
            (keys::SSH_KEY_EMAIL, "".into()),
            (keys::GPG_KEY_NAME, "".into()),
            (keys::GPG_KEY_EMAIL, "".into()),
        ];

        Self(
            defaults
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl UserConfig {
    /// Config with documented defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with exactly these entries and no defaults
    pub fn from_entries(entries: BTreeMap<String, ConfigValue>) -> Self {
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Rendered value, empty when the key is absent
    pub fn text(&self, key: &str) -> String {
        self.0.get(key).map(ToString::to_string).unwrap_or_default()
    }

    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(ConfigValue::as_flag)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(ConfigValue::as_number)
    }

    /// Overlay `other` on top of this config, key by key
    pub fn merge(&mut self, other: UserConfig) {
        self.0.extend(other.0);
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns true if a target drive has been chosen
    pub fn has_target_drive(&self) -> bool {
        !self.text(keys::TARGET_DRIVE).trim().is_empty()
    }

    pub fn target_drive(&self) -> String {
        self.text(keys::TARGET_DRIVE)
    }

    /// Swap size in GiB; unparsable values count as no swap
    pub fn swap_size_gb(&self) -> f64 {
        self.number(keys::SWAP_SIZE_GB).unwrap_or(0.0)
    }

    pub fn root_filesystem(&self) -> Result<RootFilesystem> {
        let raw = self.text(keys::ROOT_FILESYSTEM);
        raw.parse()
            .map_err(|_| InstallError::config(format!("Unknown root filesystem '{}'", raw)))
    }

    pub fn desktop(&self) -> Result<Desktop> {
        let raw = self.text(keys::DESKTOP);
        raw.parse()
            .map_err(|_| InstallError::config(format!("Unknown desktop '{}'", raw)))
    }

    /// Whitespace-separated `extra_packages`
    pub fn extra_packages(&self) -> Vec<String> {
        self.text(keys::EXTRA_PACKAGES)
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_name("Hostname", &self.text(keys::HOSTNAME), '-')?;
        validate_name("Username", &self.text(keys::USERNAME), '_')?;

        let swap = self
            .number(keys::SWAP_SIZE_GB)
            .ok_or_else(|| InstallError::config("Swap size must be a number of GiB"))?;
        if !swap.is_finite() {
            return Err(InstallError::config("Swap size must be a finite number of GiB"));
        }
        if swap < 0.0 {
            return Err(InstallError::config("Swap size cannot be negative"));
        }

        let zram = self
            .number(keys::ZRAM_FRACTION)
            .ok_or_else(|| InstallError::config("ZRAM fraction must be a number"))?;
        if !zram.is_finite() || zram <= 0.0 || zram > 1.0 {
            return Err(InstallError::config("ZRAM fraction must be in (0, 1]"));
        }

        if self.text(keys::LVM_VG_NAME).trim().is_empty() {
            return Err(InstallError::config("LVM volume group name must be specified"));
        }
        if self.text(keys::KERNEL).trim().is_empty() {
            return Err(InstallError::config("Kernel package must be specified"));
        }

        self.root_filesystem()?;
        self.desktop()?;

        Ok(())
    }
}

/// 3-32 chars, starts with a letter, then letters, digits and `extra`
fn validate_name(label: &str, value: &str, extra: char) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InstallError::config(format!("{} must be specified", label)));
    }
    if value.len() < 3 || value.len() > 32 {
        return Err(InstallError::config(format!(
            "{} must be 3-32 characters long",
            label
        )));
    }
    if !value.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(InstallError::config(format!(
            "{} must start with a letter",
            label
        )));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == extra) {
        return Err(InstallError::config(format!(
            "{} can only contain letters, numbers, and '{}'",
            label, extra
        )));
    }
    Ok(())
}
