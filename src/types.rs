//! Type-safe choices stored in the flat user config
//!
//! The persisted config is a map of plain strings. These enums give the
//! string values a closed set of spellings and exhaustive matching.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Filesystem for the root logical volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum RootFilesystem {
    #[strum(serialize = "ext4")]
    Ext4,
    #[default]
    #[strum(serialize = "btrfs")]
    Btrfs,
}

impl RootFilesystem {
    /// mkfs invocation (program and force flag) for this filesystem
    pub fn mkfs(self) -> (&'static str, &'static str) {
        match self {
            Self::Ext4 => ("mkfs.ext4", "-F"),
            Self::Btrfs => ("mkfs.btrfs", "-f"),
        }
    }

    /// fstype string as reported by `findmnt`/`lsblk`
    pub fn to_string_static(self) -> &'static str {
        match self {
            Self::Ext4 => "ext4",
            Self::Btrfs => "btrfs",
        }
    }

    /// Returns true if the root is split into subvolumes
    pub fn uses_subvolumes(self) -> bool {
        matches!(self, Self::Btrfs)
    }

    /// Packages pacstrap needs for this filesystem
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Ext4 => &["e2fsprogs"],
            Self::Btrfs => &["btrfs-progs"],
        }
    }
}

/// Desktop installed on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Desktop {
    /// Minimal GNOME on Wayland with GDM auto-login
    #[default]
    #[strum(serialize = "gnome")]
    Gnome,
    /// Console only
    #[strum(serialize = "none")]
    Console,
}

impl Desktop {
    /// Packages pacstrap installs for this desktop
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Gnome => &[
                "gdm",
                "gnome-shell",
                "gnome-session",
                "gnome-control-center",
                "gnome-terminal",
                "gnome-keyring",
                "nautilus",
                "xdg-desktop-portal-gnome",
                "pipewire",
                "pipewire-pulse",
                "pipewire-alsa",
                "wireplumber",
                "bluez",
                "bluez-utils",
                "noto-fonts",
                "noto-fonts-emoji",
            ],
            Self::Console => &[],
        }
    }

    /// systemd units enabled inside the chroot
    pub fn services(self) -> &'static [&'static str] {
        match self {
            Self::Gnome => &["gdm.service", "bluetooth.service"],
            Self::Console => &[],
        }
    }

    /// Returns true if a graphical session is installed
    pub fn is_graphical(self) -> bool {
        !matches!(self, Self::Console)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_root_filesystem_from_string() {
        assert_eq!("ext4".parse::<RootFilesystem>().ok(), Some(RootFilesystem::Ext4));
        assert_eq!("btrfs".parse::<RootFilesystem>().ok(), Some(RootFilesystem::Btrfs));
        assert!("xfs".parse::<RootFilesystem>().is_err());
    }

    #[test]
    fn test_only_btrfs_uses_subvolumes() {
        let with_subvols: Vec<RootFilesystem> = RootFilesystem::iter()
            .filter(|fs| fs.uses_subvolumes())
            .collect();
        assert_eq!(with_subvols, vec![RootFilesystem::Btrfs]);
    }

    #[test]
    fn test_mkfs_commands() {
        assert_eq!(RootFilesystem::Ext4.mkfs(), ("mkfs.ext4", "-F"));
        assert_eq!(RootFilesystem::Btrfs.mkfs(), ("mkfs.btrfs", "-f"));
    }

    #[test]
    fn test_desktop_none_has_no_packages_or_services() {
        assert!(Desktop::Console.packages().is_empty());
        assert!(Desktop::Console.services().is_empty());
        assert!(!Desktop::Console.is_graphical());
        assert!(Desktop::Gnome.packages().contains(&"gdm"));
    }
}
