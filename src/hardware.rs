//! Hardware environment detection
//!
//! Firmware mode (UEFI vs BIOS) and network connectivity, without shelling out.
//! systemd-boot needs UEFI; pacstrap needs the network.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Host probed for connectivity
pub const CONNECTIVITY_HOST: &str = "archlinux.org";
pub const CONNECTIVITY_PORT: u16 = 443;

/// Detected firmware mode of the system.
///
/// `/sys/firmware/efi` exists only when the kernel was booted by UEFI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    Uefi,
    Bios,
}

impl FirmwareMode {
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// Network connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// TCP connection to archlinux.org:443 succeeded
    Online,
    Offline,
}

impl NetworkState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Firmware mode from the live system's sysfs
pub fn detect_firmware_mode() -> FirmwareMode {
    detect_firmware_mode_at(Path::new("/sys/firmware/efi"))
}

/// Firmware mode given the path of the EFI sysfs directory
pub fn detect_firmware_mode_at(efi_dir: &Path) -> FirmwareMode {
    if efi_dir.is_dir() {
        info!("UEFI firmware detected ({} exists)", efi_dir.display());
        FirmwareMode::Uefi
    } else {
        info!("BIOS firmware detected ({} not found)", efi_dir.display());
        FirmwareMode::Bios
    }
}

/// TCP connect to archlinux.org:443 with a 5 second timeout
pub fn detect_internet() -> NetworkState {
    probe_tcp(CONNECTIVITY_HOST, CONNECTIVITY_PORT, Duration::from_secs(5))
}

/// Online if any resolved address of `host:port` accepts a TCP connection
pub fn probe_tcp(host: &str, port: u16, timeout: Duration) -> NetworkState {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            warn!("Could not resolve {}: {}", host, e);
            return NetworkState::Offline;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => {
                info!("Network connectivity confirmed (TCP to {}:{})", host, port);
                return NetworkState::Online;
            }
            Err(e) => warn!("TCP connect to {} failed: {}", addr, e),
        }
    }
    NetworkState::Offline
}
