// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Contracts of the collaborators the configurator drives: storage, network,
//! HTTP fetch, image transcoding, flash and board signalling.

use crate::FwResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const MAX_SSID_LENGTH: usize = 34;
pub const MAX_BSSID_LENGTH: usize = 20;
pub const MAX_PASSWORD_LENGTH: usize = 34;
pub const IPV4_ADDRESS_LENGTH: usize = 16;
pub const IPV6_ADDRESS_LENGTH: usize = 40;
/// Scan entries that fit the shared window alongside the magic and count.
pub const MAX_NETWORKS: usize = 72;
pub const SD_FOLDER_LENGTH: usize = 128;

pub const SD_CARD_MOUNTED: u16 = 0;
pub const SD_CARD_NOT_MOUNTED: u16 = 1;
pub const ROMS_FOLDER_OK: u16 = 100;
pub const ROMS_FOLDER_NOTFOUND: u16 = 101;
pub const FLOPPIES_FOLDER_OK: u16 = 200;
pub const FLOPPIES_FOLDER_NOTFOUND: u16 = 201;
pub const HARDDISKS_FOLDER_OK: u16 = 300;
pub const HARDDISKS_FOLDER_NOTFOUND: u16 = 301;

pub const HARDDISKS_FOLDER: &str = "/harddisks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum ConnectionStatus {
    #[default]
    Disconnected = 0,
    Connecting,
    ConnectedWifi,
    ConnectedWifiNoIp,
    ConnectedWifiIp,
    TimeoutError,
    GenericError,
    NoDataError,
    NotPermittedError,
    InvalidArgError,
    IoError,
    BadAuthError,
    ConnectFailedError,
    InsufficientResourcesError,
    NotSupported,
}

impl ConnectionStatus {
    const ALL: [ConnectionStatus; 15] = [
        ConnectionStatus::Disconnected,
        ConnectionStatus::Connecting,
        ConnectionStatus::ConnectedWifi,
        ConnectionStatus::ConnectedWifiNoIp,
        ConnectionStatus::ConnectedWifiIp,
        ConnectionStatus::TimeoutError,
        ConnectionStatus::GenericError,
        ConnectionStatus::NoDataError,
        ConnectionStatus::NotPermittedError,
        ConnectionStatus::InvalidArgError,
        ConnectionStatus::IoError,
        ConnectionStatus::BadAuthError,
        ConnectionStatus::ConnectFailedError,
        ConnectionStatus::InsufficientResourcesError,
        ConnectionStatus::NotSupported,
    ];

    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Error statuses that are retried with the stored credentials.
    pub fn is_retryable(self) -> bool {
        self != ConnectionStatus::BadAuthError
            && (ConnectionStatus::TimeoutError..=ConnectionStatus::InsufficientResourcesError)
                .contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WifiNetworkInfo {
    pub ssid: String,
    pub bssid: String,
    pub auth_mode: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiScanData {
    pub networks: Vec<WifiNetworkInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiNetworkAuthInfo {
    pub ssid: String,
    pub password: String,
    pub auth_mode: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionData {
    pub ssid: String,
    pub ipv4_address: String,
    pub ipv6_address: String,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdCardData {
    pub roms_folder: String,
    pub floppies_folder: String,
    pub harddisks_folder: String,
    pub sd_size: u32,
    pub sd_free_space: u32,
    pub roms_folder_count: u32,
    pub floppies_folder_count: u32,
    pub harddisks_folder_count: u32,
    pub status: u16,
    pub roms_folder_status: u16,
    pub floppies_folder_status: u16,
    pub harddisks_folder_status: u16,
}

/// Capacity of the card in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageUsage {
    pub total_mb: u32,
    pub free_mb: u32,
}

/// One entry of the remote ROM index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomInfo {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size_kb: u32,
}

/// One row of the remote floppy database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FloppyImageInfo {
    pub name: String,
    pub status: String,
    pub description: String,
    pub tags: String,
    pub extra: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloppyGeometry {
    pub tracks: u16,
    pub sectors: u16,
    pub sides: u16,
}

/// Parameters of a blank floppy request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FloppyRequest {
    pub template: u16,
    pub tracks: u16,
    pub sectors: u16,
    pub sides: u16,
    pub overwrite: bool,
    pub volume_name: String,
    pub floppy_name: String,
}

impl FloppyRequest {
    pub fn geometry(&self) -> FloppyGeometry {
        FloppyGeometry {
            tracks: self.tracks,
            sectors: self.sectors,
            sides: self.sides,
        }
    }
}

/// microSD card with a FAT filesystem. Paths are absolute, `/` separated.
pub trait Storage: Send {
    fn mount(&mut self) -> FwResult<()>;
    fn is_mounted(&self) -> bool;
    fn usage(&self) -> FwResult<StorageUsage>;
    fn dir_exists(&self, dir: &str) -> bool;
    /// File names (not paths) directly inside `dir`.
    fn list_dir(&self, dir: &str) -> FwResult<Vec<String>>;
    fn read_file(&self, path: &str) -> FwResult<Vec<u8>>;
    fn write_file(&mut self, path: &str, data: &[u8], overwrite: bool) -> FwResult<()>;

    fn file_exists(&self, path: &str) -> bool {
        self.read_file(path).is_ok()
    }

    fn copy_file(&mut self, from: &str, to: &str, overwrite: bool) -> FwResult<()> {
        let data = self.read_file(from)?;
        self.write_file(to, &data, overwrite)
    }
}

/// Wi-Fi association and status. Connection attempts are asynchronous:
/// the outcome shows up in `status()` on later polls.
pub trait Network: Send {
    fn connect(&mut self, ssid: &str, password: &str, auth_mode: u16) -> FwResult<()>;
    fn disconnect(&mut self) -> FwResult<()>;
    /// Tears down and brings the radio stack back up.
    fn reinit(&mut self) -> FwResult<()>;
    fn start_scan(&mut self) -> FwResult<()>;
    fn scan_results(&self) -> Vec<WifiNetworkInfo>;
    fn status(&self) -> ConnectionStatus;
    fn connection(&self) -> ConnectionData;
    /// Gives the stack a chance to make progress.
    fn poll(&mut self) {}
}

pub trait HttpClient: Send {
    fn get(&mut self, url: &str) -> FwResult<Vec<u8>>;
}

pub trait ImageTools: Send {
    fn msa_to_st(
        &mut self,
        storage: &mut dyn Storage,
        src: &str,
        dst: &str,
        overwrite: bool,
    ) -> FwResult<()>;

    fn create_blank_st(
        &mut self,
        storage: &mut dyn Storage,
        path: &str,
        volume_name: &str,
        geometry: FloppyGeometry,
        overwrite: bool,
    ) -> FwResult<()>;
}

/// Raw access to the on-board flash. Offsets are relative to flash start.
pub trait FlashControl: Send {
    fn erase(&mut self, offset: u32, len: u32) -> FwResult<()>;
    fn program(&mut self, offset: u32, data: &[u8]) -> FwResult<()>;
}

/// Visual feedback and the final reboot into the selected emulator.
pub trait BootSignal: Send {
    /// Morse-codes a single letter on the board LED.
    fn blink(&mut self, code: char);
    fn reboot(&mut self);
}

pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

/// Wall clock for real runs.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_values() {
        assert_eq!(ConnectionStatus::TimeoutError as u16, 5);
        assert_eq!(ConnectionStatus::BadAuthError as u16, 11);
        assert_eq!(ConnectionStatus::InsufficientResourcesError as u16, 13);
        assert_eq!(ConnectionStatus::from_u16(4), Some(ConnectionStatus::ConnectedWifiIp));
        assert_eq!(ConnectionStatus::from_u16(15), None);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ConnectionStatus::TimeoutError.is_retryable());
        assert!(ConnectionStatus::ConnectFailedError.is_retryable());
        assert!(!ConnectionStatus::BadAuthError.is_retryable());
        assert!(!ConnectionStatus::ConnectedWifiIp.is_retryable());
        assert!(!ConnectionStatus::NotSupported.is_retryable());
    }
}
