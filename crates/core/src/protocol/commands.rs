// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt;
use std::str::FromStr;

/// Configurator command set. The discriminant is the wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    DownloadRom = 0,
    LoadRom = 1,
    ListRoms = 2,
    GetConfig = 3,
    PutConfigString = 4,
    PutConfigInteger = 5,
    PutConfigBool = 6,
    SaveConfig = 7,
    ResetDevice = 8,
    LaunchScanNetworks = 9,
    GetScannedNetworks = 10,
    ConnectNetwork = 11,
    GetIpData = 12,
    DisconnectNetwork = 13,
    GetRomsJsonFile = 14,
    LoadFloppyRo = 15,
    ListFloppies = 16,
    LoadFloppyRw = 17,
    QueryFloppyDb = 18,
    DownloadFloppy = 19,
    GetSdData = 20,
    GetLatestRelease = 21,
    CreateFloppy = 22,
    BootRtc = 23,
}

/// How the dispatcher answers a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Snapshot copied into the window, then the token.
    ImmediateReadBack,
    /// Payload applied to in-memory state.
    ImmediateMutation,
    /// Parameters recorded for the loop, which writes the token later.
    Deferred,
}

impl Command {
    pub const ALL: [Command; 24] = [
        Command::DownloadRom,
        Command::LoadRom,
        Command::ListRoms,
        Command::GetConfig,
        Command::PutConfigString,
        Command::PutConfigInteger,
        Command::PutConfigBool,
        Command::SaveConfig,
        Command::ResetDevice,
        Command::LaunchScanNetworks,
        Command::GetScannedNetworks,
        Command::ConnectNetwork,
        Command::GetIpData,
        Command::DisconnectNetwork,
        Command::GetRomsJsonFile,
        Command::LoadFloppyRo,
        Command::ListFloppies,
        Command::LoadFloppyRw,
        Command::QueryFloppyDb,
        Command::DownloadFloppy,
        Command::GetSdData,
        Command::GetLatestRelease,
        Command::CreateFloppy,
        Command::BootRtc,
    ];

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::DownloadRom => "download_rom",
            Command::LoadRom => "load_rom",
            Command::ListRoms => "list_roms",
            Command::GetConfig => "get_config",
            Command::PutConfigString => "put_config_string",
            Command::PutConfigInteger => "put_config_integer",
            Command::PutConfigBool => "put_config_bool",
            Command::SaveConfig => "save_config",
            Command::ResetDevice => "reset_device",
            Command::LaunchScanNetworks => "launch_scan_networks",
            Command::GetScannedNetworks => "get_scanned_networks",
            Command::ConnectNetwork => "connect_network",
            Command::GetIpData => "get_ip_data",
            Command::DisconnectNetwork => "disconnect_network",
            Command::GetRomsJsonFile => "get_roms_json_file",
            Command::LoadFloppyRo => "load_floppy_ro",
            Command::ListFloppies => "list_floppies",
            Command::LoadFloppyRw => "load_floppy_rw",
            Command::QueryFloppyDb => "query_floppy_db",
            Command::DownloadFloppy => "download_floppy",
            Command::GetSdData => "get_sd_data",
            Command::GetLatestRelease => "get_latest_release",
            Command::CreateFloppy => "create_floppy",
            Command::BootRtc => "boot_rtc",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Command::GetConfig
            | Command::GetScannedNetworks
            | Command::GetIpData
            | Command::GetSdData => Category::ImmediateReadBack,
            Command::PutConfigString
            | Command::PutConfigInteger
            | Command::PutConfigBool
            | Command::ConnectNetwork => Category::ImmediateMutation,
            _ => Category::Deferred,
        }
    }

    /// Deferred commands that are refused while the card is not mounted.
    pub fn requires_storage(self) -> bool {
        matches!(
            self,
            Command::LoadRom
                | Command::ListRoms
                | Command::LoadFloppyRo
                | Command::LoadFloppyRw
                | Command::ListFloppies
                | Command::DownloadFloppy
                | Command::CreateFloppy
        )
    }

    /// Whether the first four payload bytes carry a token.
    pub fn carries_token(self) -> bool {
        self != Command::ConnectNetwork
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| format!("Unknown command '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_table_order() {
        for (i, cmd) in Command::ALL.iter().enumerate() {
            assert_eq!(cmd.id() as usize, i);
            assert_eq!(Command::from_id(i as u16), Some(*cmd));
        }
        assert_eq!(Command::from_id(24), None);
        assert_eq!(Command::from_id(0xFFFF), None);
    }

    #[test]
    fn test_names_roundtrip() {
        for cmd in Command::ALL {
            assert_eq!(cmd.name().parse::<Command>(), Ok(cmd));
        }
        assert_eq!("LOAD_ROM".parse::<Command>(), Ok(Command::LoadRom));
        assert!("fly".parse::<Command>().is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(Command::GetConfig.category(), Category::ImmediateReadBack);
        assert_eq!(Command::PutConfigBool.category(), Category::ImmediateMutation);
        assert_eq!(Command::GetSdData.category(), Category::ImmediateReadBack);
        assert_eq!(Command::LaunchScanNetworks.category(), Category::Deferred);
        assert!(Command::LoadRom.requires_storage());
        assert!(!Command::DownloadRom.requires_storage());
        assert!(!Command::ConnectNetwork.carries_token());
    }
}
