// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod backend;
pub mod script;
pub mod store;

pub use backend::{ConfigBackend, FileBackend, MemoryBackend, CONFIG_FLASH_SIZE};
pub use script::{HostAssertion, HostScript, HostStep};
pub use store::{keys, ConfigEntry, ConfigStore, DataType};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration table full, cannot add key '{0}'")]
    Full(store::Key),
    #[error("Configuration image truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Configuration image has bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("Unknown configuration data type {0}")]
    InvalidDataType(u16),
    #[error("Configuration storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RomRegion {
    /// RAM address where the two emulated ROM banks live.
    pub base: u64,
    pub bank_size: String, // e.g. "64KiB"
}

fn default_window() -> String {
    "4KiB".to_string()
}
fn default_loop_interval_ms() -> u64 {
    10
}
fn default_network_poll_interval() -> u16 {
    10
}
fn default_protocol_restart_us() -> u64 {
    10_000
}
fn default_rom_extensions() -> Vec<String> {
    ["img", "bin", "stc", "rom"].map(String::from).to_vec()
}
fn default_floppy_extensions() -> Vec<String> {
    ["st", "msa", "rw"].map(String::from).to_vec()
}
fn default_release_version() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}
fn default_latest_release_url() -> String {
    "https://api.github.com/repos/diegoparrilla/atarist-sidecart-raspberry-pico/releases/latest"
        .to_string()
}

/// Board-level constants of the coprocessor.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DeviceProfile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub rom: RomRegion,
    #[serde(default = "default_window")]
    pub shared_window: String,
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    #[serde(default = "default_network_poll_interval")]
    pub network_poll_interval: u16,
    #[serde(default = "default_protocol_restart_us")]
    pub protocol_restart_us: u64,
    #[serde(default = "default_rom_extensions")]
    pub rom_extensions: Vec<String>,
    #[serde(default = "default_floppy_extensions")]
    pub floppy_extensions: Vec<String>,
    #[serde(default = "default_release_version")]
    pub release_version: String,
    #[serde(default = "default_latest_release_url")]
    pub latest_release_url: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "sidecart-rp2040".to_string(),
            rom: RomRegion {
                base: 0x2002_0000,
                bank_size: "64KiB".to_string(),
            },
            shared_window: default_window(),
            loop_interval_ms: default_loop_interval_ms(),
            network_poll_interval: default_network_poll_interval(),
            protocol_restart_us: default_protocol_restart_us(),
            rom_extensions: default_rom_extensions(),
            floppy_extensions: default_floppy_extensions(),
            release_version: default_release_version(),
            latest_release_url: default_latest_release_url(),
        }
    }
}

impl DeviceProfile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open device profile at {:?}", path.as_ref()))?;
        let profile: Self =
            serde_yaml::from_reader(f).context("Failed to parse Device Profile YAML")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn bank_size(&self) -> Result<u32> {
        let size = parse_size(&self.rom.bank_size)?;
        u32::try_from(size).context("ROM bank size does not fit the address space")
    }

    pub fn window_size(&self) -> Result<u32> {
        let size = parse_size(&self.shared_window)?;
        u32::try_from(size).context("Shared window size does not fit the address space")
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let bank = self.bank_size()?;
        let window = self.window_size()?;
        if bank == 0 || bank % 4 != 0 {
            anyhow::bail!("ROM bank size must be a non-zero multiple of 4 bytes");
        }
        if window < 8 || window % 4 != 0 || window > bank {
            anyhow::bail!(
                "Shared window ({} bytes) must be a multiple of 4 between 8 bytes and the bank size ({} bytes)",
                window,
                bank
            );
        }
        if bank < 0x1_0000 {
            anyhow::bail!("ROM bank must be at least 64KiB so every 16-bit value is addressable");
        }
        if self.rom.base % 4 != 0 || self.rom.base + 2 * u64::from(bank) > u64::from(u32::MAX) {
            anyhow::bail!("ROM region base {:#x} is misaligned or out of range", self.rom.base);
        }
        if (self.rom.base + u64::from(bank)) % 0x1_0000 != 0 {
            anyhow::bail!("ROM3 bank must start on a 64KiB boundary");
        }
        if self.network_poll_interval == 0 {
            anyhow::bail!("'network_poll_interval' must be greater than zero");
        }
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        let profile = DeviceProfile::default();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.bank_size().unwrap(), 0x10000);
        assert_eq!(profile.window_size().unwrap(), 4096);
    }

    #[test]
    fn test_profile_yaml_defaults() {
        let yaml = r#"
name: "board"
rom:
  base: 0x20020000
  bank_size: "64KiB"
"#;
        let profile: DeviceProfile = serde_yaml::from_str(yaml).unwrap();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.network_poll_interval, 10);
        assert_eq!(profile.protocol_restart_us, 10_000);
        assert_eq!(profile.rom_extensions, vec!["img", "bin", "stc", "rom"]);
    }

    #[test]
    fn test_window_larger_than_bank_rejected() {
        let yaml = r#"
name: "board"
rom:
  base: 0x20020000
  bank_size: "4KiB"
shared_window: "8KiB"
"#;
        let profile: DeviceProfile = serde_yaml::from_str(yaml).unwrap();
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("Shared window"));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("64KiB").unwrap(), 65536);
        assert!(parse_size("lots").is_err());
    }
}
