// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod board;
pub mod boot;
pub mod bus;
pub mod catalog;
pub mod codec;
pub mod configurator;
pub mod dispatcher;
pub mod host;
pub mod images;
pub mod interrupt;
pub mod memory;
pub mod pending;
pub mod peripherals;
pub mod protocol;
pub mod services;
pub mod sim;
pub mod state;
pub mod window;

pub use board::{Board, Collaborators, Exchange};
pub use boot::{BootFeature, BootOutcome, BootSelection};
pub use configurator::Configurator;
pub use host::HostClient;
pub use state::FirmwareState;

use rombridge_config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum FirmwareError {
    #[error("Bus access outside the cartridge ROM banks at {0:#x}")]
    BusFault(u32),
    #[error("Response of {len} bytes exceeds the shared window payload ({capacity} bytes)")]
    ResponseOverflow { len: usize, capacity: usize },
    #[error("Wire buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error("Unexpected wire value: {0}")]
    InvalidWire(String),
    #[error("Storage not mounted")]
    NotMounted,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Fetching {url} failed: {reason}")]
    Http { url: String, reason: String },
    #[error("Image conversion failed: {0}")]
    Image(String),
    #[error("Flash operation at {offset:#x} failed: {reason}")]
    Flash { offset: u32, reason: String },
    #[error("Invalid device profile: {0}")]
    Profile(String),
    #[error("Invalid catalog data: {0}")]
    Catalog(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FwResult<T> = Result<T, FirmwareError>;

/// Trait representing a register-mapped peripheral.
pub trait Peripheral: std::fmt::Debug + Send + Sync {
    fn read(&self, offset: u64) -> FwResult<u8>;
    fn write(&self, offset: u64, value: u8) -> FwResult<()>;
}

/// The cartridge port as the host computer sees it: a 16-bit big-endian bus.
pub trait Bus {
    fn read_u16(&self, addr: u32) -> FwResult<u16>;

    fn read_u8(&self, addr: u32) -> FwResult<u8> {
        let word = self.read_u16(addr & !1)?;
        // Big Endian: even address carries the high byte
        Ok(if addr & 1 == 0 {
            (word >> 8) as u8
        } else {
            (word & 0xFF) as u8
        })
    }

    fn read_u32(&self, addr: u32) -> FwResult<u32> {
        let hi = self.read_u16(addr)? as u32;
        let lo = self.read_u16(addr + 2)? as u32;
        Ok((hi << 16) | lo)
    }
}
