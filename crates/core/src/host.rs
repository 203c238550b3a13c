// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The host computer's side of the cartridge port.
//!
//! The host has no write line: it transmits each 16-bit value `v` by
//! reading any byte at `ROM3 + v`, and collects answers by reading the
//! shared window in ROM4 as big-endian words.

use crate::codec::WireCodec;
use crate::memory::MemoryMap;
use crate::protocol::{Command, PROTOCOL_HEADER};
use crate::services::{FloppyRequest, WifiNetworkAuthInfo};
use crate::{Bus, FirmwareError, FwResult};
use rombridge_config::{ConfigEntry, DataType};
use tracing::trace;

#[derive(Debug)]
pub struct HostClient<'a, B: Bus> {
    bus: &'a B,
    map: MemoryMap,
}

impl<'a, B: Bus> HostClient<'a, B> {
    pub fn new(bus: &'a B, map: MemoryMap) -> Self {
        Self { bus, map }
    }

    fn send_value(&self, value: u16) -> FwResult<()> {
        trace!(value = format_args!("{:#06x}", value), "Host transmit");
        self.bus
            .read_u8(self.map.rom3_host_address() + u32::from(value))
            .map(|_| ())
    }

    /// Transmits a framed command. An odd payload is sent as whole words.
    pub fn send_raw(&self, command_id: u16, payload: &[u8]) -> FwResult<()> {
        let size = u16::try_from(payload.len()).map_err(|_| {
            FirmwareError::InvalidWire(format!("payload of {} bytes", payload.len()))
        })?;
        self.send_value(PROTOCOL_HEADER)?;
        self.send_value(command_id)?;
        self.send_value(size)?;
        for pair in payload.chunks(2) {
            let lo = pair[0];
            let hi = pair.get(1).copied().unwrap_or(0);
            self.send_value(u16::from_le_bytes([lo, hi]))?;
        }
        Ok(())
    }

    /// Transmits `command` with `token` ahead of `params`.
    pub fn send(&self, command: Command, token: u32, params: &[u8]) -> FwResult<()> {
        let mut payload = token.to_le_bytes().to_vec();
        payload.extend_from_slice(params);
        self.send_raw(command.id(), &payload)
    }

    /// Selections and other single-index requests.
    pub fn send_index(&self, command: Command, token: u32, index: u16) -> FwResult<()> {
        self.send(command, token, &index.to_le_bytes())
    }

    pub fn put_config(
        &self,
        token: u32,
        data_type: DataType,
        key: &str,
        value: &str,
    ) -> FwResult<()> {
        let command = match data_type {
            DataType::Int => Command::PutConfigInteger,
            DataType::Bool => Command::PutConfigBool,
            DataType::String => Command::PutConfigString,
        };
        self.send(command, token, &ConfigEntry::new(key, data_type, value).encode())
    }

    /// Credentials travel without a token.
    pub fn connect(&self, auth: &WifiNetworkAuthInfo) -> FwResult<()> {
        self.send_raw(Command::ConnectNetwork.id(), &auth.encode())
    }

    pub fn query_floppy_db(&self, token: u32, letter: char) -> FwResult<()> {
        self.send(Command::QueryFloppyDb, token, &[letter as u8, 0])
    }

    pub fn create_floppy(&self, token: u32, request: &FloppyRequest) -> FwResult<()> {
        self.send(Command::CreateFloppy, token, &request.encode())
    }

    fn window_host(&self, ram: u32) -> FwResult<u32> {
        self.map.ram_to_host(ram).ok_or(FirmwareError::BusFault(ram))
    }

    /// The completion token as the host reads it.
    pub fn token(&self) -> FwResult<u32> {
        self.bus.read_u32(self.window_host(self.map.token_addr())?)
    }

    pub fn seed(&self) -> FwResult<u32> {
        self.bus.read_u32(self.window_host(self.map.seed_addr())?)
    }

    /// Halfword at `offset` of the payload area.
    pub fn read_word(&self, offset: usize) -> FwResult<u16> {
        let base = self.window_host(self.map.payload_addr())?;
        self.bus.read_u16(base + offset as u32)
    }

    fn read_words(&self, len: usize, host_order: bool) -> FwResult<Vec<u8>> {
        let len = len.min(self.map.payload_capacity());
        let mut out = Vec::with_capacity(len + 1);
        for offset in (0..len).step_by(2) {
            let word = self.read_word(offset)?;
            out.extend_from_slice(&if host_order {
                word.to_be_bytes()
            } else {
                word.to_le_bytes()
            });
        }
        out.truncate(len);
        Ok(out)
    }

    /// Payload bytes as the host sees them.
    pub fn read_payload(&self, len: usize) -> FwResult<Vec<u8>> {
        self.read_words(len, true)
    }

    /// Decodes a read-back struct from the payload area.
    pub fn read_wire<T: WireCodec>(&self) -> FwResult<T> {
        T::decode(&self.read_words(T::wire_size(), false)?)
    }

    /// NUL-separated names up to the list terminator.
    pub fn read_names(&self) -> FwResult<Vec<String>> {
        let bytes = self.read_payload(self.map.payload_capacity())?;
        let mut names = Vec::new();
        let mut rest = bytes.as_slice();
        while let Some(&first) = rest.first() {
            if first == 0 || first == 0xFF {
                break;
            }
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            names.push(String::from_utf8_lossy(&rest[..end]).into_owned());
            rest = rest.get(end + 1..).unwrap_or_default();
        }
        Ok(names)
    }

    /// NUL-terminated string at the start of the payload.
    pub fn read_string(&self) -> FwResult<String> {
        let bytes = self.read_payload(self.map.payload_capacity())?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
