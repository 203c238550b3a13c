// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::{MemoryMap, RomMemory};
use crate::{FirmwareError, FwResult};
use std::sync::Arc;
use tracing::debug;

/// Typed view over the configurator's shared window at the end of ROM4.
///
/// Layout relative to the window start:
///
/// ```text
/// -4  random seed scratch (u32)
///  0  token (u32), written last
///  4  response payload
/// ```
#[derive(Debug, Clone)]
pub struct SharedWindow {
    memory: Arc<RomMemory>,
    map: MemoryMap,
}

impl SharedWindow {
    pub fn new(memory: Arc<RomMemory>, map: MemoryMap) -> Self {
        Self { memory, map }
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn memory(&self) -> &Arc<RomMemory> {
        &self.memory
    }

    pub fn capacity(&self) -> usize {
        self.map.payload_capacity()
    }

    fn check(&self, offset: usize, len: usize) -> FwResult<u32> {
        let end = offset.saturating_add(len);
        if end > self.capacity() {
            return Err(FirmwareError::ResponseOverflow {
                len: end,
                capacity: self.capacity(),
            });
        }
        Ok(self.map.payload_addr() + offset as u32)
    }

    pub fn write_payload(&self, offset: usize, data: &[u8]) -> FwResult<()> {
        let addr = self.check(offset, data.len())?;
        self.memory.write_bytes(addr, data);
        Ok(())
    }

    pub fn read_payload(&self, offset: usize, out: &mut [u8]) -> FwResult<()> {
        let addr = self.check(offset, out.len())?;
        self.memory.read_bytes(addr, out);
        Ok(())
    }

    pub fn write_payload_u16(&self, offset: usize, value: u16) -> FwResult<()> {
        self.write_payload(offset, &value.to_le_bytes())
    }

    /// Clears the response area. The token slot is left untouched.
    pub fn zero_payload(&self) {
        self.memory
            .fill(self.map.payload_addr(), self.capacity(), 0);
    }

    /// Publishes completion. Must be the last store of every response.
    pub fn write_token(&self, token: u32) {
        self.memory.write_u32_release(self.map.token_addr(), token);
        debug!(token = format_args!("{:#010x}", token), "Token written");
    }

    pub fn token(&self) -> u32 {
        self.memory.read_u32(self.map.token_addr()).unwrap_or(0)
    }

    pub fn write_seed(&self, seed: u32) {
        self.memory.write_u32(self.map.seed_addr(), seed);
    }

    pub fn seed(&self) -> u32 {
        self.memory.read_u32(self.map.seed_addr()).unwrap_or(0)
    }

    /// Writes `payload` at the start of the response area, then the token.
    pub fn respond(&self, token: u32, payload: &[u8]) -> FwResult<()> {
        self.write_payload(0, payload)?;
        self.write_token(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> SharedWindow {
        let map = MemoryMap::default();
        SharedWindow::new(Arc::new(RomMemory::for_map(&map)), map)
    }

    #[test]
    fn test_payload_is_bounded() {
        let w = window();
        assert!(w.write_payload(0, &vec![1u8; 4092]).is_ok());
        let err = w.write_payload(4090, &[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            FirmwareError::ResponseOverflow { len: 4094, capacity: 4092 }
        ));
    }

    #[test]
    fn test_respond_writes_token_last() {
        let w = window();
        w.memory().set_journaling(true);
        w.respond(0xDEAD_BEEF, b"abcd").unwrap();
        let journal = w.memory().take_journal();
        assert_eq!(journal.len(), 2);
        assert!(!journal[0].release);
        assert!(journal[1].release);
        assert_eq!(journal[1].addr, w.map().token_addr());
        assert_eq!(w.token(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_zero_keeps_token() {
        let w = window();
        w.respond(7, &[0xFF; 16]).unwrap();
        w.zero_payload();
        let mut out = [1u8; 16];
        w.read_payload(0, &mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
        assert_eq!(w.token(), 7);
    }

    #[test]
    fn test_seed_slot_precedes_token() {
        let w = window();
        w.write_seed(0x1234_5678);
        assert_eq!(w.seed(), 0x1234_5678);
        assert_eq!(w.token(), 0);
    }
}
