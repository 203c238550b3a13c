// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{FirmwareError, FwResult};
use rombridge_config::DeviceProfile;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

pub const ROM_IN_RAM_ADDRESS: u32 = 0x2002_0000;
pub const ROM_SIZE_BYTES: u32 = 0x1_0000;
/// Host address of the ROM4 bank. ROM3 follows it directly.
pub const ROM4_HOST_ADDRESS: u32 = 0xFA_0000;
pub const CONFIGURATOR_SHARED_MEMORY_SIZE_BYTES: u32 = 4096;
pub const RANDOM_SEED_SIZE: u32 = 4;
pub const FLASH_ROM_LOAD_OFFSET: u32 = 0xE_0000;

/// Placement of the ROM banks and of the shared window inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    pub rom_base: u32,
    pub bank_size: u32,
    pub window_size: u32,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self {
            rom_base: ROM_IN_RAM_ADDRESS,
            bank_size: ROM_SIZE_BYTES,
            window_size: CONFIGURATOR_SHARED_MEMORY_SIZE_BYTES,
        }
    }
}

impl MemoryMap {
    pub fn from_profile(profile: &DeviceProfile) -> FwResult<Self> {
        profile
            .validate()
            .map_err(|e| FirmwareError::Profile(format!("{:#}", e)))?;
        let bank_size = profile
            .bank_size()
            .map_err(|e| FirmwareError::Profile(format!("{:#}", e)))?;
        let window_size = profile
            .window_size()
            .map_err(|e| FirmwareError::Profile(format!("{:#}", e)))?;
        Ok(Self {
            rom_base: profile.rom.base as u32,
            bank_size,
            window_size,
        })
    }

    pub fn rom4_start(&self) -> u32 {
        self.rom_base
    }

    pub fn rom3_start(&self) -> u32 {
        self.rom_base + self.bank_size
    }

    pub fn rom_end(&self) -> u32 {
        self.rom_base + 2 * self.bank_size
    }

    /// The window occupies the last bytes of ROM4.
    pub fn window_start(&self) -> u32 {
        self.rom3_start() - self.window_size
    }

    pub fn token_addr(&self) -> u32 {
        self.window_start()
    }

    pub fn payload_addr(&self) -> u32 {
        self.window_start() + RANDOM_SEED_SIZE
    }

    pub fn seed_addr(&self) -> u32 {
        self.window_start() - RANDOM_SEED_SIZE
    }

    pub fn payload_capacity(&self) -> usize {
        (self.window_size - RANDOM_SEED_SIZE) as usize
    }

    pub fn host_to_ram(&self, host_addr: u32) -> Option<u32> {
        let end = ROM4_HOST_ADDRESS + 2 * self.bank_size;
        (ROM4_HOST_ADDRESS..end)
            .contains(&host_addr)
            .then(|| self.rom_base + (host_addr - ROM4_HOST_ADDRESS))
    }

    pub fn ram_to_host(&self, ram_addr: u32) -> Option<u32> {
        (self.rom_base..self.rom_end())
            .contains(&ram_addr)
            .then(|| ROM4_HOST_ADDRESS + (ram_addr - self.rom_base))
    }

    pub fn rom3_host_address(&self) -> u32 {
        ROM4_HOST_ADDRESS + self.bank_size
    }
}

/// One store into ROM memory, recorded when journaling is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub addr: u32,
    pub len: u32,
    /// Set for release stores (the token).
    pub release: bool,
}

/// RAM holding the emulated ROM banks. Word-granular atomics so that the
/// interrupt handler, the loop and the host bus can touch it concurrently.
pub struct RomMemory {
    words: Box<[AtomicU32]>,
    base_addr: u32,
    journaling: AtomicBool,
    journal: Mutex<Vec<WriteRecord>>,
}

impl std::fmt::Debug for RomMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomMemory")
            .field("base_addr", &format_args!("{:#x}", self.base_addr))
            .field("size", &self.size())
            .finish()
    }
}

impl RomMemory {
    pub fn new(size: u32, base_addr: u32) -> Self {
        let words = (size as usize).div_ceil(4);
        Self {
            words: (0..words).map(|_| AtomicU32::new(0)).collect(),
            base_addr,
            journaling: AtomicBool::new(false),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn for_map(map: &MemoryMap) -> Self {
        Self::new(2 * map.bank_size, map.rom_base)
    }

    pub fn size(&self) -> u32 {
        (self.words.len() * 4) as u32
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    fn offset(&self, addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(self.base_addr)? as usize;
        (off + len <= self.words.len() * 4).then_some(off)
    }

    fn record(&self, addr: u32, len: usize, release: bool) {
        if !self.journaling.load(Ordering::Relaxed) {
            return;
        }
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        journal.push(WriteRecord {
            addr,
            len: len as u32,
            release,
        });
    }

    fn load_byte(&self, off: usize) -> u8 {
        let word = self.words[off / 4].load(Ordering::Acquire);
        (word >> ((off % 4) * 8)) as u8
    }

    fn store_byte(&self, off: usize, value: u8) {
        let shift = (off % 4) * 8;
        let mask = 0xFFu32 << shift;
        let _ = self.words[off / 4].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |old| {
            Some((old & !mask) | (u32::from(value) << shift))
        });
    }

    pub fn read_u8(&self, addr: u32) -> Option<u8> {
        self.offset(addr, 1).map(|off| self.load_byte(off))
    }

    pub fn write_u8(&self, addr: u32, value: u8) -> bool {
        let Some(off) = self.offset(addr, 1) else {
            return false;
        };
        self.store_byte(off, value);
        self.record(addr, 1, false);
        true
    }

    /// Little-endian halfword, as the RP2040 puts it on the cartridge bus.
    pub fn read_u16(&self, addr: u32) -> Option<u16> {
        let off = self.offset(addr, 2)?;
        Some(u16::from(self.load_byte(off)) | (u16::from(self.load_byte(off + 1)) << 8))
    }

    pub fn read_u32(&self, addr: u32) -> Option<u32> {
        let off = self.offset(addr, 4)?;
        if off % 4 == 0 {
            return Some(self.words[off / 4].load(Ordering::Acquire));
        }
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.load_byte(off + i);
        }
        Some(u32::from_le_bytes(bytes))
    }

    pub fn write_u32(&self, addr: u32, value: u32) -> bool {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Single aligned store with release ordering: every store issued before
    /// it is visible to a reader that observes `value`.
    pub fn write_u32_release(&self, addr: u32, value: u32) -> bool {
        match self.offset(addr, 4) {
            Some(off) if off % 4 == 0 => {
                self.words[off / 4].store(value, Ordering::Release);
                self.record(addr, 4, true);
                true
            }
            _ => false,
        }
    }

    pub fn read_bytes(&self, addr: u32, out: &mut [u8]) -> bool {
        let Some(off) = self.offset(addr, out.len()) else {
            return false;
        };
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.load_byte(off + i);
        }
        true
    }

    pub fn write_bytes(&self, addr: u32, data: &[u8]) -> bool {
        let Some(off) = self.offset(addr, data.len()) else {
            return false;
        };
        for (i, &b) in data.iter().enumerate() {
            self.store_byte(off + i, b);
        }
        self.record(addr, data.len(), false);
        true
    }

    pub fn fill(&self, addr: u32, len: usize, value: u8) -> bool {
        let Some(off) = self.offset(addr, len) else {
            return false;
        };
        for i in 0..len {
            self.store_byte(off + i, value);
        }
        self.record(addr, len, false);
        true
    }

    pub fn set_journaling(&self, enabled: bool) {
        self.journaling.store(enabled, Ordering::Relaxed);
    }

    pub fn take_journal(&self) -> Vec<WriteRecord> {
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::take(&mut *journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mem = RomMemory::new(1024, 0x1000);

        // Valid write
        assert!(mem.write_u8(0x1000, 42));
        assert!(mem.write_u8(0x13FF, 99)); // Last byte

        // Invalid write (out of bounds)
        assert!(!mem.write_u8(0x0FFF, 1));
        assert!(!mem.write_u8(0x1400, 1));

        // Valid read
        assert_eq!(mem.read_u8(0x1000), Some(42));
        assert_eq!(mem.read_u8(0x13FF), Some(99));

        // Invalid read
        assert_eq!(mem.read_u8(0x0FFF), None);
        assert_eq!(mem.read_u8(0x1400), None);
    }

    #[test]
    fn test_halfword_is_little_endian() {
        let mem = RomMemory::new(16, 0);
        assert!(mem.write_bytes(2, &[0x34, 0x12]));
        assert_eq!(mem.read_u16(2), Some(0x1234));
        assert!(mem.write_u32(4, 0xAABB_CCDD));
        assert_eq!(mem.read_u16(4), Some(0xCCDD));
        assert_eq!(mem.read_u32(4), Some(0xAABB_CCDD));
        // Unaligned access crosses word boundaries.
        assert_eq!(mem.read_u32(3), Some(0xBBCC_DD12));
    }

    #[test]
    fn test_release_store_requires_alignment() {
        let mem = RomMemory::new(16, 0x100);
        assert!(mem.write_u32_release(0x104, 7));
        assert!(!mem.write_u32_release(0x106, 7));
        assert!(!mem.write_u32_release(0x110, 7));
        assert_eq!(mem.read_u32(0x104), Some(7));
    }

    #[test]
    fn test_journal_records_order() {
        let mem = RomMemory::new(64, 0);
        mem.write_u8(0, 1);
        mem.set_journaling(true);
        mem.write_bytes(8, &[1, 2, 3]);
        mem.fill(16, 4, 0);
        mem.write_u32_release(4, 9);
        let journal = mem.take_journal();
        assert_eq!(
            journal,
            vec![
                WriteRecord { addr: 8, len: 3, release: false },
                WriteRecord { addr: 16, len: 4, release: false },
                WriteRecord { addr: 4, len: 4, release: true },
            ]
        );
        assert!(mem.take_journal().is_empty());
    }

    #[test]
    fn test_default_map_layout() {
        let map = MemoryMap::default();
        assert_eq!(map.rom3_start(), 0x2003_0000);
        assert_eq!(map.window_start(), 0x2002_F000);
        assert_eq!(map.token_addr(), 0x2002_F000);
        assert_eq!(map.payload_addr(), 0x2002_F004);
        assert_eq!(map.seed_addr(), 0x2002_EFFC);
        assert_eq!(map.payload_capacity(), 4092);
        assert_eq!(map.host_to_ram(0xFB_0000), Some(0x2003_0000));
        assert_eq!(map.host_to_ram(0xFC_0000), None);
        assert_eq!(map.ram_to_host(0x2002_F000), Some(0xFA_F000));
    }
}
