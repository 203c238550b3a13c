// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{FwResult, Peripheral};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const READ_ADDR: u64 = 0x00;
pub const INTE: u64 = 0x04;
/// Write 1 to clear.
pub const INTS: u64 = 0x08;
pub const TRANS_COUNT: u64 = 0x0C;

/// DMA channel that looks up the ROM word for each cartridge read and keeps
/// the RAM address it fetched from. Completion raises INTS for the channel.
#[derive(Debug)]
pub struct LookupDma {
    channel: u32,
    read_addr: AtomicU32,
    inte: AtomicU32,
    ints: AtomicU32,
    transfers: AtomicU64,
}

impl LookupDma {
    pub fn new(channel: u32) -> Self {
        Self {
            channel: channel & 0xF,
            read_addr: AtomicU32::new(0),
            inte: AtomicU32::new(0),
            ints: AtomicU32::new(0),
            transfers: AtomicU64::new(0),
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    fn mask(&self) -> u32 {
        1 << self.channel
    }

    /// Records one lookup. Returns true if the completion interrupt fires.
    pub fn capture(&self, addr: u32) -> bool {
        self.read_addr.store(addr, Ordering::Release);
        self.transfers.fetch_add(1, Ordering::Relaxed);
        let ints = self.ints.fetch_or(self.mask(), Ordering::AcqRel) | self.mask();
        ints & self.inte.load(Ordering::Acquire) & self.mask() != 0
    }

    pub fn captured_address(&self) -> u32 {
        self.read_addr.load(Ordering::Acquire)
    }

    pub fn acknowledge(&self) {
        self.write_reg(INTS, self.mask());
    }

    pub fn irq_pending(&self) -> bool {
        self.ints.load(Ordering::Acquire) & self.mask() != 0
    }

    pub fn set_irq_enabled(&self, enabled: bool) {
        if enabled {
            self.inte.fetch_or(self.mask(), Ordering::AcqRel);
        } else {
            self.inte.fetch_and(!self.mask(), Ordering::AcqRel);
        }
    }

    pub fn irq_enabled(&self) -> bool {
        self.inte.load(Ordering::Acquire) & self.mask() != 0
    }

    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }

    fn read_reg(&self, offset: u64) -> u32 {
        match offset {
            READ_ADDR => self.read_addr.load(Ordering::Acquire),
            INTE => self.inte.load(Ordering::Acquire),
            INTS => self.ints.load(Ordering::Acquire),
            TRANS_COUNT => self.transfers() as u32,
            _ => 0,
        }
    }

    fn write_reg(&self, offset: u64, value: u32) {
        match offset {
            INTE => self.inte.store(value, Ordering::Release),
            INTS => {
                self.ints.fetch_and(!value, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

impl Peripheral for LookupDma {
    fn read(&self, offset: u64) -> FwResult<u8> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let reg_val = self.read_reg(reg_offset);
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&self, offset: u64, value: u8) -> FwResult<()> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        // INTS is write-1-to-clear, so only the written byte may carry ones.
        let reg_val = if reg_offset == INTS {
            (value as u32) << (byte_offset * 8)
        } else {
            let mask = 0xFF << (byte_offset * 8);
            (self.read_reg(reg_offset) & !mask) | ((value as u32) << (byte_offset * 8))
        };
        self.write_reg(reg_offset, reg_val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_raises_ints_only_when_enabled() {
        let dma = LookupDma::new(2);
        assert!(!dma.capture(0x2003_0010));
        assert!(dma.irq_pending());
        assert_eq!(dma.captured_address(), 0x2003_0010);

        dma.set_irq_enabled(true);
        assert!(dma.capture(0x2003_0020));
        dma.acknowledge();
        assert!(!dma.irq_pending());
        assert_eq!(dma.transfers(), 2);
    }

    #[test]
    fn test_register_access() {
        let dma = LookupDma::new(1);
        dma.write(INTE, 0x02).unwrap();
        assert!(dma.irq_enabled());
        dma.capture(0x1234_5678);
        assert_eq!(dma.read(READ_ADDR).unwrap(), 0x78);
        assert_eq!(dma.read(READ_ADDR + 3).unwrap(), 0x12);
        assert_eq!(dma.read(INTS).unwrap(), 0x02);
        // Writing zero to INTS leaves it alone, writing the bit clears it.
        dma.write(INTS, 0x00).unwrap();
        assert!(dma.irq_pending());
        dma.write(INTS, 0x02).unwrap();
        assert!(!dma.irq_pending());
    }
}
