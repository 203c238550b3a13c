// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::services::{BootSignal, Clock, FlashControl};
use crate::{FirmwareError, FwResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 2 MiB, the size of the board's QSPI flash.
pub const FLASH_SIZE: u32 = 0x20_0000;
const ERASED: u8 = 0xFF;

/// Flash chip held in memory. Erased bytes read `0xFF`.
#[derive(Debug, Clone)]
pub struct MemFlash {
    cells: Arc<Mutex<Vec<u8>>>,
}

impl Default for MemFlash {
    fn default() -> Self {
        Self::new(FLASH_SIZE)
    }
}

impl MemFlash {
    pub fn new(size: u32) -> Self {
        Self {
            cells: Arc::new(Mutex::new(vec![ERASED; size as usize])),
        }
    }

    fn cells(&self) -> MutexGuard<'_, Vec<u8>> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, offset: u32, len: usize) -> Vec<u8> {
        let cells = self.cells();
        let start = (offset as usize).min(cells.len());
        let end = start.saturating_add(len).min(cells.len());
        cells[start..end].to_vec()
    }

    fn range(len_total: usize, offset: u32, len: usize) -> FwResult<std::ops::Range<usize>> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= len_total => Ok(start..end),
            _ => Err(FirmwareError::Flash {
                offset,
                reason: format!("{} bytes exceed the {} byte chip", len, len_total),
            }),
        }
    }
}

impl FlashControl for MemFlash {
    fn erase(&mut self, offset: u32, len: u32) -> FwResult<()> {
        let mut cells = self.cells();
        let range = Self::range(cells.len(), offset, len as usize)?;
        cells[range].fill(ERASED);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> FwResult<()> {
        let mut cells = self.cells();
        let range = Self::range(cells.len(), offset, data.len())?;
        // NOR flash can only clear bits.
        for (cell, byte) in cells[range].iter_mut().zip(data) {
            *cell &= *byte;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalLog {
    pub blinks: Vec<char>,
    pub reboots: u32,
}

/// Boot signal that only records what it was asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingSignal {
    log: Arc<Mutex<SignalLog>>,
}

impl RecordingSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> SignalLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl BootSignal for RecordingSignal {
    fn blink(&mut self, code: char) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blinks
            .push(code);
    }

    fn reboot(&mut self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reboots += 1;
    }
}

/// Clock that only moves when told to. Sleeping advances it.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_micros(&self, us: u64) {
        self.micros.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance_micros(ms * 1000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_requires_erase() {
        let mut flash = MemFlash::new(16);
        flash.program(0, &[0x0F, 0xF0]).unwrap();
        flash.program(0, &[0xFF, 0xFF]).unwrap();
        assert_eq!(flash.read(0, 2), vec![0x0F, 0xF0]);
        flash.erase(0, 16).unwrap();
        assert_eq!(flash.read(0, 2), vec![0xFF, 0xFF]);
        assert!(flash.program(15, &[0, 0]).is_err());
    }

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        clock.sleep_ms(3);
        assert_eq!(clock.now_micros(), 3000);
    }
}
