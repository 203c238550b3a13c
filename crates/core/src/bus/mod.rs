// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::{MemoryMap, RomMemory};
use crate::peripherals::LookupDma;
use crate::{Bus, FirmwareError, FwResult};
use std::sync::Arc;

/// Receives the lookup DMA completion interrupt.
pub trait TriggerHandler: Send + Sync {
    fn on_trigger(&self);
}

/// The cartridge port: host reads of ROM4/ROM3 are served from RAM through
/// the lookup DMA, and every completed lookup may raise the trigger IRQ.
pub struct CartridgeBus {
    memory: Arc<RomMemory>,
    map: MemoryMap,
    dma: Arc<LookupDma>,
    handler: Option<Arc<dyn TriggerHandler>>,
}

impl std::fmt::Debug for CartridgeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartridgeBus")
            .field("map", &self.map)
            .field("dma", &self.dma)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl CartridgeBus {
    pub fn new(memory: Arc<RomMemory>, map: MemoryMap, dma: Arc<LookupDma>) -> Self {
        Self {
            memory,
            map,
            dma,
            handler: None,
        }
    }

    pub fn attach(&mut self, handler: Arc<dyn TriggerHandler>) {
        self.handler = Some(handler);
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn dma(&self) -> &Arc<LookupDma> {
        &self.dma
    }

    /// One bus cycle at `host_addr`. The interrupt handler runs before the
    /// cycle completes, as it would preempt the core on the device.
    fn lookup(&self, host_addr: u32) -> FwResult<u16> {
        let ram = self
            .map
            .host_to_ram(host_addr)
            .ok_or(FirmwareError::BusFault(host_addr))?;
        let word = self
            .memory
            .read_u16(ram & !1)
            .ok_or(FirmwareError::BusFault(host_addr))?;
        if self.dma.capture(ram) {
            if let Some(handler) = &self.handler {
                handler.on_trigger();
            }
        }
        Ok(word)
    }
}

impl Bus for CartridgeBus {
    fn read_u16(&self, addr: u32) -> FwResult<u16> {
        if addr & 1 != 0 {
            return Err(FirmwareError::BusFault(addr));
        }
        self.lookup(addr)
    }

    fn read_u8(&self, addr: u32) -> FwResult<u8> {
        let word = self.lookup(addr)?;
        Ok(if addr & 1 == 0 {
            (word >> 8) as u8
        } else {
            (word & 0xFF) as u8
        })
    }
}
