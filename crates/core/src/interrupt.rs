// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::TriggerHandler;
use crate::dispatcher::Dispatcher;
use crate::peripherals::LookupDma;
use crate::protocol::ProtocolParser;
use crate::services::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{trace, warn};

/// Bus trigger monitor: the lookup DMA completion interrupt.
///
/// Each completion yields the RAM address the host just read. Addresses in
/// the ROM3 bank carry one 16-bit value (their low 16 bits); anything below
/// ROM3 is plain ROM4 traffic and is ignored.
pub struct TriggerMonitor {
    dma: Arc<LookupDma>,
    rom3_start: u32,
    parser: Mutex<ProtocolParser>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    values: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for TriggerMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerMonitor")
            .field("rom3_start", &format_args!("{:#010x}", self.rom3_start))
            .field("values", &self.values())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl TriggerMonitor {
    pub fn new(
        dma: Arc<LookupDma>,
        rom3_start: u32,
        parser: ProtocolParser,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dma,
            rom3_start,
            parser: Mutex::new(parser),
            dispatcher,
            clock,
            values: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Values handed to the parser so far.
    pub fn values(&self) -> u64 {
        self.values.load(Ordering::Relaxed)
    }

    /// Values lost because the parser was busy (re-entrant trigger).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn handle(&self) {
        self.dma.acknowledge();
        let addr = self.dma.captured_address();
        if addr < self.rom3_start {
            return;
        }
        let value = (addr & 0xFFFF) as u16;

        // Never wait in interrupt context.
        let mut parser = match self.parser.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(value = format_args!("{:#06x}", value), "Parser busy, value dropped");
                return;
            }
        };
        self.values.fetch_add(1, Ordering::Relaxed);
        trace!(value = format_args!("{:#06x}", value), step = ?parser.step(), "Trigger");
        parser.feed(value, self.clock.now_micros(), |t| self.dispatcher.dispatch(t));
    }
}

impl TriggerHandler for TriggerMonitor {
    fn on_trigger(&self) {
        self.handle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMap, RomMemory};
    use crate::protocol::{Command, PROTOCOL_HEADER, PROTOCOL_READ_RESTART_MICROSECONDS};
    use crate::sim::ManualClock;
    use crate::state::FirmwareState;
    use crate::window::SharedWindow;
    use rombridge_config::ConfigStore;

    fn monitor() -> (TriggerMonitor, Arc<FirmwareState>, Arc<LookupDma>, Arc<ManualClock>) {
        let map = MemoryMap::default();
        let window = SharedWindow::new(Arc::new(RomMemory::for_map(&map)), map);
        let state = Arc::new(FirmwareState::new(window, ConfigStore::defaults()));
        state.set_storage_mounted(true);
        let dma = Arc::new(LookupDma::new(0));
        dma.set_irq_enabled(true);
        let clock = Arc::new(ManualClock::new());
        let m = TriggerMonitor::new(
            dma.clone(),
            map.rom3_start(),
            ProtocolParser::new(PROTOCOL_READ_RESTART_MICROSECONDS),
            Dispatcher::new(state.clone()),
            clock.clone(),
        );
        (m, state, dma, clock)
    }

    fn send(m: &TriggerMonitor, dma: &LookupDma, value: u16) {
        dma.capture(MemoryMap::default().rom3_start() + u32::from(value));
        m.handle();
    }

    #[test]
    fn test_rom4_reads_are_ignored() {
        let (m, _, dma, _) = monitor();
        dma.capture(MemoryMap::default().rom4_start() + 0xABCD);
        m.handle();
        assert_eq!(m.values(), 0);
        assert!(!dma.irq_pending());
    }

    #[test]
    fn test_values_reach_dispatcher() {
        let (m, state, dma, _) = monitor();
        // LOAD_ROM, 6 bytes: token 0x0000_0007, index 2.
        for v in [
            PROTOCOL_HEADER,
            Command::LoadRom.id(),
            6,
            0x0007,
            0x0000,
            0x0002,
        ] {
            send(&m, &dma, v);
        }
        assert_eq!(m.values(), 6);
        let req = state.pending.rom_file.peek().unwrap();
        assert_eq!(req.param, 2);
        assert_eq!(req.token, 0x0007_0000);
    }

    #[test]
    fn test_selection_without_index_is_dropped() {
        let (m, state, dma, _) = monitor();
        for v in [PROTOCOL_HEADER, Command::LoadRom.id(), 6, 0x0007, 0x0000, 0x0002] {
            send(&m, &dma, v);
        }
        assert!(state.pending.rom_file.take().is_some());
        // Same command, token only: index 2 is still in the parser buffer.
        for v in [PROTOCOL_HEADER, Command::LoadRom.id(), 4, 0x0008, 0x0000] {
            send(&m, &dma, v);
        }
        assert!(state.pending.rom_file.peek().is_none());
    }

    #[test]
    fn test_stall_restarts_header_detection() {
        let (m, state, dma, clock) = monitor();
        send(&m, &dma, PROTOCOL_HEADER);
        send(&m, &dma, Command::LoadRom.id());
        clock.advance_micros(PROTOCOL_READ_RESTART_MICROSECONDS + 1);
        // The stale command is discarded; these are now header-hunting noise.
        send(&m, &dma, 6);
        send(&m, &dma, 0x0007);
        assert!(!state.pending.rom_file.is_set());
    }
}
