// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::CartridgeBus;
use crate::configurator::Configurator;
use crate::dispatcher::Dispatcher;
use crate::host::HostClient;
use crate::images::StImageTools;
use crate::interrupt::TriggerMonitor;
use crate::memory::{MemoryMap, RomMemory};
use crate::peripherals::LookupDma;
use crate::protocol::ProtocolParser;
use crate::services::{BootSignal, Clock, FlashControl, HttpClient, ImageTools, Network, Storage};
use crate::sim::{FixtureHttp, ManualClock, MemFlash, MemStorage, RecordingSignal, SimNetwork};
use crate::state::FirmwareState;
use crate::window::SharedWindow;
use crate::FwResult;
use rombridge_config::{ConfigBackend, ConfigStore, DeviceProfile, MemoryBackend};
use std::sync::Arc;
use tracing::info;

/// Everything the configurator talks to outside of the shared window.
pub struct Collaborators {
    pub storage: Box<dyn Storage>,
    pub network: Box<dyn Network>,
    pub http: Box<dyn HttpClient>,
    pub images: Box<dyn ImageTools>,
    pub flash: Box<dyn FlashControl>,
    pub config_backend: Box<dyn ConfigBackend>,
    pub signal: Box<dyn BootSignal>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// In-memory collaborators: an empty card, no access points, no HTTP
    /// routes, blank flash, a fresh config sector and a manual clock.
    pub fn simulated() -> Self {
        Self {
            storage: Box::new(MemStorage::new()),
            network: Box::new(SimNetwork::new(Vec::new())),
            http: Box::new(FixtureHttp::new()),
            images: Box::new(StImageTools::default()),
            flash: Box::new(MemFlash::default()),
            config_backend: Box::new(MemoryBackend::new()),
            signal: Box::new(RecordingSignal::new()),
            clock: Arc::new(ManualClock::new()),
        }
    }
}

/// How a host request driven through the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    /// The request's token showed up in the window.
    pub echoed: bool,
    /// Loop iterations it took.
    pub steps: u64,
}

/// The coprocessor as wired on the cartridge: ROM memory, the lookup DMA,
/// the trigger monitor and the configurator loop.
#[derive(Debug)]
pub struct Board {
    map: MemoryMap,
    bus: CartridgeBus,
    monitor: Arc<TriggerMonitor>,
    configurator: Configurator,
}

impl Board {
    /// Wires a board for `profile`. The stored configuration is loaded here;
    /// `seed` drives the random values published in the window.
    pub fn new(profile: &DeviceProfile, mut io: Collaborators, seed: u64) -> FwResult<Self> {
        let map = MemoryMap::from_profile(profile)?;
        let memory = Arc::new(RomMemory::for_map(&map));
        let window = SharedWindow::new(memory.clone(), map);

        let config = ConfigStore::load_from(io.config_backend.as_mut())?;
        let state = Arc::new(FirmwareState::new(window, config));

        let dma = Arc::new(LookupDma::new(0));
        dma.set_irq_enabled(true);

        let monitor = Arc::new(TriggerMonitor::new(
            dma.clone(),
            map.rom3_start(),
            ProtocolParser::new(profile.protocol_restart_us),
            Dispatcher::new(state.clone()),
            io.clock.clone(),
        ));
        let mut bus = CartridgeBus::new(memory, map, dma.clone());
        bus.attach(monitor.clone());

        info!(
            profile = %profile.name,
            rom4 = format_args!("{:#010x}", map.rom4_start()),
            rom3 = format_args!("{:#010x}", map.rom3_start()),
            window = format_args!("{:#010x}", map.window_start()),
            "Board wired"
        );

        let configurator = Configurator::new(state, dma, io, profile.clone(), seed);
        Ok(Self {
            map,
            bus,
            monitor,
            configurator,
        })
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn bus(&self) -> &CartridgeBus {
        &self.bus
    }

    /// Host-side view of the cartridge port.
    pub fn host(&self) -> HostClient<'_, CartridgeBus> {
        HostClient::new(&self.bus, self.map)
    }

    pub fn monitor(&self) -> &Arc<TriggerMonitor> {
        &self.monitor
    }

    pub fn state(&self) -> &Arc<FirmwareState> {
        self.configurator.state()
    }

    pub fn configurator(&self) -> &Configurator {
        &self.configurator
    }

    pub fn configurator_mut(&mut self) -> &mut Configurator {
        &mut self.configurator
    }

    /// Lets the host transmit, then steps the loop until `token` is echoed,
    /// the loop ends or `max_steps` iterations ran.
    pub fn exchange<F>(&mut self, token: u32, max_steps: u64, transmit: F) -> FwResult<Exchange>
    where
        F: FnOnce(&HostClient<'_, CartridgeBus>) -> FwResult<()>,
    {
        transmit(&self.host())?;
        let mut steps = 0;
        loop {
            if self.host().token()? == token {
                return Ok(Exchange {
                    echoed: true,
                    steps,
                });
            }
            if steps >= max_steps || self.configurator.outcome().is_some() {
                return Ok(Exchange {
                    echoed: false,
                    steps,
                });
            }
            self.configurator.step();
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rombridge_config::keys;

    #[test]
    fn test_board_loads_stored_config() {
        let mut stored = ConfigStore::defaults();
        stored.put_string(keys::HOSTNAME, "ste").unwrap();
        let backend = MemoryBackend::with_image(&stored.to_image()).unwrap();
        let io = Collaborators {
            config_backend: Box::new(backend),
            ..Collaborators::simulated()
        };
        let board = Board::new(&DeviceProfile::default(), io, 1).unwrap();
        assert_eq!(board.state().config().get_str(keys::HOSTNAME), Some("ste"));
        assert!(board.bus().dma().irq_enabled());
    }

    #[test]
    fn test_board_rejects_bad_profile() {
        let mut profile = DeviceProfile::default();
        profile.shared_window = "3B".to_string();
        assert!(Board::new(&profile, Collaborators::simulated(), 0).is_err());
    }
}
