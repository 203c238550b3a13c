// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::pending::PendingRequests;
use crate::services::{ConnectionData, SdCardData, WifiScanData};
use crate::window::SharedWindow;
use rombridge_config::ConfigStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Network state as last observed by the loop, served by read-back commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub scan: WifiScanData,
    pub connection: ConnectionData,
}

/// Lock for interrupt context: `None` instead of waiting for the loop.
fn try_guard<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// State shared between the trigger handler and the configurator loop.
/// The loop uses the blocking accessors, the handler the `try_` ones.
#[derive(Debug)]
pub struct FirmwareState {
    pub window: SharedWindow,
    pub pending: PendingRequests,
    config: Mutex<ConfigStore>,
    network: Mutex<NetworkSnapshot>,
    sd_card: Mutex<SdCardData>,
    storage_mounted: AtomicBool,
}

impl FirmwareState {
    pub fn new(window: SharedWindow, config: ConfigStore) -> Self {
        Self {
            window,
            pending: PendingRequests::new(),
            config: Mutex::new(config),
            network: Mutex::new(NetworkSnapshot::default()),
            sd_card: Mutex::new(SdCardData::default()),
            storage_mounted: AtomicBool::new(false),
        }
    }

    /// Locks the configuration table. Holders must not block.
    pub fn config(&self) -> MutexGuard<'_, ConfigStore> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_config(&self) -> Option<MutexGuard<'_, ConfigStore>> {
        try_guard(&self.config)
    }

    pub fn network(&self) -> MutexGuard<'_, NetworkSnapshot> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_network(&self) -> Option<MutexGuard<'_, NetworkSnapshot>> {
        try_guard(&self.network)
    }

    pub fn set_network(&self, snapshot: NetworkSnapshot) {
        *self.network() = snapshot;
    }

    /// SD card summary as last collected by the loop.
    pub fn sd_card(&self) -> MutexGuard<'_, SdCardData> {
        self.sd_card.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_sd_card(&self) -> Option<MutexGuard<'_, SdCardData>> {
        try_guard(&self.sd_card)
    }

    pub fn set_sd_card(&self, data: SdCardData) {
        *self.sd_card() = data;
    }

    pub fn storage_mounted(&self) -> bool {
        self.storage_mounted.load(Ordering::Acquire)
    }

    pub fn set_storage_mounted(&self, mounted: bool) {
        self.storage_mounted.store(mounted, Ordering::Release);
    }
}
