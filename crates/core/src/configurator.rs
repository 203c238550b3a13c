// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The cooperative configurator loop.
//!
//! Owns every collaborator and all cross-command state. Interrupt-context
//! code only reaches it through the pending set and the shared window.

use crate::board::Collaborators;
use crate::boot::{BootOutcome, BootSelection};
use crate::catalog::{
    encode_file_list, encode_name_list, filter_and_sort, parse_floppy_db, parse_rom_index,
    rom_index_label,
};
use crate::codec::swap_words;
use crate::peripherals::LookupDma;
use crate::services::{
    ConnectionStatus, FloppyImageInfo, FloppyRequest, RomInfo, SdCardData, WifiNetworkAuthInfo,
    WifiScanData,
    FLOPPIES_FOLDER_NOTFOUND, FLOPPIES_FOLDER_OK, HARDDISKS_FOLDER, HARDDISKS_FOLDER_NOTFOUND,
    HARDDISKS_FOLDER_OK, MAX_NETWORKS, ROMS_FOLDER_NOTFOUND, ROMS_FOLDER_OK, SD_CARD_MOUNTED,
    SD_CARD_NOT_MOUNTED,
};
use crate::state::{FirmwareState, NetworkSnapshot};
use crate::{FirmwareError, FwResult};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rombridge_config::{keys, DeviceProfile};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Configurator {
    pub(crate) state: Arc<FirmwareState>,
    pub(crate) io: Collaborators,
    dma: Arc<LookupDma>,
    profile: DeviceProfile,
    rng: SmallRng,
    poll_counter: u16,
    previous_status: ConnectionStatus,
    scan_interval_s: Option<u64>,
    last_scan_us: Option<u64>,
    pub(crate) rom_files: Vec<String>,
    pub(crate) floppy_files: Vec<String>,
    pub(crate) rom_index: Vec<RomInfo>,
    pub(crate) floppy_db: Vec<FloppyImageInfo>,
    iterations: u64,
    outcome: Option<BootOutcome>,
}

impl std::fmt::Debug for Configurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configurator")
            .field("iterations", &self.iterations)
            .field("poll_counter", &self.poll_counter)
            .field("previous_status", &self.previous_status)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Configurator {
    pub fn new(
        state: Arc<FirmwareState>,
        dma: Arc<LookupDma>,
        io: Collaborators,
        profile: DeviceProfile,
        seed: u64,
    ) -> Self {
        Self {
            state,
            io,
            dma,
            profile,
            rng: SmallRng::seed_from_u64(seed),
            poll_counter: 0,
            previous_status: ConnectionStatus::Disconnected,
            scan_interval_s: None,
            last_scan_us: None,
            rom_files: Vec::new(),
            floppy_files: Vec::new(),
            rom_index: Vec::new(),
            floppy_db: Vec::new(),
            iterations: 0,
            outcome: None,
        }
    }

    pub fn state(&self) -> &Arc<FirmwareState> {
        &self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn outcome(&self) -> Option<BootOutcome> {
        self.outcome
    }

    /// Mounts the card, reads the scan interval, starts the network and
    /// publishes the first seed. Mount failures are logged, not fatal.
    pub fn init(&mut self) {
        info!(profile = %self.profile.name, "Initializing configurator");
        match self.io.storage.mount() {
            Ok(()) => self.state.set_storage_mounted(true),
            Err(e) => {
                error!("Could not mount the microSD card: {}", e);
                self.state.set_storage_mounted(false);
            }
        }
        self.refresh_sd_card();

        self.scan_interval_s = self.read_scan_interval();
        self.connect_stored();
        self.io.signal.blink('C');
        self.refresh_network();
        self.publish_seed();
    }

    /// Steps until a boot selection ends the loop or `max_iterations` ran.
    pub fn run(&mut self, max_iterations: u64) -> Option<BootOutcome> {
        for _ in 0..max_iterations {
            if let Some(outcome) = self.step() {
                return Some(outcome);
            }
        }
        None
    }

    /// One loop iteration. Once a boot selection has been observed the loop
    /// is over and every further call returns the same outcome.
    pub fn step(&mut self) -> Option<BootOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        if let Some((selection, token)) = BootSelection::take(&self.state.pending) {
            let outcome = self.complete_boot(selection, token);
            self.outcome = Some(outcome);
            return self.outcome;
        }

        self.io.network.poll();
        self.io.clock.sleep_ms(self.profile.loop_interval_ms);

        self.scan_timer();
        self.apply_credentials();
        self.apply_disconnect();
        if self.poll_counter == 0 {
            self.monitor_connection();
            self.refresh_sd_card();
        }
        self.service_deferred();
        self.refresh_network();

        self.poll_counter = if self.poll_counter >= self.profile.network_poll_interval {
            0
        } else {
            self.poll_counter + 1
        };
        self.publish_seed();
        self.iterations += 1;
        None
    }

    /// Reboots into whatever the last boot selection registered.
    pub fn reboot(&mut self) {
        let feature = self.config_str(keys::BOOT_FEATURE);
        info!(%feature, "Rebooting");
        self.io.signal.reboot();
    }

    pub(crate) fn config_str(&self, key: &str) -> String {
        self.state.config().get_str(key).unwrap_or_default().to_string()
    }

    pub(crate) fn persist_config(&mut self) -> FwResult<()> {
        let image = self.state.config().clone();
        image.persist(self.io.config_backend.as_mut())?;
        debug!(entries = image.len(), "Configuration persisted");
        Ok(())
    }

    /// Runs `f` with the trigger interrupt disabled, as long storage work
    /// must not be interleaved with host traffic.
    pub(crate) fn with_trigger_masked<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.dma.set_irq_enabled(false);
        let out = f(self);
        self.dma.set_irq_enabled(true);
        out
    }

    fn publish_seed(&mut self) {
        let seed: u32 = self.rng.gen();
        self.state.window.write_seed(seed);
    }

    fn read_scan_interval(&self) -> Option<u64> {
        let config = self.state.config();
        match config.find(keys::WIFI_SCAN_SECONDS) {
            Some(entry) => Some(entry.as_int().max(0) as u64),
            None => {
                debug!("WIFI_SCAN_SECONDS not found in the config. Disabling polling");
                None
            }
        }
    }

    fn scan_timer(&mut self) {
        let now = self.io.clock.now_micros();
        let Some(interval) = self.scan_interval_s else {
            return;
        };
        let due = match self.last_scan_us {
            None => true,
            Some(last) => now.saturating_sub(last) > interval * 1_000_000,
        };
        if !due {
            return;
        }
        self.scan_interval_s = self.read_scan_interval();
        if self.scan_interval_s.is_some() {
            if let Err(e) = self.io.network.start_scan() {
                warn!("Background scan failed: {}", e);
            }
            self.last_scan_us = Some(now);
        }
    }

    /// Connects with the stored credentials, if any.
    fn connect_stored(&mut self) {
        let (ssid, password, auth) = {
            let config = self.state.config();
            (
                config.get_str(keys::WIFI_SSID).unwrap_or_default().to_string(),
                config
                    .get_str(keys::WIFI_PASSWORD)
                    .unwrap_or_default()
                    .to_string(),
                config.get_int(keys::WIFI_AUTH).unwrap_or(0),
            )
        };
        if ssid.is_empty() {
            debug!("No SSID configured, not connecting");
            return;
        }
        info!(%ssid, "Connecting to network");
        if let Err(e) = self.io.network.connect(&ssid, &password, auth as u16) {
            warn!(%ssid, "Connect failed: {}", e);
        }
    }

    fn store_credentials(&mut self, ssid: &str, password: &str, auth: u16) {
        let stored = {
            let mut config = self.state.config();
            config
                .put_string(keys::WIFI_SSID, ssid)
                .and_then(|()| config.put_string(keys::WIFI_PASSWORD, password))
                .and_then(|()| config.put_integer(keys::WIFI_AUTH, i32::from(auth)))
        };
        let result = match stored {
            Ok(()) => self.persist_config(),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Storing network credentials failed: {}", e);
        }
    }

    fn reset_radio(&mut self) -> FwResult<()> {
        self.io.network.disconnect()?;
        self.io.network.reinit()?;
        self.io.network.start_scan()
    }

    /// Tears the stack down and brings it back up with a fresh scan.
    fn restart_network(&mut self) {
        if let Err(e) = self.reset_radio() {
            warn!("Network restart failed: {}", e);
        }
    }

    fn apply_credentials(&mut self) {
        let Some(captured) = self.state.pending.wifi_auth.take() else {
            return;
        };
        let auth: WifiNetworkAuthInfo = match captured.decode() {
            Ok(auth) => auth,
            Err(e) => {
                warn!("CONNECT_NETWORK payload rejected: {}", e);
                return;
            }
        };
        info!(ssid = %auth.ssid, "Storing network credentials");
        self.store_credentials(&auth.ssid, &auth.password, auth.auth_mode);
        self.connect_stored();
    }

    fn apply_disconnect(&mut self) {
        let Some(req) = self.state.pending.disconnect.take() else {
            return;
        };
        info!("Disconnecting from network");
        self.restart_network();
        self.store_credentials("", "", 0);
        if req.flag {
            self.state.window.write_token(req.token);
        }
    }

    fn monitor_connection(&mut self) {
        if self.config_str(keys::WIFI_SSID).is_empty() {
            return;
        }
        let current = self.io.network.status();
        let previous = std::mem::replace(&mut self.previous_status, current);
        if current == previous {
            return;
        }
        let connection = self.io.network.connection();
        info!(
            ?previous,
            ?current,
            ssid = %connection.ssid,
            ipv4 = %connection.ipv4_address,
            "Network status changed"
        );
        if current == ConnectionStatus::BadAuthError {
            warn!("Bad authentication, credentials cleared");
            self.restart_network();
            self.store_credentials("", "", 0);
            self.connect_stored();
        } else if current.is_retryable() {
            warn!("Connection failed, resetting network");
            self.restart_network();
            self.connect_stored();
        }
    }

    fn refresh_network(&mut self) {
        let mut networks = self.io.network.scan_results();
        networks.truncate(MAX_NETWORKS);
        self.state.set_network(NetworkSnapshot {
            scan: WifiScanData { networks },
            connection: self.io.network.connection(),
        });
    }

    fn folder_count(&self, dir: &str) -> u32 {
        self.io.storage.list_dir(dir).map(|f| f.len() as u32).unwrap_or(0)
    }

    fn refresh_sd_card(&mut self) {
        let mounted = self.state.storage_mounted();
        let mut data = SdCardData {
            roms_folder: self.config_str(keys::ROMS_FOLDER),
            floppies_folder: self.config_str(keys::FLOPPIES_FOLDER),
            harddisks_folder: HARDDISKS_FOLDER.to_string(),
            status: if mounted {
                SD_CARD_MOUNTED
            } else {
                SD_CARD_NOT_MOUNTED
            },
            roms_folder_status: ROMS_FOLDER_NOTFOUND,
            floppies_folder_status: FLOPPIES_FOLDER_NOTFOUND,
            harddisks_folder_status: HARDDISKS_FOLDER_NOTFOUND,
            ..SdCardData::default()
        };
        if mounted {
            let storage = &self.io.storage;
            if storage.dir_exists(&data.roms_folder) {
                data.roms_folder_status = ROMS_FOLDER_OK;
            }
            if storage.dir_exists(&data.floppies_folder) {
                data.floppies_folder_status = FLOPPIES_FOLDER_OK;
            }
            if storage.dir_exists(&data.harddisks_folder) {
                data.harddisks_folder_status = HARDDISKS_FOLDER_OK;
            }
            match storage.usage() {
                Ok(usage) => {
                    data.sd_size = usage.total_mb;
                    data.sd_free_space = usage.free_mb;
                }
                Err(e) => warn!("Card usage unavailable: {}", e),
            }
            data.roms_folder_count = self.folder_count(&data.roms_folder);
            data.floppies_folder_count = self.folder_count(&data.floppies_folder);
            data.harddisks_folder_count = self.folder_count(&data.harddisks_folder);
        }
        self.state.set_sd_card(data);
    }

    /// Writes a response, logging (not propagating) overflow, then the token.
    fn respond(&self, what: &str, token: u32, payload: &[u8]) {
        let window = &self.state.window;
        if let Err(e) = window.respond(token, payload) {
            error!(what, "Response dropped: {}", e);
            window.zero_payload();
            window.write_token(token);
        }
    }

    fn service_deferred(&mut self) {
        let state = Arc::clone(&self.state);
        let pending = &state.pending;

        if pending.scan_networks.take().is_some() {
            debug!("Scan requested by host");
            if let Err(e) = self.io.network.start_scan() {
                warn!("Scan failed: {}", e);
            }
        }
        if let Some(req) = pending.persist_config.take() {
            if let Err(e) = self.persist_config() {
                error!("Saving configuration failed: {}", e);
            }
            self.state.window.write_token(req.token);
        }
        if let Some(req) = pending.latest_release.take() {
            self.latest_release(req.token);
        }
        if let Some(req) = pending.roms_json.take() {
            self.fetch_rom_index(req.token);
        }
        if let Some(req) = pending.list_roms.take() {
            self.rom_files = self.list_folder(keys::ROMS_FOLDER, true);
            let wire = encode_file_list(&self.rom_files, self.state.window.capacity());
            self.respond("ROM list", req.token, &wire);
        }
        if let Some(req) = pending.list_floppies.take() {
            self.floppy_files = self.list_folder(keys::FLOPPIES_FOLDER, false);
            let wire = encode_file_list(&self.floppy_files, self.state.window.capacity());
            self.respond("floppy list", req.token, &wire);
        }
        if let Some(req) = pending.query_floppy_db.take() {
            self.query_floppy_db(req.param as u8 as char, req.token);
        }
        if let Some(captured) = pending.create_floppy.take() {
            match captured.decode::<FloppyRequest>() {
                Ok(request) => self.create_floppy(&request),
                Err(e) => warn!("CREATE_FLOPPY payload rejected: {}", e),
            }
            self.state.window.write_token(captured.token);
        }
    }

    fn list_folder(&mut self, key: &str, roms: bool) -> Vec<String> {
        let folder = self.config_str(key);
        let allowed = if roms {
            &self.profile.rom_extensions
        } else {
            &self.profile.floppy_extensions
        };
        match self.io.storage.list_dir(&folder) {
            Ok(names) => {
                let kept = filter_and_sort(names, allowed);
                debug!(%folder, files = kept.len(), "Folder listed");
                kept
            }
            Err(e) => {
                error!(%folder, "Listing failed: {}", e);
                Vec::new()
            }
        }
    }

    fn latest_release(&mut self, token: u32) {
        self.state.window.zero_payload();
        let url = self.profile.latest_release_url.clone();
        let latest = self
            .io
            .http
            .get(&url)
            .and_then(|body| Ok(serde_json::from_slice::<serde_json::Value>(&body)?))
            .and_then(|json| {
                json.get("tag_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| FirmwareError::Catalog("release without tag_name".into()))
            });
        match latest {
            Ok(tag) if tag != self.profile.release_version => {
                info!(current = %self.profile.release_version, latest = %tag, "New version available");
                let mut wire = tag.into_bytes();
                wire.push(0);
                if wire.len() % 2 != 0 {
                    wire.push(0);
                }
                swap_words(&mut wire);
                self.respond("latest release", token, &wire);
                return;
            }
            Ok(_) => debug!("No new version available"),
            Err(e) => warn!("Latest release check failed: {}", e),
        }
        self.state.window.write_token(token);
    }

    fn fetch_rom_index(&mut self, token: u32) {
        self.state.window.zero_payload();
        let url = self.config_str(keys::ROMS_YAML_URL);
        self.rom_index = match self.io.http.get(&url).and_then(|b| parse_rom_index(&b)) {
            Ok(items) => items,
            Err(e) => {
                error!(%url, "ROM index unavailable: {}", e);
                Vec::new()
            }
        };
        let labels: Vec<String> = self.rom_index.iter().map(rom_index_label).collect();
        let wire = encode_name_list(&labels, self.state.window.capacity());
        self.respond("ROM index", token, &wire);
    }

    fn query_floppy_db(&mut self, letter: char, token: u32) {
        let base = self.config_str(keys::FLOPPY_DB_URL);
        let url = format!("{}/db/{}.csv", base.trim_end_matches('/'), letter);
        debug!(%url, "Querying floppy database");
        let rows = self.with_trigger_masked(|c| {
            c.state.window.zero_payload();
            c.io.http.get(&url).and_then(|b| parse_floppy_db(&b))
        });
        self.floppy_db = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!(%url, "Floppy database unavailable: {}", e);
                Vec::new()
            }
        };
        let names: Vec<&str> = self.floppy_db.iter().map(|r| r.name.as_str()).collect();
        let wire = encode_name_list(&names, self.state.window.capacity());
        self.respond("floppy database", token, &wire);
    }

    fn create_floppy(&mut self, request: &FloppyRequest) {
        if request.template == 0 {
            debug!("Blank floppy request without template, ignored");
            return;
        }
        let folder = self.config_str(keys::FLOPPIES_FOLDER);
        let name = format!("{}.st.rw", request.floppy_name);
        let path = format!("{}/{}", folder.trim_end_matches('/'), name);
        info!(%path, "Creating blank floppy");
        let result = self.with_trigger_masked(|c| {
            if !c.io.storage.dir_exists(&folder) {
                return Err(FirmwareError::NotFound(folder.clone()));
            }
            c.io.images.create_blank_st(
                c.io.storage.as_mut(),
                &path,
                &request.volume_name,
                request.geometry(),
                request.overwrite,
            )
        });
        match result {
            Ok(()) => {
                info!(%path, "Blank floppy created");
                self.refresh_sd_card();
            }
            Err(e) => error!(%path, "Create blank ST image error: {}", e),
        }
    }
}
