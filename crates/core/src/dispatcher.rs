// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::codec::{decode_padded, WireCodec};
use crate::pending::{Captured, PendingCell, Request};
use crate::protocol::{Category, Command, TransmissionProtocol};
use crate::state::FirmwareState;
use crate::FwResult;
use rombridge_config::ConfigEntry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest read-back struct, rounded up.
const RESPONSE_SCRATCH: usize = 4096;

/// Offset of the first parameter after the token.
const PARAM_OFFSET: usize = 4;

/// Maps captured commands to actions. Runs in interrupt context: no I/O,
/// no allocation, no waiting on a lock. Results go to the window or to
/// the pending set.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: Arc<FirmwareState>,
}

impl Dispatcher {
    pub fn new(state: Arc<FirmwareState>) -> Self {
        Self { state }
    }

    pub fn dispatch(&self, t: &TransmissionProtocol) {
        let Some(command) = t.command() else {
            debug!(
                command = t.command_id,
                payload_size = t.payload_size,
                "Unknown command, ignored"
            );
            return;
        };
        debug!(%command, payload_size = t.payload_size, "Dispatching");

        if command.carries_token() && command != Command::DisconnectNetwork && !t.has_token() {
            warn!(%command, "Request without token, ignored");
            return;
        }

        if command.requires_storage() && !self.state.storage_mounted() {
            debug!(%command, "microSD card not mounted, request refused");
            self.state.window.zero_payload();
            return;
        }

        match command.category() {
            Category::ImmediateReadBack => self.read_back(command, t.token()),
            Category::ImmediateMutation => self.mutate(command, t),
            Category::Deferred => self.defer(command, t),
        }
    }

    fn defer(&self, command: Command, t: &TransmissionProtocol) {
        let token = t.token();
        let pending = &self.state.pending;
        match command {
            Command::DownloadRom => self.select(command, &pending.rom_network, t, false),
            Command::LoadRom => self.select(command, &pending.rom_file, t, false),
            Command::LoadFloppyRo => self.select(command, &pending.floppy_file, t, false),
            Command::LoadFloppyRw => self.select(command, &pending.floppy_file, t, true),
            Command::DownloadFloppy => self.select(command, &pending.floppy_download, t, false),
            Command::ListRoms => pending.list_roms.set(Request::new(0, token)),
            Command::ListFloppies => pending.list_floppies.set(Request::new(0, token)),
            Command::SaveConfig => pending.persist_config.set(Request::new(0, token)),
            Command::ResetDevice => pending.reset.set(Request::new(0, token)),
            Command::GetRomsJsonFile => pending.roms_json.set(Request::new(0, token)),
            Command::GetLatestRelease => pending.latest_release.set(Request::new(0, token)),
            Command::BootRtc => pending.boot_rtc.set(Request::new(0, token)),
            // Acknowledged right away; the loop only starts the scan.
            Command::LaunchScanNetworks => {
                pending.scan_networks.set(Request::new(0, token));
                self.state.window.write_token(token);
            }
            Command::DisconnectNetwork => pending
                .disconnect
                .set(Request::new(0, token).with_flag(t.has_token())),
            Command::QueryFloppyDb => {
                let letter = (t.param_u16(PARAM_OFFSET) & 0xFF) as u8;
                let letter = letter.to_ascii_lowercase();
                debug!(letter = %char::from(letter), "Floppy database query");
                pending
                    .query_floppy_db
                    .set(Request::new(u16::from(letter), token));
            }
            Command::CreateFloppy => {
                let params = t.payload_from(PARAM_OFFSET);
                if pending.create_floppy.post(Captured::new(token, params)) {
                    debug!(bytes = params.len(), "Blank floppy requested");
                } else {
                    warn!(%command, "Request slot busy in the loop, dropped");
                }
            }
            other => debug!(command = %other, "Not a deferred command"),
        }
    }

    /// Boot selections take a 1-based list index.
    fn select(&self, command: Command, cell: &PendingCell, t: &TransmissionProtocol, flag: bool) {
        let index = t.param_u16(PARAM_OFFSET);
        if index == 0 {
            warn!(%command, "Index 0 is not a valid selection, ignored");
            return;
        }
        debug!(%command, index, "Selection recorded");
        cell.set(Request::new(index, t.token()).with_flag(flag));
    }

    /// Copies a snapshot into the window, then the token. A snapshot the
    /// loop is updating right now is not waited for: the payload is zeroed
    /// and no token is written, so the host retries.
    fn read_back(&self, command: Command, token: u32) {
        let state = &self.state;
        let written = match command {
            Command::GetConfig => state.try_config().map(|c| self.write_snapshot(&*c)),
            Command::GetScannedNetworks => state.try_network().map(|n| self.write_snapshot(&n.scan)),
            Command::GetIpData => state
                .try_network()
                .map(|n| self.write_snapshot(&n.connection)),
            Command::GetSdData => state.try_sd_card().map(|sd| self.write_snapshot(&*sd)),
            other => {
                debug!(command = %other, "No snapshot for command");
                return;
            }
        };
        let window = &state.window;
        match written {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(%command, "Read-back failed: {}", e);
                window.zero_payload();
            }
            None => {
                warn!(%command, "Snapshot busy in the loop, request dropped");
                window.zero_payload();
                return;
            }
        }
        window.write_token(token);
    }

    fn write_snapshot<T: WireCodec>(&self, value: &T) -> FwResult<()> {
        let mut scratch = [0u8; RESPONSE_SCRATCH];
        let n = value.encode_into(&mut scratch)?;
        self.state.window.write_payload(0, &scratch[..n])
    }

    fn mutate(&self, command: Command, t: &TransmissionProtocol) {
        match command {
            Command::PutConfigString | Command::PutConfigInteger | Command::PutConfigBool => {
                self.put_config(command, t)
            }
            // No token: the host polls the connection status instead.
            Command::ConnectNetwork => {
                if self.state.pending.wifi_auth.post(Captured::new(0, t.payload())) {
                    debug!(bytes = t.payload().len(), "Credentials received");
                } else {
                    warn!(%command, "Request slot busy in the loop, dropped");
                }
            }
            other => debug!(command = %other, "Not a mutation"),
        }
    }

    fn put_config(&self, command: Command, t: &TransmissionProtocol) {
        let token = t.token();
        let entry = match decode_padded::<ConfigEntry>(t.payload_from(PARAM_OFFSET)) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%command, "Config entry rejected: {}", e);
                self.state.window.write_token(token);
                return;
            }
        };
        let Some(mut config) = self.state.try_config() else {
            warn!(%command, key = %entry.key, "Config busy in the loop, update dropped");
            return;
        };
        let result = match command {
            Command::PutConfigInteger => config.put_integer(&entry.key, entry.as_int()),
            Command::PutConfigBool => config.put_bool(&entry.key, entry.as_bool()),
            _ => config.put_string(&entry.key, &entry.value),
        };
        drop(config);
        match result {
            Ok(()) => debug!(key = %entry.key, value = %entry.value, "Config updated"),
            Err(e) => warn!(key = %entry.key, "Config update rejected: {}", e),
        }
        self.state.window.write_token(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryMap, RomMemory};
    use crate::services::{FloppyRequest, WifiNetworkAuthInfo};
    use crate::window::SharedWindow;
    use rombridge_config::{keys, ConfigStore};
    use std::sync::mpsc;
    use std::time::Duration;

    fn state() -> Arc<FirmwareState> {
        let map = MemoryMap::default();
        let window = SharedWindow::new(Arc::new(RomMemory::for_map(&map)), map);
        let state = Arc::new(FirmwareState::new(window, ConfigStore::defaults()));
        state.set_storage_mounted(true);
        state
    }

    fn request(command: Command, token: u32, params: &[u8]) -> TransmissionProtocol {
        let mut payload = token.to_le_bytes().to_vec();
        payload.extend_from_slice(params);
        TransmissionProtocol::new(command.id(), &payload)
    }

    #[test]
    fn test_unknown_command_has_no_effect() {
        let state = state();
        let d = Dispatcher::new(state.clone());
        state.window.memory().set_journaling(true);
        d.dispatch(&TransmissionProtocol::new(99, &[1, 2, 3, 4]));
        assert!(state.window.memory().take_journal().is_empty());
        assert!(!state.pending.has_boot_selection());
    }

    #[test]
    fn test_load_rom_records_index_and_token() {
        let state = state();
        Dispatcher::new(state.clone()).dispatch(&request(Command::LoadRom, 0x1111_2222, &[3, 0]));
        let req = state.pending.rom_file.peek().unwrap();
        assert_eq!(req.param, 3);
        assert_eq!(req.token, 0x2222_1111);
        // Deferred: nothing echoed yet.
        assert_eq!(state.window.token(), 0);
    }

    #[test]
    fn test_load_rom_unmounted_zeroes_window() {
        let state = state();
        state.set_storage_mounted(false);
        state.window.write_payload(0, &[0xAA; 64]).unwrap();
        Dispatcher::new(state.clone()).dispatch(&request(Command::LoadRom, 5, &[1, 0]));
        assert!(state.pending.rom_file.peek().is_none());
        let mut out = [0xFFu8; 64];
        state.window.read_payload(0, &mut out).unwrap();
        assert_eq!(out, [0u8; 64]);
        assert_eq!(state.window.token(), 0);
    }

    #[test]
    fn test_index_zero_is_ignored() {
        let state = state();
        Dispatcher::new(state.clone()).dispatch(&request(Command::DownloadRom, 5, &[0, 0]));
        assert!(!state.pending.has_boot_selection());
    }

    #[test]
    fn test_put_config_then_token() {
        let state = state();
        let entry = ConfigEntry::string(keys::HOSTNAME, "falcon");
        state.window.memory().set_journaling(true);
        Dispatcher::new(state.clone()).dispatch(&request(
            Command::PutConfigString,
            0x0000_0001,
            &entry.encode(),
        ));
        assert_eq!(state.config().get_str(keys::HOSTNAME), Some("falcon"));
        let journal = state.window.memory().take_journal();
        assert_eq!(journal.len(), 1);
        assert!(journal[0].release);
        assert_eq!(state.window.token(), 0x0001_0000);
    }

    #[test]
    fn test_put_config_coerces_types() {
        let state = state();
        let d = Dispatcher::new(state.clone());
        let int_entry = ConfigEntry::string(keys::WIFI_SCAN_SECONDS, "30s");
        d.dispatch(&request(Command::PutConfigInteger, 1, &int_entry.encode()));
        let bool_entry = ConfigEntry::string("SAFE_MODE", "true");
        d.dispatch(&request(Command::PutConfigBool, 2, &bool_entry.encode()));
        let config = state.config();
        assert_eq!(config.get_str(keys::WIFI_SCAN_SECONDS), Some("30"));
        assert_eq!(config.get_bool("SAFE_MODE"), Some(true));
    }

    #[test]
    fn test_get_config_writes_table_before_token() {
        let state = state();
        state.window.memory().set_journaling(true);
        Dispatcher::new(state.clone()).dispatch(&request(Command::GetConfig, 0xABCD_0123, &[]));
        let journal = state.window.memory().take_journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].len, 1644);
        assert!(journal[1].release);

        let mut wire = vec![0u8; 1644];
        state.window.read_payload(0, &mut wire).unwrap();
        assert_eq!(ConfigStore::decode(&wire).unwrap(), *state.config());
    }

    #[test]
    fn test_scan_launch_acknowledges_immediately() {
        let state = state();
        Dispatcher::new(state.clone()).dispatch(&request(Command::LaunchScanNetworks, 9, &[]));
        assert!(state.pending.scan_networks.is_set());
        assert_eq!(state.window.token(), 9u32.rotate_left(16));
    }

    #[test]
    fn test_connect_network_has_no_token() {
        let state = state();
        let auth = WifiNetworkAuthInfo {
            ssid: "home".into(),
            password: "secret".into(),
            auth_mode: 3,
        };
        Dispatcher::new(state.clone())
            .dispatch(&TransmissionProtocol::new(Command::ConnectNetwork.id(), &auth.encode()));
        let captured = state.pending.wifi_auth.take().unwrap();
        assert_eq!(captured.decode::<WifiNetworkAuthInfo>().unwrap(), auth);
        assert_eq!(state.window.token(), 0);
    }

    #[test]
    fn test_query_letter_is_lowercased() {
        let state = state();
        Dispatcher::new(state.clone()).dispatch(&request(Command::QueryFloppyDb, 1, &[b'Q', 0]));
        assert_eq!(
            state.pending.query_floppy_db.peek().map(|r| r.param),
            Some(u16::from(b'q'))
        );
    }

    #[test]
    fn test_floppy_rw_flag() {
        let state = state();
        Dispatcher::new(state.clone()).dispatch(&request(Command::LoadFloppyRw, 1, &[2, 0]));
        let req = state.pending.floppy_file.peek().unwrap();
        assert!(req.flag);
        assert_eq!(req.param, 2);
    }

    #[test]
    fn test_create_floppy_short_payload_is_padded() {
        let state = state();
        // Only the numeric fields, no names.
        Dispatcher::new(state.clone()).dispatch(&request(
            Command::CreateFloppy,
            1,
            &[1, 0, 80, 0, 9, 0, 2, 0, 0, 0],
        ));
        let captured = state.pending.create_floppy.take().unwrap();
        assert_eq!(captured.token, 1u32.rotate_left(16));
        let req: FloppyRequest = captured.decode().unwrap();
        assert_eq!(req.tracks, 80);
        assert!(req.floppy_name.is_empty());
    }

    /// Runs one dispatch on another thread and reports whether it returned
    /// within a second.
    fn dispatch_elsewhere(state: &Arc<FirmwareState>, t: TransmissionProtocol) -> bool {
        let d = Dispatcher::new(state.clone());
        let (done, finished) = mpsc::channel();
        std::thread::spawn(move || {
            d.dispatch(&t);
            let _ = done.send(());
        });
        finished.recv_timeout(Duration::from_secs(1)).is_ok()
    }

    #[test]
    fn test_read_back_does_not_wait_for_the_loop() {
        let state = state();
        state.window.write_payload(0, &[0xAA; 64]).unwrap();
        let held = state.config();
        assert!(dispatch_elsewhere(&state, request(Command::GetConfig, 0x0042_0000, &[])));
        drop(held);
        assert_eq!(state.window.token(), 0);
        let mut out = [0xFFu8; 64];
        state.window.read_payload(0, &mut out).unwrap();
        assert_eq!(out, [0u8; 64]);

        let held = state.sd_card();
        assert!(dispatch_elsewhere(&state, request(Command::GetSdData, 1, &[])));
        drop(held);
        assert_eq!(state.window.token(), 0);

        // Once the loop lets go, the same request is answered.
        Dispatcher::new(state.clone()).dispatch(&request(Command::GetConfig, 0x0042_0000, &[]));
        assert_eq!(state.window.token(), 0x0000_0042);
    }

    #[test]
    fn test_put_config_does_not_wait_for_the_loop() {
        let state = state();
        let entry = ConfigEntry::string(keys::HOSTNAME, "falcon");
        let held = state.config();
        assert!(dispatch_elsewhere(
            &state,
            request(Command::PutConfigString, 5, &entry.encode())
        ));
        drop(held);
        assert_eq!(state.config().get_str(keys::HOSTNAME), Some("sidecart"));
        assert_eq!(state.window.token(), 0);
    }

    #[test]
    fn test_every_command_routes_by_category() {
        let state = state();
        let d = Dispatcher::new(state.clone());
        for command in Command::ALL {
            state.window.write_token(0);
            d.dispatch(&request(command, 0x0007_0000, &[1, 0]));
            let echoed = state.window.token() == 7;
            match command.category() {
                Category::ImmediateReadBack => assert!(echoed, "{} not answered", command),
                Category::ImmediateMutation => {}
                Category::Deferred => assert_eq!(
                    echoed,
                    command == Command::LaunchScanNetworks,
                    "{} answered early",
                    command
                ),
            }
        }
    }
}
