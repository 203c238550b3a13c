// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Boot selection: the terminal state of the configurator loop.
//!
//! The first pending selection in priority order wins; its completion
//! routine always publishes the token, and the boot feature is registered
//! only when every step before it succeeded.

use crate::catalog::{extract_filename, join_url};
use crate::codec::swap_words;
use crate::configurator::Configurator;
use crate::memory::{FLASH_ROM_LOAD_OFFSET, ROM_SIZE_BYTES};
use crate::pending::{PendingRequests, Request};
use crate::{FirmwareError, FwResult};
use rombridge_config::keys;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Floppy download completed.
pub const FLOPPY_DOWNLOAD_OK: u16 = 0;
/// `FLOPPIES_FOLDER` does not exist on the card.
pub const FLOPPY_DOWNLOAD_NO_FOLDER: u16 = 2;
pub const FLOPPY_DOWNLOAD_FAILED: u16 = 3;

const STEEM_HEADER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FloppyMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AltEmulator {
    Rtc,
}

/// What the host asked to boot. Indices are 1-based list positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootSelection {
    LocalRom(u16),
    NetworkRom(u16),
    LocalFloppy(u16, FloppyMode),
    FloppyDownload(u16),
    Reset,
    AltEmulator(AltEmulator),
}

/// Persisted `BOOT_FEATURE` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BootFeature {
    Configurator,
    RomEmulator,
    FloppyEmulator,
    RtcEmulator,
}

impl BootFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            BootFeature::Configurator => "CONFIGURATOR",
            BootFeature::RomEmulator => "ROM_EMULATOR",
            BootFeature::FloppyEmulator => "FLOPPY_EMULATOR",
            BootFeature::RtcEmulator => "RTC_EMULATOR",
        }
    }
}

impl fmt::Display for BootFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the configurator ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootOutcome {
    pub selection: BootSelection,
    /// `None` when the completion routine failed before registering it.
    pub feature: Option<BootFeature>,
}

impl BootSelection {
    /// Takes the highest-priority pending selection. Lower-priority ones
    /// pending at the same time are discarded.
    pub fn take(pending: &PendingRequests) -> Option<(BootSelection, u32)> {
        let cells = [
            &pending.rom_file,
            &pending.rom_network,
            &pending.floppy_file,
            &pending.floppy_download,
            &pending.reset,
            &pending.boot_rtc,
        ];
        let mut chosen: Option<(BootSelection, u32)> = None;
        for (rank, cell) in cells.iter().enumerate() {
            let Some(req) = cell.take() else { continue };
            let selection = Self::from_request(rank, req);
            match chosen {
                None => chosen = Some((selection, req.token)),
                Some((winner, _)) => {
                    debug!(?winner, dropped = ?selection, "Concurrent boot selection dropped")
                }
            }
        }
        chosen
    }

    fn from_request(rank: usize, req: Request) -> BootSelection {
        match rank {
            0 => BootSelection::LocalRom(req.param),
            1 => BootSelection::NetworkRom(req.param),
            2 => BootSelection::LocalFloppy(
                req.param,
                if req.flag {
                    FloppyMode::ReadWrite
                } else {
                    FloppyMode::ReadOnly
                },
            ),
            3 => BootSelection::FloppyDownload(req.param),
            4 => BootSelection::Reset,
            _ => BootSelection::AltEmulator(AltEmulator::Rtc),
        }
    }
}

/// Drops the 4-byte header of STEEM cartridge dumps (64K+4 or 128K+4
/// bytes starting with four zero bytes), or of any `.stc` download.
pub fn strip_cartridge_header<'a>(image: &'a [u8], name: &str) -> &'a [u8] {
    let len = image.len();
    let rom = ROM_SIZE_BYTES as usize;
    let sized = len == rom + STEEM_HEADER || len == 2 * rom + STEEM_HEADER;
    let zeroed = image.len() >= STEEM_HEADER && image[..STEEM_HEADER] == [0; STEEM_HEADER];
    let stc = name.to_ascii_lowercase().ends_with(".stc") && len >= STEEM_HEADER;
    if (sized && zeroed) || stc {
        debug!(name, "Skipping STEEM cartridge header");
        &image[STEEM_HEADER..]
    } else {
        image
    }
}

impl Configurator {
    /// Runs the completion routine of the winning selection.
    pub(crate) fn complete_boot(&mut self, selection: BootSelection, token: u32) -> BootOutcome {
        info!(?selection, "Boot selection");
        let result = match selection {
            BootSelection::LocalRom(index) => self.boot_local_rom(index),
            BootSelection::NetworkRom(index) => self.boot_network_rom(index),
            BootSelection::LocalFloppy(index, mode) => self.boot_local_floppy(index, mode),
            BootSelection::FloppyDownload(index) => self.boot_floppy_download(index),
            BootSelection::Reset => self.boot_reset(),
            BootSelection::AltEmulator(AltEmulator::Rtc) => {
                self.register_feature(BootFeature::RtcEmulator).map(Some)
            }
        };
        let feature = match result {
            Ok(feature) => feature,
            Err(e) => {
                error!(?selection, "Boot completion failed: {}", e);
                None
            }
        };
        self.state.window.write_token(token);
        BootOutcome { selection, feature }
    }

    fn register_feature(&mut self, feature: BootFeature) -> FwResult<BootFeature> {
        self.state.config().put_string(keys::BOOT_FEATURE, feature.as_str())?;
        self.persist_config()?;
        info!(%feature, "Boot feature registered");
        Ok(feature)
    }

    fn listed<'a>(list: &'a [String], index: u16, what: &str) -> FwResult<&'a String> {
        list.get(usize::from(index).wrapping_sub(1))
            .ok_or_else(|| FirmwareError::NotFound(format!("{} #{}", what, index)))
    }

    fn program_rom(&mut self, image: &[u8]) -> FwResult<()> {
        let capacity = 2 * ROM_SIZE_BYTES as usize;
        if image.len() > capacity {
            return Err(FirmwareError::Image(format!(
                "ROM image of {} bytes exceeds the {} byte banks",
                image.len(),
                capacity
            )));
        }
        self.io
            .flash
            .erase(FLASH_ROM_LOAD_OFFSET, 2 * ROM_SIZE_BYTES)?;
        let mut swapped = image.to_vec();
        swap_words(&mut swapped);
        self.io.flash.program(FLASH_ROM_LOAD_OFFSET, &swapped)?;
        info!(bytes = image.len(), "ROM image programmed");
        Ok(())
    }

    fn boot_local_rom(&mut self, index: u16) -> FwResult<Option<BootFeature>> {
        let name = Self::listed(&self.rom_files, index, "ROM")?.clone();
        let folder = self.config_str(keys::ROMS_FOLDER);
        let path = format!("{}/{}", folder.trim_end_matches('/'), name);
        let image = self.io.storage.read_file(&path)?;
        self.program_rom(strip_cartridge_header(&image, &name))?;
        self.register_feature(BootFeature::RomEmulator).map(Some)
    }

    fn boot_network_rom(&mut self, index: u16) -> FwResult<Option<BootFeature>> {
        let url = usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.rom_index.get(i))
            .map(|info| info.url.clone())
            .ok_or_else(|| FirmwareError::NotFound(format!("network ROM #{}", index)))?;
        let image = self.io.http.get(&url)?;
        self.program_rom(strip_cartridge_header(&image, &url))?;
        self.register_feature(BootFeature::RomEmulator).map(Some)
    }

    fn boot_local_floppy(&mut self, index: u16, mode: FloppyMode) -> FwResult<Option<BootFeature>> {
        let name = Self::listed(&self.floppy_files, index, "floppy")?.clone();
        let folder = self.config_str(keys::FLOPPIES_FOLDER);
        let folder = folder.trim_end_matches('/');

        let is_msa = name.len() > 4 && name.to_ascii_lowercase().ends_with(".msa");
        let image = if is_msa {
            let st = format!("{}.ST", &name[..name.len() - 4]);
            debug!(from = %name, to = %st, "MSA to ST");
            self.with_trigger_masked(|c| {
                c.io.images.msa_to_st(
                    c.io.storage.as_mut(),
                    &format!("{}/{}", folder, name),
                    &format!("{}/{}", folder, st),
                    true,
                )
            })?;
            st
        } else {
            name
        };

        let image = if mode == FloppyMode::ReadWrite && !image.ends_with(".rw") {
            let rw = format!("{}.rw", image);
            let copied = self.with_trigger_masked(|c| {
                c.io.storage.copy_file(
                    &format!("{}/{}", folder, image),
                    &format!("{}/{}", folder, rw),
                    false,
                )
            });
            match copied {
                Ok(()) => debug!(image = %rw, "Read-write copy created"),
                Err(FirmwareError::AlreadyExists(_)) => debug!(image = %rw, "Reusing read-write copy"),
                Err(e) => return Err(e),
            }
            rw
        } else {
            image
        };

        self.register_floppy(&image).map(Some)
    }

    fn register_floppy(&mut self, image: &str) -> FwResult<BootFeature> {
        self.state.config().put_string(keys::FLOPPY_IMAGE_A, image)?;
        let feature = self.register_feature(BootFeature::FloppyEmulator)?;
        self.io.signal.blink('F');
        Ok(feature)
    }

    fn boot_floppy_download(&mut self, index: u16) -> FwResult<Option<BootFeature>> {
        let remote = usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.floppy_db.get(i))
            .cloned()
            .ok_or_else(|| FirmwareError::NotFound(format!("remote floppy #{}", index)))?;
        let url = join_url(&self.config_str(keys::FLOPPY_DB_URL), &remote.url);
        let filename = extract_filename(&remote.url).to_string();
        let folder = self.config_str(keys::FLOPPIES_FOLDER);
        debug!(%url, name = %remote.name, %filename, "Downloading floppy");

        let (status, outcome) = if !self.io.storage.dir_exists(&folder) {
            warn!(%folder, "Floppies folder does not exist");
            (FLOPPY_DOWNLOAD_NO_FOLDER, Ok(None))
        } else {
            let path = format!("{}/{}", folder.trim_end_matches('/'), filename);
            let downloaded = self
                .io
                .http
                .get(&url)
                .and_then(|data| self.io.storage.write_file(&path, &data, true));
            match downloaded {
                Err(e) => {
                    error!(%url, "Download floppy error: {}", e);
                    (FLOPPY_DOWNLOAD_FAILED, Ok(None))
                }
                Ok(()) => (
                    FLOPPY_DOWNLOAD_OK,
                    self.register_floppy(&filename).map(Some),
                ),
            }
        };
        self.state.window.write_payload_u16(0, status)?;
        outcome
    }

    fn boot_reset(&mut self) -> FwResult<Option<BootFeature>> {
        info!("Resetting configuration to default");
        self.state.config().reset_default();
        self.persist_config()?;
        Ok(None)
    }
}
