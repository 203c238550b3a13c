// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Runs a host script against a board wired to host-side collaborators.

use crate::dir_storage::DirStorage;
use anyhow::{Context, Result};
use rombridge_config::{
    keys, ConfigBackend, ConfigStore, DataType, DeviceProfile, FileBackend, HostScript,
    HostStep, MemoryBackend,
};
use rombridge_core::memory::{FLASH_ROM_LOAD_OFFSET, ROM_SIZE_BYTES};
use rombridge_core::protocol::Command;
use rombridge_core::services::{
    Clock, ConnectionData, ConnectionStatus, FloppyRequest, SdCardData, WifiNetworkAuthInfo,
    WifiNetworkInfo, WifiScanData,
};
use rombridge_core::sim::{FixtureHttp, MemFlash, SimNetwork};
use rombridge_core::{Board, BootOutcome, Collaborators, FwResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens handed out to steps that do not pick their own.
const TOKEN_BASE: u32 = 0x5344_0000;

/// What the host puts on the bus for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Plain,
    Index(u16),
    Put(DataType, String, String),
    Connect(WifiNetworkAuthInfo),
    Letter(char),
    Floppy(FloppyRequest),
}

#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub command: Command,
    pub token: Option<u32>,
    pub request: Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<u32>,
    /// The token echoed, or for credentials the link came up.
    pub completed: bool,
    pub iterations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

fn required<T: Clone>(value: &Option<T>, field: &str, command: Command) -> Result<T> {
    value
        .clone()
        .with_context(|| format!("Step '{}' requires '{}'", command.name(), field))
}

/// Checks a step against its command and resolves its token.
pub fn plan_step(step: &HostStep, position: usize) -> Result<PlannedStep> {
    let command: Command = step
        .command
        .parse()
        .map_err(|e: String| anyhow::anyhow!("Step {}: {}", position, e))?;

    let request = match command {
        Command::PutConfigString | Command::PutConfigInteger | Command::PutConfigBool => {
            let data_type = match command {
                Command::PutConfigInteger => DataType::Int,
                Command::PutConfigBool => DataType::Bool,
                _ => DataType::String,
            };
            Request::Put(
                data_type,
                required(&step.key, "key", command)?,
                required(&step.value, "value", command)?,
            )
        }
        Command::ConnectNetwork => Request::Connect(WifiNetworkAuthInfo {
            ssid: required(&step.ssid, "ssid", command)?,
            password: step.password.clone().unwrap_or_default(),
            auth_mode: step.auth_mode.unwrap_or(0),
        }),
        Command::QueryFloppyDb => Request::Letter(required(&step.letter, "letter", command)?),
        Command::CreateFloppy => {
            let floppy = required(&step.floppy, "floppy", command)?;
            Request::Floppy(FloppyRequest {
                template: floppy.template,
                tracks: floppy.tracks,
                sectors: floppy.sectors,
                sides: floppy.sides,
                overwrite: floppy.overwrite,
                volume_name: floppy.volume,
                floppy_name: floppy.name,
            })
        }
        Command::DownloadRom
        | Command::LoadRom
        | Command::LoadFloppyRo
        | Command::LoadFloppyRw
        | Command::DownloadFloppy => Request::Index(required(&step.index, "index", command)?),
        _ => Request::Plain,
    };

    let token = command
        .carries_token()
        .then(|| step.token.unwrap_or(TOKEN_BASE + position as u32 + 1));

    Ok(PlannedStep {
        command,
        token,
        request,
    })
}

/// Everything a finished session reports.
#[derive(Debug)]
pub struct SessionReport {
    pub steps: Vec<StepRecord>,
    pub outcome: Option<BootOutcome>,
    pub iterations: u64,
    pub flash_hash: String,
    pub config: ConfigStore,
}

impl SessionReport {
    /// `BOOT_FEATURE` registered by the boot, or the stored one when the
    /// loop never ended.
    pub fn boot_feature(&self) -> Option<String> {
        self.outcome
            .and_then(|o| o.feature)
            .map(|f| f.as_str().to_string())
            .or_else(|| self.config.get_str(keys::BOOT_FEATURE).map(str::to_string))
    }
}

pub struct Session {
    board: Board,
    flash: MemFlash,
    max_iterations: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

/// Joins `value` to the script's directory unless it is absolute.
pub fn resolve_script_path(script_path: &Path, value: &str) -> std::path::PathBuf {
    let p = std::path::PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}

fn build_http(
    script_path: &Path,
    script: &HostScript,
    profile: &DeviceProfile,
) -> Result<FixtureHttp> {
    let mut http = FixtureHttp::new();
    for (url, file) in &script.network.http {
        let path = resolve_script_path(script_path, file);
        let body = std::fs::read(&path)
            .with_context(|| format!("Failed to read HTTP fixture {:?} for {}", path, url))?;
        http = http.with(url, &body);
    }
    if let Some(tag) = &script.network.latest_release {
        let body = serde_json::to_vec(&serde_json::json!({ "tag_name": tag }))?;
        http = http.with(&profile.latest_release_url, &body);
    }
    Ok(http)
}

fn build_network(script: &HostScript) -> SimNetwork {
    let in_range = script
        .network
        .networks
        .iter()
        .map(|n| WifiNetworkInfo {
            ssid: n.ssid.clone(),
            bssid: n.bssid.clone(),
            auth_mode: n.auth_mode,
        })
        .collect();
    let mut network = SimNetwork::new(in_range);
    if let Some(password) = &script.network.password {
        network = network.with_password(password);
    }
    if let Some(ipv4) = &script.network.ipv4 {
        network = network.with_ipv4(ipv4);
    }
    network
}

impl Session {
    /// Wires the board for `script`. Failures here are configuration errors.
    pub fn prepare(
        script_path: &Path,
        script: &HostScript,
        profile: &DeviceProfile,
        clock: Arc<dyn Clock>,
        seed: u64,
    ) -> Result<Self> {
        let sd_root = resolve_script_path(script_path, &script.inputs.sd_root);
        let config_backend: Box<dyn ConfigBackend> = match &script.inputs.config_image {
            Some(image) => Box::new(FileBackend::new(resolve_script_path(script_path, image))),
            None => Box::new(MemoryBackend::new()),
        };
        let flash = MemFlash::default();

        let io = Collaborators {
            storage: Box::new(DirStorage::new(&sd_root)),
            network: Box::new(build_network(script)),
            http: Box::new(build_http(script_path, script, profile)?),
            flash: Box::new(flash.clone()),
            config_backend,
            clock,
            ..Collaborators::simulated()
        };

        let mut board = Board::new(profile, io, seed).context("Failed to wire the board")?;
        info!(sd_root = %sd_root.display(), "Starting configurator");
        board.configurator_mut().init();

        Ok(Self {
            board,
            flash,
            max_iterations: script.limits.max_iterations_per_step,
        })
    }

    /// Drives every step until the loop ends. Bus faults abort the session.
    pub fn run(mut self, steps: &[PlannedStep]) -> FwResult<SessionReport> {
        let mut records = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if self.board.configurator().outcome().is_some() {
                warn!(skipped = steps.len() - i, "Boot selected, remaining steps skipped");
                break;
            }
            records.push(self.execute(step)?);
        }

        let outcome = self.board.configurator().outcome();
        if let Some(outcome) = outcome {
            info!(?outcome, "Configurator finished");
            self.board.configurator_mut().reboot();
        }

        let mut hasher = Sha256::new();
        hasher.update(self.flash.read(FLASH_ROM_LOAD_OFFSET, 2 * ROM_SIZE_BYTES as usize));
        let config = self.board.state().config().clone();

        Ok(SessionReport {
            steps: records,
            outcome,
            iterations: self.board.configurator().iterations(),
            flash_hash: format!("{:x}", hasher.finalize()),
            config,
        })
    }

    fn execute(&mut self, step: &PlannedStep) -> FwResult<StepRecord> {
        let command = step.command;
        debug!(%command, token = ?step.token, "Host request");

        let (completed, iterations) = match (&step.request, step.token) {
            (Request::Connect(auth), _) => self.connect(auth)?,
            (request, Some(token)) => {
                let ex = self.board.exchange(token, self.max_iterations, |h| match request {
                    Request::Plain => h.send(command, token, &[]),
                    Request::Index(index) => h.send_index(command, token, *index),
                    Request::Put(data_type, key, value) => {
                        h.put_config(token, *data_type, key, value)
                    }
                    Request::Letter(letter) => h.query_floppy_db(token, *letter),
                    Request::Floppy(floppy) => h.create_floppy(token, floppy),
                    Request::Connect(_) => Ok(()),
                })?;
                (ex.echoed, ex.steps)
            }
            (_, None) => (false, 0),
        };

        if !completed {
            warn!(%command, iterations, "Request did not complete");
        }
        let response = if completed {
            self.capture(command)?
        } else {
            None
        };

        Ok(StepRecord {
            command: command.name().to_string(),
            token: step.token,
            completed,
            iterations,
            response,
        })
    }

    /// Credentials carry no token: step until the link comes up.
    fn connect(&mut self, auth: &WifiNetworkAuthInfo) -> FwResult<(bool, u64)> {
        self.board.host().connect(auth)?;
        let mut steps = 0;
        while steps < self.max_iterations {
            self.board.configurator_mut().step();
            steps += 1;
            let status = self.board.state().network().connection.status;
            if status == ConnectionStatus::ConnectedWifiIp {
                return Ok((true, steps));
            }
        }
        Ok((false, steps))
    }

    fn capture(&self, command: Command) -> FwResult<Option<String>> {
        let host = self.board.host();
        let text = match command {
            Command::ListRoms
            | Command::ListFloppies
            | Command::GetRomsJsonFile
            | Command::QueryFloppyDb => host.read_names()?.join("\n"),
            Command::GetLatestRelease => host.read_string()?,
            Command::GetConfig => host.read_wire::<ConfigStore>()?.table(),
            Command::GetScannedNetworks => {
                let scan: WifiScanData = host.read_wire()?;
                scan.networks
                    .iter()
                    .map(|n| n.ssid.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Command::GetIpData => {
                let c: ConnectionData = host.read_wire()?;
                format!("{} {} {:?}", c.ssid, c.ipv4_address, c.status)
            }
            Command::GetSdData => {
                let sd: SdCardData = host.read_wire()?;
                format!(
                    "{} ({}) {} ({}) {} ({}) {}MB free of {}MB",
                    sd.roms_folder,
                    sd.roms_folder_count,
                    sd.floppies_folder,
                    sd.floppies_folder_count,
                    sd.harddisks_folder,
                    sd.harddisks_folder_count,
                    sd.sd_free_space,
                    sd.sd_size
                )
            }
            Command::DownloadFloppy => format!("status {}", host.read_word(0)?),
            _ => return Ok(None),
        };
        Ok(Some(text))
    }
}
