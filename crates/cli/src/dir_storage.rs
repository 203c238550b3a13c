// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! A host directory standing in for the microSD card.

use rombridge_core::services::{Storage, StorageUsage};
use rombridge_core::{FirmwareError, FwResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Reported card capacity.
pub const CARD_SIZE_MB: u32 = 4096;

#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
    mounted: bool,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    /// Maps a card path under the root. `..` and drive prefixes are refused
    /// so that host-supplied names cannot leave the card.
    fn host_path(&self, path: &str) -> FwResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(FirmwareError::Storage(format!(
                "path '{}' leaves the card",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_mounted(&self) -> FwResult<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(FirmwareError::NotMounted)
        }
    }
}

fn map_io(path: &str, e: std::io::Error) -> FirmwareError {
    match e.kind() {
        ErrorKind::NotFound => FirmwareError::NotFound(path.to_string()),
        ErrorKind::AlreadyExists => FirmwareError::AlreadyExists(path.to_string()),
        _ => FirmwareError::Io(e),
    }
}

fn used_bytes(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            used_bytes(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

impl Storage for DirStorage {
    fn mount(&mut self) -> FwResult<()> {
        if !self.root.is_dir() {
            return Err(FirmwareError::Storage(format!(
                "no card at {}",
                self.root.display()
            )));
        }
        self.mounted = true;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn usage(&self) -> FwResult<StorageUsage> {
        self.ensure_mounted()?;
        let used_mb = (used_bytes(&self.root)? / (1024 * 1024)) as u32;
        Ok(StorageUsage {
            total_mb: CARD_SIZE_MB,
            free_mb: CARD_SIZE_MB.saturating_sub(used_mb),
        })
    }

    fn dir_exists(&self, dir: &str) -> bool {
        self.mounted && self.host_path(dir).is_ok_and(|p| p.is_dir())
    }

    fn list_dir(&self, dir: &str) -> FwResult<Vec<String>> {
        self.ensure_mounted()?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.host_path(dir)?).map_err(|e| map_io(dir, e))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn read_file(&self, path: &str) -> FwResult<Vec<u8>> {
        self.ensure_mounted()?;
        std::fs::read(self.host_path(path)?).map_err(|e| map_io(path, e))
    }

    fn write_file(&mut self, path: &str, data: &[u8], overwrite: bool) -> FwResult<()> {
        self.ensure_mounted()?;
        let target = self.host_path(path)?;
        match target.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => return Err(FirmwareError::NotFound(path.to_string())),
        }
        if !overwrite && target.exists() {
            return Err(FirmwareError::AlreadyExists(path.to_string()));
        }
        std::fs::write(&target, data).map_err(|e| map_io(path, e))
    }

    fn file_exists(&self, path: &str) -> bool {
        self.mounted && self.host_path(path).is_ok_and(|p| p.is_file())
    }
}
