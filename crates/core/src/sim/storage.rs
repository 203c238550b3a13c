// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::services::{Storage, StorageUsage};
use crate::{FirmwareError, FwResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_CARD_MB: u32 = 1024;

#[derive(Debug)]
struct Card {
    present: bool,
    mounted: bool,
    total_mb: u32,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

/// microSD card held in memory.
#[derive(Debug, Clone)]
pub struct MemStorage {
    card: Arc<Mutex<Card>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((dir, _)) => dir,
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    /// An empty card that mounts successfully.
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            card: Arc::new(Mutex::new(Card {
                present: true,
                mounted: false,
                total_mb: DEFAULT_CARD_MB,
                dirs,
                files: BTreeMap::new(),
            })),
        }
    }

    /// No card in the slot: mounting fails.
    pub fn absent() -> Self {
        let s = Self::new();
        s.card().present = false;
        s
    }

    fn card(&self) -> MutexGuard<'_, Card> {
        self.card.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_dir(self, dir: &str) -> Self {
        {
            let mut card = self.card();
            let mut path = normalize(dir);
            while path != "/" {
                card.dirs.insert(path.clone());
                path = parent(&path).to_string();
            }
        }
        self
    }

    /// Adds a file, creating its folder.
    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        let path = normalize(path);
        let s = self.with_dir(parent(&path));
        s.card().files.insert(path, data.to_vec());
        s
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.card().files.get(&normalize(path)).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.card().files.keys().cloned().collect()
    }

    fn ensure_mounted(card: &Card) -> FwResult<()> {
        if card.mounted {
            Ok(())
        } else {
            Err(FirmwareError::NotMounted)
        }
    }
}

impl Storage for MemStorage {
    fn mount(&mut self) -> FwResult<()> {
        let mut card = self.card();
        if !card.present {
            return Err(FirmwareError::Storage("no card in the slot".into()));
        }
        card.mounted = true;
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.card().mounted
    }

    fn usage(&self) -> FwResult<StorageUsage> {
        let card = self.card();
        Self::ensure_mounted(&card)?;
        let used: usize = card.files.values().map(Vec::len).sum();
        let used_mb = (used / (1024 * 1024)) as u32;
        Ok(StorageUsage {
            total_mb: card.total_mb,
            free_mb: card.total_mb.saturating_sub(used_mb),
        })
    }

    fn dir_exists(&self, dir: &str) -> bool {
        let card = self.card();
        card.mounted && card.dirs.contains(&normalize(dir))
    }

    fn list_dir(&self, dir: &str) -> FwResult<Vec<String>> {
        let card = self.card();
        Self::ensure_mounted(&card)?;
        let dir = normalize(dir);
        if !card.dirs.contains(&dir) {
            return Err(FirmwareError::NotFound(dir));
        }
        Ok(card
            .files
            .keys()
            .filter(|p| parent(p) == dir)
            .filter_map(|p| p.rsplit('/').next().map(str::to_string))
            .collect())
    }

    fn read_file(&self, path: &str) -> FwResult<Vec<u8>> {
        let card = self.card();
        Self::ensure_mounted(&card)?;
        let path = normalize(path);
        card.files
            .get(&path)
            .cloned()
            .ok_or(FirmwareError::NotFound(path))
    }

    fn write_file(&mut self, path: &str, data: &[u8], overwrite: bool) -> FwResult<()> {
        let mut card = self.card();
        Self::ensure_mounted(&card)?;
        let path = normalize(path);
        if !card.dirs.contains(parent(&path)) {
            return Err(FirmwareError::NotFound(parent(&path).to_string()));
        }
        if !overwrite && card.files.contains_key(&path) {
            return Err(FirmwareError::AlreadyExists(path));
        }
        card.files.insert(path, data.to_vec());
        Ok(())
    }

    fn file_exists(&self, path: &str) -> bool {
        let card = self.card();
        card.mounted && card.files.contains_key(&normalize(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmounted_card_refuses_access() {
        let s = MemStorage::new().with_file("/roms/a.img", b"x");
        assert!(matches!(s.list_dir("/roms"), Err(FirmwareError::NotMounted)));
        assert!(MemStorage::absent().mount().is_err());
    }

    #[test]
    fn test_listing_and_overwrite_rules() {
        let mut s = MemStorage::new()
            .with_file("/roms/a.img", b"a")
            .with_file("/roms/sub/b.img", b"b")
            .with_dir("/floppies");
        s.mount().unwrap();
        assert_eq!(s.list_dir("/roms/").unwrap(), vec!["a.img"]);
        assert!(s.dir_exists("/roms/sub"));
        assert!(s.list_dir("/missing").is_err());

        assert!(matches!(
            s.write_file("/roms/a.img", b"z", false),
            Err(FirmwareError::AlreadyExists(_))
        ));
        s.copy_file("/roms/a.img", "/floppies/a.img", false).unwrap();
        assert_eq!(s.file("/floppies/a.img").unwrap(), b"a");
        assert!(s.write_file("/nowhere/x", b"", true).is_err());
    }
}
