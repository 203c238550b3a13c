// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::store::{ConfigStore, CONFIG_IMAGE_SIZE};
use crate::ConfigError;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Size of the flash sector reserved for the configuration image.
pub const CONFIG_FLASH_SIZE: usize = 4096;

/// Persistent storage for the configuration flash sector.
pub trait ConfigBackend: Send {
    /// Returns the stored sector, or `None` when nothing was ever written.
    fn load(&mut self) -> Result<Option<Vec<u8>>, ConfigError>;
    fn store(&mut self, image: &[u8]) -> Result<(), ConfigError>;
    fn erase(&mut self) -> Result<(), ConfigError>;
}

fn sector(image: &[u8]) -> Result<Vec<u8>, ConfigError> {
    if image.len() > CONFIG_FLASH_SIZE {
        return Err(ConfigError::Truncated {
            expected: CONFIG_FLASH_SIZE,
            actual: image.len(),
        });
    }
    let mut data = vec![0xFF; CONFIG_FLASH_SIZE];
    data[..image.len()].copy_from_slice(image);
    Ok(data)
}

/// RAM-backed sector. Clones share the same storage so tests can inspect
/// what the firmware persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    sector: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: &[u8]) -> Result<Self, ConfigError> {
        let backend = Self::new();
        *backend.lock() = Some(sector(image)?);
        Ok(backend)
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.sector
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ConfigBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.lock().clone())
    }

    fn store(&mut self, image: &[u8]) -> Result<(), ConfigError> {
        *self.lock() = Some(sector(image)?);
        Ok(())
    }

    fn erase(&mut self) -> Result<(), ConfigError> {
        *self.lock() = None;
        Ok(())
    }
}

/// Sector stored as a plain file on the host.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConfigBackend for FileBackend {
    fn load(&mut self) -> Result<Option<Vec<u8>>, ConfigError> {
        match std::fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&mut self, image: &[u8]) -> Result<(), ConfigError> {
        std::fs::write(&self.path, sector(image)?)?;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), ConfigError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl ConfigStore {
    /// Loads the stored table. A blank or corrupt sector yields the defaults.
    pub fn load_from(backend: &mut dyn ConfigBackend) -> Result<Self, ConfigError> {
        let Some(data) = backend.load()? else {
            debug!("No stored configuration, using defaults");
            return Ok(Self::defaults());
        };
        match Self::from_image(&data) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("Stored configuration rejected ({}), using defaults", e);
                Ok(Self::defaults())
            }
        }
    }

    /// Writes every entry to the backend in one go.
    pub fn persist(&self, backend: &mut dyn ConfigBackend) -> Result<(), ConfigError> {
        let image = self.to_image();
        debug_assert_eq!(image.len(), CONFIG_IMAGE_SIZE);
        backend.store(&image)?;
        debug!(entries = self.len(), "Configuration persisted");
        Ok(())
    }
}
