// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::ConfigError;
use std::fmt::Write as _;

/// A key as stored on the device, NUL excluded.
pub type Key = heapless::String<MAX_KEY_LENGTH>;
/// A value as stored on the device, NUL excluded.
pub type Value = heapless::String<MAX_STRING_VALUE_LENGTH>;

pub const CONFIG_MAGIC: u32 = 0x1234_0000;
pub const CONFIG_VERSION: u32 = 0x0000_0001;
pub const NETWORK_MAGIC: u32 = 0x1234_0001;

/// Key buffer size on the device, including the terminating NUL.
pub const MAX_KEY_LENGTH: usize = 20;
/// Value buffer size on the device, including the terminating NUL.
pub const MAX_STRING_VALUE_LENGTH: usize = 64;
pub const MAX_ENTRIES: usize = 19;

/// key[20] + data_type u16 + value[64]
pub const ENTRY_SIZE: usize = MAX_KEY_LENGTH + 2 + MAX_STRING_VALUE_LENGTH;
/// magic u32 + entries + count u32
pub const CONFIG_IMAGE_SIZE: usize = 4 + MAX_ENTRIES * ENTRY_SIZE + 4;
pub const ENTRIES_OFFSET: usize = 4;
pub const COUNT_OFFSET: usize = ENTRIES_OFFSET + MAX_ENTRIES * ENTRY_SIZE;

/// Well-known configuration keys.
pub mod keys {
    pub const BOOT_FEATURE: &str = "BOOT_FEATURE";
    pub const HOSTNAME: &str = "HOSTNAME";
    pub const FLOPPIES_FOLDER: &str = "FLOPPIES_FOLDER";
    pub const FLOPPY_IMAGE_A: &str = "FLOPPY_IMAGE_A";
    pub const FLOPPY_IMAGE_B: &str = "FLOPPY_IMAGE_B";
    pub const ROMS_FOLDER: &str = "ROMS_FOLDER";
    pub const ROMS_YAML_URL: &str = "ROMS_YAML_URL";
    pub const FLOPPY_DB_URL: &str = "FLOPPY_DB_URL";
    pub const WIFI_PASSWORD: &str = "WIFI_PASSWORD";
    pub const WIFI_SSID: &str = "WIFI_SSID";
    pub const WIFI_AUTH: &str = "WIFI_AUTH";
    pub const WIFI_SCAN_SECONDS: &str = "WIFI_SCAN_SECONDS";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int = 0,
    String = 1,
    Bool = 2,
}

impl DataType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(DataType::Int),
            1 => Some(DataType::String),
            2 => Some(DataType::Bool),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::String => "STRING",
            DataType::Bool => "BOOL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: Key,
    pub data_type: DataType,
    pub value: Value,
}

/// Truncates `s` so that it fits a NUL-terminated buffer of `N` bytes,
/// never splitting a UTF-8 sequence.
fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut end = s.len().min(N.saturating_sub(1));
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    // Cannot overflow, `end` is below the capacity.
    let _ = out.push_str(&s[..end]);
    out
}

/// Borrows the text of a NUL-terminated buffer, up to the first byte that
/// is not valid UTF-8.
pub fn c_str(buf: &[u8]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..end]) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&buf[..e.valid_up_to()]).unwrap_or_default(),
    }
}

/// Reads a NUL-terminated string out of a fixed buffer. A buffer without a
/// terminator yields all of its bytes.
pub fn read_c_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Copies `s` into a fixed buffer, zero filling the rest. The last byte is
/// always left as NUL.
pub fn write_c_string(buf: &mut [u8], s: &str) {
    buf.fill(0);
    let n = s.len().min(buf.len().saturating_sub(1));
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
}

impl ConfigEntry {
    pub fn new(key: &str, data_type: DataType, value: &str) -> Self {
        Self {
            key: bounded(key),
            data_type,
            value: bounded(value),
        }
    }

    pub fn string(key: &str, value: &str) -> Self {
        Self::new(key, DataType::String, value)
    }

    pub fn integer(key: &str, value: i32) -> Self {
        let mut text: heapless::String<12> = heapless::String::new();
        // "-2147483648" is the longest an i32 gets.
        let _ = write!(text, "{}", value);
        Self::new(key, DataType::Int, &text)
    }

    pub fn boolean(key: &str, value: bool) -> Self {
        Self::new(key, DataType::Bool, if value { "true" } else { "false" })
    }

    /// Writes the entry in device-native (little-endian) layout.
    pub fn write_native(&self, buf: &mut [u8]) {
        write_c_string(&mut buf[..MAX_KEY_LENGTH], &self.key);
        buf[MAX_KEY_LENGTH..MAX_KEY_LENGTH + 2]
            .copy_from_slice(&(self.data_type as u16).to_le_bytes());
        write_c_string(&mut buf[MAX_KEY_LENGTH + 2..ENTRY_SIZE], &self.value);
    }

    /// Parses a device-native entry. An empty key yields `None`. Runs in
    /// interrupt context, so nothing here touches the heap.
    pub fn read_native(buf: &[u8]) -> Result<Option<Self>, ConfigError> {
        if buf.len() < ENTRY_SIZE {
            return Err(ConfigError::Truncated {
                expected: ENTRY_SIZE,
                actual: buf.len(),
            });
        }
        let key = c_str(&buf[..MAX_KEY_LENGTH]);
        if key.is_empty() {
            return Ok(None);
        }
        let raw_type = u16::from_le_bytes([buf[MAX_KEY_LENGTH], buf[MAX_KEY_LENGTH + 1]]);
        let data_type = DataType::from_u16(raw_type).ok_or(ConfigError::InvalidDataType(raw_type))?;
        let value = c_str(&buf[MAX_KEY_LENGTH + 2..ENTRY_SIZE]);
        Ok(Some(ConfigEntry::new(key, data_type, value)))
    }

    /// `atoi` semantics: optional sign and leading digits, zero otherwise.
    pub fn as_int(&self) -> i32 {
        parse_leading_int(&self.value)
    }

    pub fn as_bool(&self) -> bool {
        self.value.as_str() == "true"
    }
}

pub fn parse_leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut acc: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        acc = (acc * 10 + i64::from(b - b'0')).min(i64::from(i32::MAX) + 1);
    }
    let acc = if neg { -acc } else { acc };
    acc.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// In-memory configuration table with the device's fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    entries: heapless::Vec<ConfigEntry, MAX_ENTRIES>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ConfigStore {
    pub fn empty() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    pub fn defaults() -> Self {
        let mut store = Self::empty();
        for entry in [
            ConfigEntry::string(keys::BOOT_FEATURE, "CONFIGURATOR"),
            ConfigEntry::string(keys::HOSTNAME, "sidecart"),
            ConfigEntry::string(keys::FLOPPIES_FOLDER, "/floppies"),
            ConfigEntry::string(keys::FLOPPY_IMAGE_A, "gfa.st"),
            ConfigEntry::string(keys::FLOPPY_IMAGE_B, ""),
            ConfigEntry::string(keys::ROMS_FOLDER, "/roms"),
            ConfigEntry::string(keys::ROMS_YAML_URL, "http://roms.sidecart.xyz/roms.json"),
            ConfigEntry::string(keys::FLOPPY_DB_URL, "http://ataristdb.sidecart.xyz"),
            ConfigEntry::string(keys::WIFI_PASSWORD, ""),
            ConfigEntry::string(keys::WIFI_SSID, ""),
            ConfigEntry::new(keys::WIFI_AUTH, DataType::Int, ""),
        ] {
            // Fewer defaults than MAX_ENTRIES.
            let _ = store.entries.push(entry);
        }
        store
    }

    pub fn reset_default(&mut self) {
        *self = Self::defaults();
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, key: &str) -> Option<&ConfigEntry> {
        self.entries.iter().find(|e| e.key.as_str() == key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.find(key).map(|e| e.value.as_str())
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.find(key).map(ConfigEntry::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.find(key).map(ConfigEntry::as_bool)
    }

    /// Updates the entry with the same key in place, or appends it.
    /// Never allocates.
    pub fn upsert(&mut self, entry: ConfigEntry) -> Result<(), ConfigError> {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == entry.key) {
            *existing = entry;
            return Ok(());
        }
        self.entries
            .push(entry)
            .map_err(|rejected| ConfigError::Full(rejected.key))
    }

    pub fn put_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.upsert(ConfigEntry::string(key, value))
    }

    pub fn put_integer(&mut self, key: &str, value: i32) -> Result<(), ConfigError> {
        self.upsert(ConfigEntry::integer(key, value))
    }

    pub fn put_bool(&mut self, key: &str, value: bool) -> Result<(), ConfigError> {
        self.upsert(ConfigEntry::boolean(key, value))
    }

    /// Serializes the table in the native flash layout.
    pub fn to_image(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CONFIG_IMAGE_SIZE];
        self.write_image(&mut buf);
        buf
    }

    /// Fills `buf` (`CONFIG_IMAGE_SIZE` bytes, zeroed) with the native image.
    pub fn write_image(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&(CONFIG_MAGIC | CONFIG_VERSION).to_le_bytes());
        for (i, entry) in self.entries.iter().enumerate() {
            let off = ENTRIES_OFFSET + i * ENTRY_SIZE;
            entry.write_native(&mut buf[off..off + ENTRY_SIZE]);
        }
        buf[COUNT_OFFSET..COUNT_OFFSET + 4]
            .copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
    }

    /// Parses a native flash image on top of the defaults. Stored entries
    /// are read until the first empty key.
    pub fn from_image(image: &[u8]) -> Result<Self, ConfigError> {
        if image.len() < CONFIG_IMAGE_SIZE {
            return Err(ConfigError::Truncated {
                expected: CONFIG_IMAGE_SIZE,
                actual: image.len(),
            });
        }
        let magic = u32::from_le_bytes([image[0], image[1], image[2], image[3]]);
        if magic != (CONFIG_MAGIC | CONFIG_VERSION) {
            return Err(ConfigError::BadMagic(magic));
        }

        let mut store = Self::defaults();
        for i in 0..MAX_ENTRIES {
            let off = ENTRIES_OFFSET + i * ENTRY_SIZE;
            match ConfigEntry::read_native(&image[off..off + ENTRY_SIZE])? {
                Some(entry) => store.upsert(entry)?,
                None => break,
            }
        }
        Ok(store)
    }

    /// Renders the table the way the device prints it on its debug console.
    pub fn table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<20} | {:<6} | {}", "Key", "Type", "Value");
        let _ = writeln!(out, "{:-<20}-|-{:-<6}-|-{:-<30}", "", "", "");
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:<20} | {:<6} | {}",
                entry.key,
                entry.data_type.as_str(),
                entry.value
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_contain_boot_feature() {
        let store = ConfigStore::defaults();
        assert_eq!(store.get_str(keys::BOOT_FEATURE), Some("CONFIGURATOR"));
        assert_eq!(store.get_str(keys::ROMS_FOLDER), Some("/roms"));
        assert_eq!(store.find(keys::WIFI_AUTH).map(|e| e.data_type), Some(DataType::Int));
        assert!(store.len() <= MAX_ENTRIES);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let mut store = ConfigStore::defaults();
        let before = store.len();
        store.put_string(keys::HOSTNAME, "atari").unwrap();
        store.put_string(keys::HOSTNAME, "atari").unwrap();
        assert_eq!(store.len(), before);
        assert_eq!(store.get_str(keys::HOSTNAME), Some("atari"));
    }

    #[test]
    fn test_store_full() {
        let mut store = ConfigStore::empty();
        for i in 0..MAX_ENTRIES {
            store.put_integer(&format!("K{}", i), i as i32).unwrap();
        }
        let err = store.put_bool("ONE_TOO_MANY", true).unwrap_err();
        assert!(matches!(err, ConfigError::Full(_)));
        // Updating an existing key still works when full.
        store.put_integer("K0", 42).unwrap();
        assert_eq!(store.get_int("K0"), Some(42));
    }

    #[test]
    fn test_long_values_are_truncated() {
        let long = "x".repeat(100);
        let entry = ConfigEntry::string("A_VERY_LONG_KEY_NAME_INDEED", &long);
        assert_eq!(entry.key.len(), MAX_KEY_LENGTH - 1);
        assert_eq!(entry.value.len(), MAX_STRING_VALUE_LENGTH - 1);
    }

    #[test]
    fn test_invalid_utf8_stops_the_text() {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[..4].copy_from_slice(b"NAME");
        buf[MAX_KEY_LENGTH] = DataType::String as u8;
        buf[MAX_KEY_LENGTH + 2..MAX_KEY_LENGTH + 6].copy_from_slice(&[b'o', b'k', 0xFF, b'x']);
        let entry = ConfigEntry::read_native(&buf).unwrap().unwrap();
        assert_eq!(entry.key.as_str(), "NAME");
        assert_eq!(entry.value.as_str(), "ok");
    }

    #[test]
    fn test_integer_extremes_fit() {
        assert_eq!(ConfigEntry::integer("K", i32::MIN).value.as_str(), "-2147483648");
        assert_eq!(ConfigEntry::integer("K", i32::MIN).as_int(), i32::MIN);
    }

    #[test]
    fn test_atoi_semantics() {
        assert_eq!(parse_leading_int("42"), 42);
        assert_eq!(parse_leading_int("  -7abc"), -7);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("99999999999"), i32::MAX);
    }

    #[test]
    fn test_image_layout() {
        let store = ConfigStore::defaults();
        let image = store.to_image();
        assert_eq!(image.len(), 1644);
        assert_eq!(&image[..4], &0x1234_0001u32.to_le_bytes());
        assert_eq!(&image[4..16], b"BOOT_FEATURE");
        assert_eq!(
            u32::from_le_bytes(image[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().unwrap()),
            store.len() as u32
        );
    }

    #[test]
    fn test_image_overlays_defaults() {
        let mut stored = ConfigStore::empty();
        stored.put_string(keys::ROMS_FOLDER, "/cartridges").unwrap();
        stored.put_integer(keys::WIFI_SCAN_SECONDS, 30).unwrap();

        let loaded = ConfigStore::from_image(&stored.to_image()).unwrap();
        assert_eq!(loaded.get_str(keys::ROMS_FOLDER), Some("/cartridges"));
        assert_eq!(loaded.get_int(keys::WIFI_SCAN_SECONDS), Some(30));
        assert_eq!(loaded.get_str(keys::HOSTNAME), Some("sidecart"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut image = ConfigStore::defaults().to_image();
        image[0] = 0xFF;
        assert!(matches!(
            ConfigStore::from_image(&image),
            Err(ConfigError::BadMagic(_))
        ));
        assert!(matches!(
            ConfigStore::from_image(&image[..10]),
            Err(ConfigError::Truncated { .. })
        ));
    }

    #[test]
    fn test_table_lists_every_entry() {
        let table = ConfigStore::defaults().table();
        assert!(table.contains("BOOT_FEATURE"));
        assert!(table.contains("STRING"));
        assert!(table.contains("WIFI_AUTH"));
    }
}
