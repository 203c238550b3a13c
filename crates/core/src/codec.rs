// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Byte-order conversion between the firmware (little-endian) and the host
//! (big-endian 68000 reading little-endian halfwords off the bus).
//!
//! Every wire struct is described by a field layout. One swap routine walks
//! the layout, and because each step is an involution the same routine
//! serves both directions:
//!
//! * strings are byte-swapped inside each 16-bit word,
//! * 16-bit integers travel unchanged,
//! * 32-bit integers have their halfwords exchanged.

use crate::services::{
    ConnectionData, ConnectionStatus, FloppyRequest, SdCardData, WifiNetworkAuthInfo,
    WifiNetworkInfo, WifiScanData, IPV4_ADDRESS_LENGTH, IPV6_ADDRESS_LENGTH, MAX_BSSID_LENGTH,
    MAX_NETWORKS, MAX_PASSWORD_LENGTH, MAX_SSID_LENGTH, SD_FOLDER_LENGTH,
};
use crate::{FirmwareError, FwResult};
use rombridge_config::store::{
    read_c_string, write_c_string, ConfigEntry, ConfigStore, CONFIG_MAGIC, CONFIG_VERSION,
    MAX_ENTRIES, MAX_KEY_LENGTH, MAX_STRING_VALUE_LENGTH, NETWORK_MAGIC,
};

/// Structs up to this size are swapped in a stack buffer before decoding.
/// Larger ones (the config table, the scan list) are host-side only.
const DECODE_SCRATCH: usize = 512;

pub const FLOPPY_VOLUME_NAME_LENGTH: usize = 14;
pub const FLOPPY_NAME_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy)]
pub enum Field {
    Str(usize),
    U16,
    U32,
    Array(&'static [Field], usize),
}

pub fn layout_size(layout: &[Field]) -> usize {
    layout
        .iter()
        .map(|f| match f {
            Field::Str(n) => *n,
            Field::U16 => 2,
            Field::U32 => 4,
            Field::Array(inner, n) => layout_size(inner) * n,
        })
        .sum()
}

fn swap_fields(layout: &[Field], buf: &mut [u8]) -> usize {
    let mut off = 0;
    for field in layout {
        match field {
            Field::Str(n) => {
                swap_words(&mut buf[off..off + n]);
                off += n;
            }
            Field::U16 => off += 2,
            Field::U32 => {
                buf[off..off + 4].rotate_left(2);
                off += 4;
            }
            Field::Array(inner, n) => {
                for _ in 0..*n {
                    off += swap_fields(inner, &mut buf[off..]);
                }
            }
        }
    }
    off
}

/// Swaps the two bytes of every 16-bit word. A trailing odd byte is kept.
pub fn swap_words(buf: &mut [u8]) {
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Exchanges the halfwords of a 32-bit value. The host sends the token
/// halves pre-rotated, so this is applied once on ingress.
pub fn swap_token(value: u32) -> u32 {
    ((value & 0xFFFF_0000) >> 16) | ((value & 0x0000_FFFF) << 16)
}

fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// A struct with a fixed wire shape.
pub trait WireCodec: Sized {
    const LAYOUT: &'static [Field];

    /// Fills `buf` (exactly `wire_size()` bytes, zeroed) in native order.
    fn write_native(&self, buf: &mut [u8]);
    fn read_native(buf: &[u8]) -> FwResult<Self>;

    fn wire_size() -> usize {
        layout_size(Self::LAYOUT)
    }

    fn swap(buf: &mut [u8]) {
        swap_fields(Self::LAYOUT, buf);
    }

    fn encode_into(&self, out: &mut [u8]) -> FwResult<usize> {
        let n = Self::wire_size();
        if out.len() < n {
            return Err(FirmwareError::ShortBuffer {
                expected: n,
                actual: out.len(),
            });
        }
        let buf = &mut out[..n];
        buf.fill(0);
        self.write_native(buf);
        Self::swap(buf);
        Ok(n)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::wire_size()];
        self.write_native(&mut out);
        Self::swap(&mut out);
        out
    }

    fn decode(wire: &[u8]) -> FwResult<Self> {
        let n = Self::wire_size();
        if wire.len() < n {
            return Err(FirmwareError::ShortBuffer {
                expected: n,
                actual: wire.len(),
            });
        }
        if n <= DECODE_SCRATCH {
            let mut scratch = [0u8; DECODE_SCRATCH];
            let buf = &mut scratch[..n];
            buf.copy_from_slice(&wire[..n]);
            Self::swap(buf);
            Self::read_native(buf)
        } else {
            let mut buf = wire[..n].to_vec();
            Self::swap(&mut buf);
            Self::read_native(&buf)
        }
    }
}

/// Decodes `bytes` as if zero filled up to the struct's size, so that short
/// payloads decode as empty fields instead of failing.
pub fn decode_padded<T: WireCodec>(bytes: &[u8]) -> FwResult<T> {
    let n = T::wire_size();
    let mut scratch = [0u8; DECODE_SCRATCH];
    let buf = scratch.get_mut(..n).ok_or(FirmwareError::ShortBuffer {
        expected: n,
        actual: DECODE_SCRATCH,
    })?;
    let len = bytes.len().min(n);
    buf[..len].copy_from_slice(&bytes[..len]);
    T::decode(buf)
}

const ENTRY_LAYOUT: &[Field] = &[
    Field::Str(MAX_KEY_LENGTH),
    Field::U16,
    Field::Str(MAX_STRING_VALUE_LENGTH),
];

impl WireCodec for ConfigEntry {
    const LAYOUT: &'static [Field] = ENTRY_LAYOUT;

    fn write_native(&self, buf: &mut [u8]) {
        ConfigEntry::write_native(self, buf);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        ConfigEntry::read_native(buf)?
            .ok_or_else(|| FirmwareError::InvalidWire("empty configuration key".into()))
    }
}

impl WireCodec for ConfigStore {
    const LAYOUT: &'static [Field] = &[
        Field::U32,
        Field::Array(ENTRY_LAYOUT, MAX_ENTRIES),
        Field::U32,
    ];

    fn write_native(&self, buf: &mut [u8]) {
        self.write_image(buf);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        let magic = get_u32(buf, 0);
        if magic != (CONFIG_MAGIC | CONFIG_VERSION) {
            return Err(FirmwareError::InvalidWire(format!(
                "config table magic {:#010x}",
                magic
            )));
        }
        let entry_size = layout_size(ENTRY_LAYOUT);
        let count = (get_u32(buf, 4 + MAX_ENTRIES * entry_size) as usize).min(MAX_ENTRIES);
        let mut store = ConfigStore::empty();
        for i in 0..count {
            let off = 4 + i * entry_size;
            if let Some(entry) = ConfigEntry::read_native(&buf[off..off + entry_size])? {
                store.upsert(entry)?;
            }
        }
        Ok(store)
    }
}

const NETWORK_INFO_LAYOUT: &[Field] = &[
    Field::Str(MAX_SSID_LENGTH),
    Field::Str(MAX_BSSID_LENGTH),
    Field::U16,
];

impl WireCodec for WifiNetworkInfo {
    const LAYOUT: &'static [Field] = NETWORK_INFO_LAYOUT;

    fn write_native(&self, buf: &mut [u8]) {
        write_c_string(&mut buf[..MAX_SSID_LENGTH], &self.ssid);
        write_c_string(
            &mut buf[MAX_SSID_LENGTH..MAX_SSID_LENGTH + MAX_BSSID_LENGTH],
            &self.bssid,
        );
        put_u16(buf, MAX_SSID_LENGTH + MAX_BSSID_LENGTH, self.auth_mode);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        Ok(Self {
            ssid: read_c_string(&buf[..MAX_SSID_LENGTH]),
            bssid: read_c_string(&buf[MAX_SSID_LENGTH..MAX_SSID_LENGTH + MAX_BSSID_LENGTH]),
            auth_mode: get_u16(buf, MAX_SSID_LENGTH + MAX_BSSID_LENGTH),
        })
    }
}

impl WireCodec for WifiScanData {
    const LAYOUT: &'static [Field] = &[
        Field::U32,
        Field::Array(NETWORK_INFO_LAYOUT, MAX_NETWORKS),
        Field::U16,
    ];

    fn write_native(&self, buf: &mut [u8]) {
        let info_size = layout_size(NETWORK_INFO_LAYOUT);
        put_u32(buf, 0, NETWORK_MAGIC);
        let count = self.networks.len().min(MAX_NETWORKS);
        for (i, network) in self.networks.iter().take(count).enumerate() {
            let off = 4 + i * info_size;
            network.write_native(&mut buf[off..off + info_size]);
        }
        put_u16(buf, 4 + MAX_NETWORKS * info_size, count as u16);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        let magic = get_u32(buf, 0);
        if magic != NETWORK_MAGIC {
            return Err(FirmwareError::InvalidWire(format!(
                "scan data magic {:#010x}",
                magic
            )));
        }
        let info_size = layout_size(NETWORK_INFO_LAYOUT);
        let count = (get_u16(buf, 4 + MAX_NETWORKS * info_size) as usize).min(MAX_NETWORKS);
        let networks = (0..count)
            .map(|i| {
                let off = 4 + i * info_size;
                WifiNetworkInfo::read_native(&buf[off..off + info_size])
            })
            .collect::<FwResult<Vec<_>>>()?;
        Ok(Self { networks })
    }
}

impl WireCodec for WifiNetworkAuthInfo {
    const LAYOUT: &'static [Field] = &[
        Field::Str(MAX_SSID_LENGTH),
        Field::Str(MAX_PASSWORD_LENGTH),
        Field::U16,
    ];

    fn write_native(&self, buf: &mut [u8]) {
        write_c_string(&mut buf[..MAX_SSID_LENGTH], &self.ssid);
        write_c_string(
            &mut buf[MAX_SSID_LENGTH..MAX_SSID_LENGTH + MAX_PASSWORD_LENGTH],
            &self.password,
        );
        put_u16(buf, MAX_SSID_LENGTH + MAX_PASSWORD_LENGTH, self.auth_mode);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        Ok(Self {
            ssid: read_c_string(&buf[..MAX_SSID_LENGTH]),
            password: read_c_string(&buf[MAX_SSID_LENGTH..MAX_SSID_LENGTH + MAX_PASSWORD_LENGTH]),
            auth_mode: get_u16(buf, MAX_SSID_LENGTH + MAX_PASSWORD_LENGTH),
        })
    }
}

impl WireCodec for ConnectionData {
    const LAYOUT: &'static [Field] = &[
        Field::Str(MAX_SSID_LENGTH),
        Field::Str(IPV4_ADDRESS_LENGTH),
        Field::Str(IPV6_ADDRESS_LENGTH),
        Field::U16,
    ];

    fn write_native(&self, buf: &mut [u8]) {
        let ipv4 = MAX_SSID_LENGTH;
        let ipv6 = ipv4 + IPV4_ADDRESS_LENGTH;
        let status = ipv6 + IPV6_ADDRESS_LENGTH;
        write_c_string(&mut buf[..ipv4], &self.ssid);
        write_c_string(&mut buf[ipv4..ipv6], &self.ipv4_address);
        write_c_string(&mut buf[ipv6..status], &self.ipv6_address);
        put_u16(buf, status, self.status as u16);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        let ipv4 = MAX_SSID_LENGTH;
        let ipv6 = ipv4 + IPV4_ADDRESS_LENGTH;
        let status = ipv6 + IPV6_ADDRESS_LENGTH;
        let raw = get_u16(buf, status);
        Ok(Self {
            ssid: read_c_string(&buf[..ipv4]),
            ipv4_address: read_c_string(&buf[ipv4..ipv6]),
            ipv6_address: read_c_string(&buf[ipv6..status]),
            status: ConnectionStatus::from_u16(raw)
                .ok_or_else(|| FirmwareError::InvalidWire(format!("connection status {}", raw)))?,
        })
    }
}

impl WireCodec for SdCardData {
    const LAYOUT: &'static [Field] = &[
        Field::Str(SD_FOLDER_LENGTH),
        Field::Str(SD_FOLDER_LENGTH),
        Field::Str(SD_FOLDER_LENGTH),
        Field::U32,
        Field::U32,
        Field::U32,
        Field::U32,
        Field::U32,
        Field::U16,
        Field::U16,
        Field::U16,
        Field::U16,
    ];

    fn write_native(&self, buf: &mut [u8]) {
        let f = SD_FOLDER_LENGTH;
        write_c_string(&mut buf[..f], &self.roms_folder);
        write_c_string(&mut buf[f..2 * f], &self.floppies_folder);
        write_c_string(&mut buf[2 * f..3 * f], &self.harddisks_folder);
        let ints = 3 * f;
        put_u32(buf, ints, self.sd_size);
        put_u32(buf, ints + 4, self.sd_free_space);
        put_u32(buf, ints + 8, self.roms_folder_count);
        put_u32(buf, ints + 12, self.floppies_folder_count);
        put_u32(buf, ints + 16, self.harddisks_folder_count);
        put_u16(buf, ints + 20, self.status);
        put_u16(buf, ints + 22, self.roms_folder_status);
        put_u16(buf, ints + 24, self.floppies_folder_status);
        put_u16(buf, ints + 26, self.harddisks_folder_status);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        let f = SD_FOLDER_LENGTH;
        let ints = 3 * f;
        Ok(Self {
            roms_folder: read_c_string(&buf[..f]),
            floppies_folder: read_c_string(&buf[f..2 * f]),
            harddisks_folder: read_c_string(&buf[2 * f..3 * f]),
            sd_size: get_u32(buf, ints),
            sd_free_space: get_u32(buf, ints + 4),
            roms_folder_count: get_u32(buf, ints + 8),
            floppies_folder_count: get_u32(buf, ints + 12),
            harddisks_folder_count: get_u32(buf, ints + 16),
            status: get_u16(buf, ints + 20),
            roms_folder_status: get_u16(buf, ints + 22),
            floppies_folder_status: get_u16(buf, ints + 24),
            harddisks_folder_status: get_u16(buf, ints + 26),
        })
    }
}

/// CREATE_FLOPPY parameters, as found after the token.
impl WireCodec for FloppyRequest {
    const LAYOUT: &'static [Field] = &[
        Field::U16,
        Field::U16,
        Field::U16,
        Field::U16,
        Field::U16,
        Field::Str(FLOPPY_VOLUME_NAME_LENGTH),
        Field::Str(FLOPPY_NAME_LENGTH),
    ];

    fn write_native(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.template);
        put_u16(buf, 2, self.tracks);
        put_u16(buf, 4, self.sectors);
        put_u16(buf, 6, self.sides);
        put_u16(buf, 8, u16::from(self.overwrite));
        write_c_string(&mut buf[10..10 + FLOPPY_VOLUME_NAME_LENGTH], &self.volume_name);
        write_c_string(&mut buf[10 + FLOPPY_VOLUME_NAME_LENGTH..], &self.floppy_name);
    }

    fn read_native(buf: &[u8]) -> FwResult<Self> {
        let name_off = 10 + FLOPPY_VOLUME_NAME_LENGTH;
        Ok(Self {
            template: get_u16(buf, 0),
            tracks: get_u16(buf, 2),
            sectors: get_u16(buf, 4),
            sides: get_u16(buf, 6),
            overwrite: get_u16(buf, 8) != 0,
            volume_name: read_c_string(&buf[10..name_off]),
            floppy_name: read_c_string(&buf[name_off..name_off + FLOPPY_NAME_LENGTH]),
        })
    }
}
