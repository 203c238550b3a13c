// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Atari ST floppy images: MSA decompression and blank `.ST` creation.

use crate::services::{FloppyGeometry, ImageTools, Storage};
use crate::{FirmwareError, FwResult};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

pub const BYTES_PER_SECTOR: usize = 512;
const SPF_MAX: usize = 9;
const MSA_MAGIC: u16 = 0x0E0F;
const MSA_HEADER_SIZE: usize = 10;
const MSA_RLE_MARKER: u8 = 0xE5;
const MSA_MAX_TRACK: u16 = 86;
const MSA_MAX_SECTORS: u16 = 56;
const ST_MAX_TRACKS: usize = 86;
const ST_MAX_SECTORS: usize = 36;
const VOLUME_LABEL_ATTRIBUTE: u8 = 0x08;

fn be16(data: &[u8], off: usize) -> FwResult<u16> {
    data.get(off..off + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| FirmwareError::Image("MSA image truncated".into()))
}

/// Expands an MSA image into the raw sector dump of an `.ST` image.
pub fn msa_decode(msa: &[u8]) -> FwResult<Vec<u8>> {
    let id = be16(msa, 0)?;
    let sectors = be16(msa, 2)?;
    let sides = be16(msa, 4)?;
    let start = be16(msa, 6)?;
    let end = be16(msa, 8)?;
    if id != MSA_MAGIC
        || end > MSA_MAX_TRACK
        || start > end
        || sectors > MSA_MAX_SECTORS
        || sides > 1
        || msa.len() <= MSA_HEADER_SIZE
    {
        return Err(FirmwareError::Image("MSA image has a bad header".into()));
    }
    debug!(sectors, sides, start, end, "MSA header");

    let track_bytes = BYTES_PER_SECTOR * usize::from(sectors);
    let tracks = usize::from(end - start + 1) * usize::from(sides + 1);
    let mut out = Vec::with_capacity(tracks * track_bytes);
    let mut pos = MSA_HEADER_SIZE;

    for _ in 0..tracks {
        let len = usize::from(be16(msa, pos)?);
        pos += 2;
        let data = msa
            .get(pos..pos + len)
            .ok_or_else(|| FirmwareError::Image("MSA track data truncated".into()))?;
        pos += len;

        if len == track_bytes {
            out.extend_from_slice(data);
            continue;
        }
        let track_start = out.len();
        let mut i = 0;
        while out.len() - track_start < track_bytes {
            let byte = *data
                .get(i)
                .ok_or_else(|| FirmwareError::Image("MSA compressed track truncated".into()))?;
            i += 1;
            if byte != MSA_RLE_MARKER {
                out.push(byte);
                continue;
            }
            let value = *data
                .get(i)
                .ok_or_else(|| FirmwareError::Image("MSA run truncated".into()))?;
            let mut run = usize::from(be16(data, i + 1)?);
            i += 3;
            let written = out.len() - track_start;
            if written + run > track_bytes {
                warn!("MSA run length exceeds the track, image may be corrupted");
                run = track_bytes - written;
            }
            out.resize(out.len() + run, value);
        }
    }
    Ok(out)
}

/// Boot sector, both FATs and the root directory of a freshly formatted
/// disk. The rest of the image is zero.
pub fn blank_st(geometry: FloppyGeometry, volume_name: &str, serial: u32) -> FwResult<Vec<u8>> {
    let tracks = usize::from(geometry.tracks);
    let sectors = usize::from(geometry.sectors);
    // HD/ED disks are always double sided.
    let sides = if sectors >= 18 { 2 } else { usize::from(geometry.sides) };
    // Bounded before the size is computed, so a bogus request never allocates.
    if !(1..=ST_MAX_TRACKS).contains(&tracks)
        || !(1..=ST_MAX_SECTORS).contains(&sectors)
        || !(1..=2).contains(&sides)
        || tracks * sectors * sides * BYTES_PER_SECTOR < 2 * (1 + SPF_MAX) * BYTES_PER_SECTOR
    {
        return Err(FirmwareError::Image(format!(
            "unsupported floppy geometry {}x{}x{}",
            tracks, sectors, sides
        )));
    }

    let mut disk = vec![0u8; tracks * sectors * sides * BYTES_PER_SECTOR];
    let put16 = |disk: &mut [u8], off: usize, v: u16| {
        disk[off..off + 2].copy_from_slice(&v.to_le_bytes());
    };

    disk[0] = 0xE9;
    disk[2..8].fill(0x4E);
    disk[8..11].copy_from_slice(&serial.to_le_bytes()[..3]);
    put16(&mut disk, 11, BYTES_PER_SECTOR as u16);

    let spc: u8 = if tracks == 40 && sides == 1 { 1 } else { 2 };
    disk[13] = spc;
    put16(&mut disk, 14, 1);
    disk[16] = 2;
    let dir_entries: u16 = match (spc, sectors) {
        (1, _) => 64,
        (_, s) if s < 18 => 112,
        _ => 224,
    };
    put16(&mut disk, 17, dir_entries);
    put16(&mut disk, 19, (tracks * sectors * sides) as u16);

    let media: u8 = if sectors >= 18 {
        0xF0
    } else {
        let base = if tracks <= 42 { 0xFC } else { 0xF8 };
        if sides == 2 {
            base | 0x01
        } else {
            base
        }
    };
    disk[21] = media;
    let spf = if sectors >= 18 {
        SPF_MAX
    } else if tracks >= 80 {
        5
    } else {
        2
    };
    put16(&mut disk, 22, spf as u16);
    put16(&mut disk, 24, sectors as u16);
    put16(&mut disk, 26, sides as u16);

    for fat in [BYTES_PER_SECTOR, BYTES_PER_SECTOR + spf * BYTES_PER_SECTOR] {
        disk[fat] = media;
        disk[fat + 1] = 0xFF;
        disk[fat + 2] = 0xFF;
    }

    if !volume_name.is_empty() {
        let dir = (1 + spf * 2) * BYTES_PER_SECTOR;
        disk[dir..dir + 11].fill(b' ');
        let label = volume_name.as_bytes();
        let n = label.len().min(11);
        disk[dir..dir + n].copy_from_slice(&label[..n]);
        disk[dir + 11] = VOLUME_LABEL_ATTRIBUTE;
    }
    Ok(disk)
}

/// `ImageTools` working on top of any `Storage`.
#[derive(Debug)]
pub struct StImageTools {
    rng: SmallRng,
}

impl StImageTools {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for StImageTools {
    fn default() -> Self {
        Self::new(0x5354)
    }
}

impl ImageTools for StImageTools {
    fn msa_to_st(
        &mut self,
        storage: &mut dyn Storage,
        src: &str,
        dst: &str,
        overwrite: bool,
    ) -> FwResult<()> {
        let msa = storage.read_file(src)?;
        let st = msa_decode(&msa)?;
        debug!(src, dst, bytes = st.len(), "MSA converted");
        storage.write_file(dst, &st, overwrite)
    }

    fn create_blank_st(
        &mut self,
        storage: &mut dyn Storage,
        path: &str,
        volume_name: &str,
        geometry: FloppyGeometry,
        overwrite: bool,
    ) -> FwResult<()> {
        if !overwrite && storage.file_exists(path) {
            return Err(FirmwareError::AlreadyExists(path.to_string()));
        }
        let disk = blank_st(geometry, volume_name, self.rng.gen())?;
        storage.write_file(path, &disk, overwrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DD: FloppyGeometry = FloppyGeometry {
        tracks: 80,
        sectors: 9,
        sides: 2,
    };

    fn msa_header(sectors: u16, sides: u16, start: u16, end: u16) -> Vec<u8> {
        [MSA_MAGIC, sectors, sides, start, end]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect()
    }

    #[test]
    fn test_msa_raw_and_compressed_tracks() {
        let track = BYTES_PER_SECTOR;
        let mut msa = msa_header(1, 0, 0, 1);
        // Track 0 stored raw.
        msa.extend_from_slice(&(track as u16).to_be_bytes());
        msa.extend(std::iter::repeat(0x11).take(track));
        // Track 1: two literals then a run of 510 bytes of 0x22.
        let packed = [0xAA, 0xBB, MSA_RLE_MARKER, 0x22, 0x01, 0xFE];
        msa.extend_from_slice(&(packed.len() as u16).to_be_bytes());
        msa.extend_from_slice(&packed);

        let st = msa_decode(&msa).unwrap();
        assert_eq!(st.len(), 2 * track);
        assert!(st[..track].iter().all(|&b| b == 0x11));
        assert_eq!(&st[track..track + 2], &[0xAA, 0xBB]);
        assert!(st[track + 2..].iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_msa_bad_header_rejected() {
        let mut msa = msa_header(9, 2, 0, 79);
        msa.extend_from_slice(&[0, 0]);
        assert!(matches!(msa_decode(&msa), Err(FirmwareError::Image(_))));
        assert!(msa_decode(&[0x0E]).is_err());
    }

    #[test]
    fn test_blank_double_density_layout() {
        let disk = blank_st(DD, "GAMES", 0x00AB_CDEF).unwrap();
        assert_eq!(disk.len(), 80 * 9 * 2 * 512);
        assert_eq!(disk[0], 0xE9);
        assert_eq!(&disk[8..11], &[0xEF, 0xCD, 0xAB]);
        assert_eq!(u16::from_le_bytes([disk[19], disk[20]]), 1440);
        assert_eq!(disk[21], 0xF9);
        assert_eq!(u16::from_le_bytes([disk[22], disk[23]]), 5);
        assert_eq!(disk[512], 0xF9);
        assert_eq!(disk[512 + 5 * 512], 0xF9);
        let dir = 11 * 512;
        assert_eq!(&disk[dir..dir + 11], b"GAMES      ");
        assert_eq!(disk[dir + 11], VOLUME_LABEL_ATTRIBUTE);
    }

    #[test]
    fn test_blank_rejects_tiny_geometry() {
        let tiny = FloppyGeometry {
            tracks: 1,
            sectors: 1,
            sides: 1,
        };
        assert!(blank_st(tiny, "", 0).is_err());
    }

    #[test]
    fn test_blank_rejects_oversized_geometry() {
        for geometry in [
            FloppyGeometry {
                tracks: 0xFFFF,
                sectors: 0xFFFF,
                sides: 2,
            },
            FloppyGeometry {
                tracks: 87,
                sectors: 9,
                sides: 2,
            },
            FloppyGeometry {
                tracks: 80,
                sectors: 37,
                sides: 2,
            },
            FloppyGeometry {
                tracks: 80,
                sectors: 9,
                sides: 3,
            },
        ] {
            assert!(matches!(
                blank_st(geometry, "", 0),
                Err(FirmwareError::Image(_))
            ));
        }
        // The largest extended-density layout still formats.
        let ed = FloppyGeometry {
            tracks: 86,
            sectors: 36,
            sides: 2,
        };
        assert_eq!(blank_st(ed, "", 0).unwrap().len(), 86 * 36 * 2 * 512);
    }
}
