// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! File lists, remote catalogs and the name-list wire format.

use crate::codec::swap_words;
use crate::services::{FloppyImageInfo, RomInfo};
use crate::{FirmwareError, FwResult};
use std::cmp::Ordering;
use tracing::{error, warn};

/// Terminator after local file lists: a zero word and an `0xFFFF` word.
const FILE_LIST_END: &[u8] = &[0x00, 0x00, 0xFF, 0xFF];
/// Terminator after remote name lists.
const NAME_LIST_END: &[u8] = &[0x00, 0x00];

const FLOPPY_DB_COLUMNS: usize = 6;

/// Case-insensitive match of the text after the last dot. Names without an
/// extension, or whose only dot is the first character, never match.
pub fn has_allowed_extension(name: &str, allowed: &[String]) -> bool {
    match name.rfind('.') {
        Some(0) | None => false,
        Some(dot) => {
            let ext = &name[dot + 1..];
            allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))
        }
    }
}

/// ASCII case-insensitive ordering, shorter prefix first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Drops hidden files and names without an allowed extension, then sorts.
pub fn filter_and_sort(names: Vec<String>, allowed: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = names
        .into_iter()
        .filter(|n| !n.starts_with('.') && has_allowed_extension(n, allowed))
        .collect();
    kept.sort_by(|a, b| compare_names(a, b));
    kept
}

/// Parses the remote ROM index: a JSON array of `{url, name, description,
/// size_kb}` objects. Sorted by name, then url.
pub fn parse_rom_index(json: &[u8]) -> FwResult<Vec<RomInfo>> {
    let mut items: Vec<RomInfo> = serde_json::from_slice(json)?;
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.url.cmp(&b.url)));
    Ok(items)
}

/// Parses the remote floppy database, one `name,status,description,tags,
/// extra,url` row per line. Short rows are skipped.
pub fn parse_floppy_db(csv: &[u8]) -> FwResult<Vec<FloppyImageInfo>> {
    let text = std::str::from_utf8(csv)
        .map_err(|e| FirmwareError::Catalog(format!("floppy database is not UTF-8: {}", e)))?;
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.splitn(FLOPPY_DB_COLUMNS, ',').collect();
        if cols.len() < FLOPPY_DB_COLUMNS {
            warn!(line = line_no + 1, "Malformed floppy database row skipped");
            continue;
        }
        rows.push(FloppyImageInfo {
            name: cols[0].to_string(),
            status: cols[1].to_string(),
            description: cols[2].to_string(),
            tags: cols[3].to_string(),
            extra: cols[4].to_string(),
            url: cols[5].to_string(),
        });
    }
    Ok(rows)
}

/// Absolute URIs are kept, relative ones are resolved against `base`.
pub fn join_url(base: &str, uri: &str) -> String {
    if uri.starts_with("http") {
        uri.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            uri.trim_start_matches('/')
        )
    }
}

/// Text after the last `/`.
pub fn extract_filename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// `name\t(N Kb)` as shown by the host's remote ROM browser.
pub fn rom_index_label(info: &RomInfo) -> String {
    format!("{}\t({} Kb)", info.name, info.size_kb)
}

fn encode_names<S: AsRef<str>>(names: &[S], end: &[u8], capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    for name in names {
        let name = name.as_ref();
        // name, NUL, worst-case pad byte, terminator
        if buf.len() + name.len() + 2 + end.len() > capacity {
            error!(
                entry = name,
                capacity, "Not enough memory to store the name list, truncated"
            );
            break;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    if buf.len() % 2 != 0 {
        buf.push(0);
    }
    buf.extend_from_slice(end);
    swap_words(&mut buf);
    buf
}

/// Local ROM/floppy file list in wire order, bounded by `capacity`.
pub fn encode_file_list<S: AsRef<str>>(names: &[S], capacity: usize) -> Vec<u8> {
    encode_names(names, FILE_LIST_END, capacity)
}

/// Remote name list (ROM index labels, floppy database names) in wire order.
pub fn encode_name_list<S: AsRef<str>>(names: &[S], capacity: usize) -> Vec<u8> {
    encode_names(names, NAME_LIST_END, capacity)
}
