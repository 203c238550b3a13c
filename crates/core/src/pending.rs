// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Requests handed from the trigger handler to the configurator loop.
//!
//! Every cell has a single writer (the handler) and a single reader (the
//! loop). Setting overwrites whatever is pending; taking clears it in the
//! same atomic operation. Nothing the handler calls here allocates.

use crate::codec::{decode_padded, WireCodec};
use crate::FwResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

const ARMED: u64 = 1 << 63;
const FLAG: u64 = 1 << 48;

/// A request parameter plus the token to echo on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub param: u16,
    /// Command-specific bit (floppy read-write mode, token presence).
    pub flag: bool,
    pub token: u32,
}

impl Request {
    pub fn new(param: u16, token: u32) -> Self {
        Self {
            param,
            flag: false,
            token,
        }
    }

    pub fn with_flag(mut self, flag: bool) -> Self {
        self.flag = flag;
        self
    }

    fn pack(self) -> u64 {
        let flag = if self.flag { FLAG } else { 0 };
        ARMED | flag | (u64::from(self.param) << 32) | u64::from(self.token)
    }

    fn unpack(raw: u64) -> Option<Self> {
        (raw & ARMED != 0).then(|| Self {
            param: (raw >> 32) as u16,
            flag: raw & FLAG != 0,
            token: raw as u32,
        })
    }
}

/// Lock-free single-slot cell packed into one machine word.
#[derive(Debug, Default)]
pub struct PendingCell {
    slot: AtomicU64,
}

impl PendingCell {
    pub fn set(&self, request: Request) {
        self.slot.store(request.pack(), Ordering::Release);
    }

    pub fn take(&self) -> Option<Request> {
        Request::unpack(self.slot.swap(0, Ordering::AcqRel))
    }

    pub fn peek(&self) -> Option<Request> {
        Request::unpack(self.slot.load(Ordering::Acquire))
    }

    pub fn is_set(&self) -> bool {
        self.peek().is_some()
    }
}

/// Payload bytes kept for requests the loop decodes itself.
pub const CAPTURE_CAPACITY: usize = 512;

/// Raw parameters of a request too large for a machine word, copied out of
/// the parser buffer without decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub token: u32,
    pub bytes: heapless::Vec<u8, CAPTURE_CAPACITY>,
}

impl Captured {
    /// Keeps at most `CAPTURE_CAPACITY` bytes; decoding zero fills the rest.
    pub fn new(token: u32, bytes: &[u8]) -> Self {
        let mut kept = heapless::Vec::new();
        let n = bytes.len().min(CAPTURE_CAPACITY);
        // Cannot overflow, `n` is within the capacity.
        let _ = kept.extend_from_slice(&bytes[..n]);
        Self { token, bytes: kept }
    }

    pub fn decode<T: WireCodec>(&self) -> FwResult<T> {
        decode_padded(&self.bytes)
    }
}

/// Single-slot mailbox for values too large for a machine word. The value
/// lives inline; the handler only ever tries the lock.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    /// Replaces the pending value. Returns false, dropping `value`, when
    /// the loop is taking the slot at that very moment.
    pub fn post(&self, value: T) -> bool {
        match self.slot.try_lock() {
            Ok(mut slot) => {
                *slot = Some(value);
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                *poisoned.into_inner() = Some(value);
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Every request the loop may have to service.
#[derive(Debug, Default)]
pub struct PendingRequests {
    // Boot selections; the param is the 1-based list index.
    pub rom_file: PendingCell,
    pub rom_network: PendingCell,
    /// `flag` set for read-write mode.
    pub floppy_file: PendingCell,
    pub floppy_download: PendingCell,
    pub reset: PendingCell,
    pub boot_rtc: PendingCell,

    pub persist_config: PendingCell,
    pub list_roms: PendingCell,
    pub list_floppies: PendingCell,
    pub scan_networks: PendingCell,
    /// `flag` set when the request carried a token.
    pub disconnect: PendingCell,
    pub roms_json: PendingCell,
    pub latest_release: PendingCell,
    /// The param is the lower-case database letter.
    pub query_floppy_db: PendingCell,

    /// Raw `WifiNetworkAuthInfo`; the token is unused.
    pub wifi_auth: Mailbox<Captured>,
    /// Raw `FloppyRequest`.
    pub create_floppy: Mailbox<Captured>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a boot selection ends the configurator loop.
    pub fn has_boot_selection(&self) -> bool {
        self.rom_file.is_set()
            || self.rom_network.is_set()
            || self.floppy_file.is_set()
            || self.floppy_download.is_set()
            || self.reset.is_set()
            || self.boot_rtc.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_set_take() {
        let cell = PendingCell::default();
        assert!(cell.take().is_none());
        cell.set(Request::new(3, 0xCAFE_BABE).with_flag(true));
        assert_eq!(
            cell.peek(),
            Some(Request {
                param: 3,
                flag: true,
                token: 0xCAFE_BABE
            })
        );
        assert!(cell.take().is_some());
        assert!(!cell.is_set());
    }

    #[test]
    fn test_cell_last_write_wins() {
        let cell = PendingCell::default();
        cell.set(Request::new(1, 10));
        cell.set(Request::new(2, 20));
        assert_eq!(cell.take(), Some(Request::new(2, 20)));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_zero_request_is_still_armed() {
        let cell = PendingCell::default();
        cell.set(Request::new(0, 0));
        assert_eq!(cell.take(), Some(Request::new(0, 0)));
    }

    #[test]
    fn test_mailbox_overwrite() {
        let mailbox = Mailbox::<Captured>::default();
        assert!(mailbox.post(Captured::new(1, b"first")));
        assert!(mailbox.post(Captured::new(2, b"second")));
        assert!(mailbox.is_set());
        let taken = mailbox.take().unwrap();
        assert_eq!(taken.token, 2);
        assert_eq!(&taken.bytes[..], b"second");
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_mailbox_post_never_waits() {
        let mailbox = std::sync::Arc::new(Mailbox::<Captured>::default());
        let held = mailbox.slot.lock().unwrap();
        let writer = mailbox.clone();
        let posted = std::thread::spawn(move || writer.post(Captured::new(7, &[1, 2])))
            .join()
            .unwrap();
        assert!(!posted);
        drop(held);
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_capture_is_bounded_and_padded() {
        let captured = Captured::new(9, &[0xAA; CAPTURE_CAPACITY + 100]);
        assert_eq!(captured.bytes.len(), CAPTURE_CAPACITY);

        let short = Captured::new(9, &[3, 0]);
        let request: crate::services::FloppyRequest = short.decode().unwrap();
        assert_eq!(request.template, 3);
        assert_eq!(request.tracks, 0);
        assert!(request.floppy_name.is_empty());
    }

    #[test]
    fn test_cross_thread_handoff() {
        let pending = std::sync::Arc::new(PendingRequests::new());
        let writer = pending.clone();
        std::thread::spawn(move || writer.list_roms.set(Request::new(0, 42)))
            .join()
            .unwrap();
        assert_eq!(pending.list_roms.take().map(|r| r.token), Some(42));
        assert!(!pending.has_boot_selection());
        pending.reset.set(Request::new(0, 1));
        assert!(pending.has_boot_selection());
    }
}
