// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Streaming parser for the ROM3 transmission protocol.
//!
//! The host transmits one 16-bit value per bus read: the header word, the
//! command id, the payload size in bytes, then the payload one halfword at
//! a time.

pub mod commands;

pub use commands::{Category, Command};

use crate::codec::swap_token;
use tracing::{debug, warn};

pub const PROTOCOL_HEADER: u16 = 0xABCD;
pub const PROTOCOL_READ_RESTART_MICROSECONDS: u64 = 10_000;
pub const MAX_PROTOCOL_PAYLOAD_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep {
    HeaderDetection,
    CommandRead,
    PayloadSizeRead,
    PayloadRead,
}

/// One captured command. Lives for the duration of a dispatch.
#[derive(Clone)]
pub struct TransmissionProtocol {
    pub command_id: u16,
    pub payload_size: u16,
    bytes_read: u16,
    payload: [u8; MAX_PROTOCOL_PAYLOAD_SIZE],
}

impl std::fmt::Debug for TransmissionProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionProtocol")
            .field("command_id", &self.command_id)
            .field("payload_size", &self.payload_size)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

impl Default for TransmissionProtocol {
    fn default() -> Self {
        Self {
            command_id: 0,
            payload_size: 0,
            bytes_read: 0,
            payload: [0; MAX_PROTOCOL_PAYLOAD_SIZE],
        }
    }
}

impl TransmissionProtocol {
    /// Builds a captured command directly, bypassing the parser.
    pub fn new(command_id: u16, payload: &[u8]) -> Self {
        let mut t = Self {
            command_id,
            payload_size: payload.len() as u16,
            ..Self::default()
        };
        let n = payload.len().min(MAX_PROTOCOL_PAYLOAD_SIZE);
        t.payload[..n].copy_from_slice(&payload[..n]);
        t.bytes_read = n as u16;
        t
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_id(self.command_id)
    }

    /// The payload bytes actually received.
    pub fn payload(&self) -> &[u8] {
        let n = usize::from(self.payload_size)
            .min(usize::from(self.bytes_read))
            .min(MAX_PROTOCOL_PAYLOAD_SIZE);
        &self.payload[..n]
    }

    /// Payload bytes from `offset`, zero-padded reads are the caller's job.
    pub fn payload_from(&self, offset: usize) -> &[u8] {
        let p = self.payload();
        &p[offset.min(p.len())..]
    }

    /// Every byte the host wrote for this command, including the pad byte
    /// of an odd-sized payload. Older bytes in the buffer are not visible.
    fn received(&self) -> &[u8] {
        &self.payload[..usize::from(self.bytes_read).min(MAX_PROTOCOL_PAYLOAD_SIZE)]
    }

    /// Request token: the first four payload bytes, halfwords exchanged.
    /// Zero when fewer were sent.
    pub fn token(&self) -> u32 {
        match self.received().get(..4) {
            Some(p) => swap_token(u32::from_le_bytes([p[0], p[1], p[2], p[3]])),
            None => 0,
        }
    }

    pub fn has_token(&self) -> bool {
        self.payload().len() >= 4
    }

    /// Little-endian pair of payload bytes at `offset`, zero when the
    /// host did not send that far.
    pub fn param_u16(&self, offset: usize) -> u16 {
        match self.received().get(offset..offset + 2) {
            Some(b) => u16::from(b[0]) | (u16::from(b[1]) << 8),
            None => 0,
        }
    }

    fn reset(&mut self) {
        self.command_id = 0;
        self.payload_size = 0;
        self.bytes_read = 0;
    }
}

/// Assembles commands from the stream of 16-bit trigger values.
#[derive(Debug)]
pub struct ProtocolParser {
    step: ParseStep,
    last_header_found: u64,
    restart_us: u64,
    transmission: TransmissionProtocol,
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new(PROTOCOL_READ_RESTART_MICROSECONDS)
    }
}

impl ProtocolParser {
    pub fn new(restart_us: u64) -> Self {
        Self {
            step: ParseStep::HeaderDetection,
            last_header_found: 0,
            restart_us,
            transmission: TransmissionProtocol::default(),
        }
    }

    pub fn step(&self) -> ParseStep {
        self.step
    }

    /// Consumes one value captured at `now_us`. When a command completes,
    /// `on_complete` runs before the parser resets for the next header.
    pub fn feed<F>(&mut self, data: u16, now_us: u64, on_complete: F)
    where
        F: FnOnce(&TransmissionProtocol),
    {
        if now_us.saturating_sub(self.last_header_found) > self.restart_us
            && self.step != ParseStep::HeaderDetection
        {
            debug!(
                lapse_us = now_us - self.last_header_found,
                "Restarting protocol read"
            );
            self.step = ParseStep::HeaderDetection;
        }

        match self.step {
            ParseStep::HeaderDetection => {
                if data == PROTOCOL_HEADER {
                    self.step = ParseStep::CommandRead;
                }
                self.last_header_found = now_us;
            }
            ParseStep::CommandRead => {
                self.transmission.command_id = data;
                self.step = ParseStep::PayloadSizeRead;
            }
            ParseStep::PayloadSizeRead => {
                self.transmission.payload_size = data;
                self.transmission.bytes_read = 0;
                if data == 0 {
                    self.complete(on_complete);
                } else {
                    self.step = ParseStep::PayloadRead;
                }
            }
            ParseStep::PayloadRead => {
                let at = usize::from(self.transmission.bytes_read);
                if at + 2 <= MAX_PROTOCOL_PAYLOAD_SIZE {
                    self.transmission.payload[at..at + 2].copy_from_slice(&data.to_le_bytes());
                } else {
                    warn!(
                        command = self.transmission.command_id,
                        "Payload exceeds {} bytes, dropping word", MAX_PROTOCOL_PAYLOAD_SIZE
                    );
                }
                self.transmission.bytes_read = self.transmission.bytes_read.saturating_add(2);
                if self.transmission.bytes_read >= self.transmission.payload_size {
                    self.complete(on_complete);
                }
            }
        }
    }

    fn complete<F>(&mut self, on_complete: F)
    where
        F: FnOnce(&TransmissionProtocol),
    {
        debug!(
            command = self.transmission.command_id,
            payload_size = self.transmission.payload_size,
            "Command received"
        );
        on_complete(&self.transmission);
        self.transmission.reset();
        self.step = ParseStep::HeaderDetection;
    }
}
