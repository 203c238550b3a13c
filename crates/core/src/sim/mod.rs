// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! In-memory collaborators for tests and scripted host sessions. Each one
//! is a cheap handle over shared state, so a clone kept by the caller can
//! inspect what the firmware did with the boxed original.

mod devices;
mod network;
mod storage;

pub use devices::{ManualClock, MemFlash, RecordingSignal, SignalLog, FLASH_SIZE};
pub use network::{FixtureHttp, NetworkLog, SimNetwork};
pub use storage::MemStorage;
