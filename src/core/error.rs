// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the hardware core
//!
//! Guest-visible faults (DMA bus errors, writes to a live channel, reserved
//! mode encodings) are never reported through these types; they are
//! absorbed into hardware state exactly like the real device does. What
//! remains here are caller mistakes and host-side I/O failures.

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Errors produced by the hardware core
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// Register access not aligned to its width
    #[error("Unaligned {size}-byte access at 0x{address:08X}")]
    UnalignedAccess { address: u32, size: u32 },

    /// Register access width other than 1, 2, 4, 8 or 16 bytes
    #[error("Invalid access width {size} at 0x{address:08X}")]
    InvalidAccessWidth { address: u32, size: u32 },

    /// Address does not fall inside the 64 KiB hardware register window
    #[error("Address 0x{address:08X} is outside the hardware register space")]
    OutsideRegisterSpace { address: u32 },

    /// Channel number outside 0-9
    #[error("Invalid DMA channel {0}")]
    InvalidChannel(u32),

    /// Host file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Configuration value rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Save state could not be encoded
    #[error("Save state encode error: {0}")]
    StateEncode(#[from] bincode::error::EncodeError),

    /// Save state could not be decoded
    #[error("Save state decode error: {0}")]
    StateDecode(#[from] bincode::error::DecodeError),

    /// Save state was written by an incompatible version
    #[error("Save state version mismatch: expected {expected}, got {got}")]
    StateVersion { expected: u32, got: u32 },
}
