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

//! eehw: Emotion Engine hardware register space
//!
//! This crate emulates the EE's 64KB memory-mapped register window at
//! `0x1000_0000`: the page router, the DMA controller with its ten
//! channels, the DMA address translator, and the image-unit DMA engines.
//!
//! # Architecture
//!
//! Everything hangs off one context object, [`core::hardware::Hardware`]:
//!
//! - [`core::registers`]: Register map and raw register store
//! - [`core::dma`]: Channel state, tags, the DMAC and its start gate
//! - [`core::memory`]: DMA address translation and backing memory
//! - [`core::ipu`]: toIPU/fromIPU channel engines and FIFOs
//! - [`core::interrupt`]: INTC status/mask registers
//! - [`core::savestate`]: Versioned snapshots
//!
//! # Example
//!
//! ```
//! use eehw::core::config::HwConfig;
//! use eehw::core::hardware::Hardware;
//!
//! let mut hw = Hardware::new(HwConfig::default())?;
//! hw.write32(0x1000_E000, 1)?; // D_CTRL.DMAE
//! assert!(hw.is_gate_open());
//! # Ok::<(), eehw::core::error::EmulatorError>(())
//! ```
//!
//! # Driving the Hardware
//!
//! 1. Create a [`core::hardware::Hardware`], optionally with a
//!    [`core::hardware::DmaPeer`] for the VIF/GIF/IPU back-ends
//! 2. Forward guest register loads and stores to it
//! 3. Step active channels and advance time from the scheduler loop
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, EmulatorError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
