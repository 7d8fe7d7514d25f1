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

//! Save states
//!
//! A [`SaveState`] is a flat list of plain scalars covering every channel,
//! both IPU engine runtimes, the deferred start set, the DMAC globals, the
//! pending completion delays, the IPU FIFOs, the INTC and the raw register
//! store. No pointers or trait objects are captured; the peer and the
//! contents of DMA-visible memory belong to the owner.
//!
//! # Example
//!
//! ```
//! use eehw::core::config::HwConfig;
//! use eehw::core::hardware::Hardware;
//! use eehw::core::savestate::SaveState;
//!
//! let mut hw = Hardware::new(HwConfig::default())?;
//! hw.write32(0x1000_E000, 1)?;
//!
//! let bytes = hw.freeze().to_bytes()?;
//!
//! let mut restored = Hardware::new(HwConfig::default())?;
//! restored.thaw(&SaveState::from_bytes(&bytes)?)?;
//! assert!(restored.is_gate_open());
//! # Ok::<(), eehw::core::error::EmulatorError>(())
//! ```

use crate::core::dma::{ChannelId, ChannelMask, Chcr};
use crate::core::error::{EmulatorError, Result};
use crate::core::hardware::Hardware;
use crate::core::ipu::ChannelRuntimeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Format version; bump on any field change
pub const STATE_VERSION: u32 = 2;

/// Registers of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    pub chcr: u32,
    pub madr: u32,
    /// Full QWC register, pad bits included
    pub qwc: u32,
    pub tadr: u32,
}

/// Versioned snapshot of the hardware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,

    /// Indexed by channel number
    pub channels: Vec<ChannelState>,
    pub to_ipu: ChannelRuntimeStatus,
    pub from_ipu: ChannelRuntimeStatus,
    /// Deferred start set
    pub queued: ChannelMask,

    pub d_ctrl: u32,
    pub d_stat: u32,
    pub d_enable: u32,
    pub d_stadr: u32,
    pub bus_error: bool,

    /// Remaining completion delay per channel
    pub pending: Vec<Option<u32>>,

    pub in_fifo: Vec<u128>,
    pub out_fifo: Vec<u128>,

    pub intc_status: u16,
    pub intc_mask: u16,

    /// Raw register store
    pub registers: Vec<u8>,
}

impl SaveState {
    /// Encode the state with bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Decode a state, rejecting other format versions
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (state, _): (SaveState, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if state.version != STATE_VERSION {
            return Err(EmulatorError::StateVersion {
                expected: STATE_VERSION,
                got: state.version,
            });
        }
        Ok(state)
    }

    /// Write the encoded state to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_bytes()?)?;
        log::info!("Save state written to {}", path.as_ref().display());
        Ok(())
    }

    /// Read and decode a state written by [`SaveState::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let state = Self::from_bytes(&bytes)?;
        log::info!(
            "Save state loaded from {} (saved {})",
            path.as_ref().display(),
            state.saved_at
        );
        Ok(state)
    }
}

impl Hardware {
    /// Capture the current state
    pub fn freeze(&self) -> SaveState {
        let channels = ChannelId::ALL
            .iter()
            .map(|&ch| {
                let c = self.dmac.channel(ch);
                ChannelState {
                    chcr: c.chcr.bits(),
                    madr: c.madr,
                    qwc: c.qwc_register(),
                    tadr: c.tadr,
                }
            })
            .collect();

        SaveState {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            channels,
            to_ipu: *self.ipu.to_ipu(),
            from_ipu: *self.ipu.from_ipu(),
            queued: self.dmac.queued(),
            d_ctrl: self.dmac.ctrl(),
            d_stat: self.dmac.read_stat(false),
            d_enable: self.dmac.enable(),
            d_stadr: self.dmac.stadr(),
            bus_error: self.memory.bus_error(),
            pending: ChannelId::ALL
                .iter()
                .map(|&ch| self.completions.remaining(ch))
                .collect(),
            in_fifo: self.ipu.in_fifo().to_vec(),
            out_fifo: self.ipu.out_fifo().to_vec(),
            intc_status: self.intc.read_status() as u16,
            intc_mask: self.intc.read_mask() as u16,
            registers: self.regs.as_bytes().to_vec(),
        }
    }

    /// Restore a captured state
    ///
    /// Nothing is changed if the state is malformed.
    pub fn thaw(&mut self, state: &SaveState) -> Result<()> {
        if state.version != STATE_VERSION {
            return Err(EmulatorError::StateVersion {
                expected: STATE_VERSION,
                got: state.version,
            });
        }
        if state.channels.len() != ChannelId::COUNT {
            return Err(EmulatorError::InvalidChannel(state.channels.len() as u32));
        }
        if state.pending.len() != ChannelId::COUNT {
            return Err(EmulatorError::InvalidChannel(state.pending.len() as u32));
        }

        for (ch, saved) in ChannelId::ALL.iter().zip(&state.channels) {
            let c = self.dmac.channel_mut(*ch);
            c.chcr = Chcr(saved.chcr);
            c.madr = saved.madr;
            c.set_qwc_register(saved.qwc);
            c.tadr = saved.tadr;
        }
        for (ch, remaining) in ChannelId::ALL.iter().zip(&state.pending) {
            self.completions.restore(*ch, *remaining);
        }

        self.dmac
            .restore_globals(state.d_ctrl, state.d_stat, state.d_enable, state.d_stadr);
        self.dmac
            .restore_queued(state.queued & ChannelMask::all());
        self.memory.set_bus_error(state.bus_error);
        self.ipu
            .restore(state.to_ipu, state.from_ipu, &state.in_fifo, &state.out_fifo);
        self.intc.restore(state.intc_status, state.intc_mask);
        self.regs.load_bytes(&state.registers);

        log::info!("Save state restored (saved {})", state.saved_at);
        Ok(())
    }
}
