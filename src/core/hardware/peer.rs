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

//! External peer trait
//!
//! Everything the register space talks to but does not emulate (the VIF
//! and GIF back-ends, the IPU decoder core, the CPU's view of channel
//! interrupts) sits behind [`DmaPeer`]. The hardware holds one boxed peer
//! and calls into it synchronously.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │           Hardware           │
//! │  registers · DMAC · IPU DMA  │
//! └──────────────┬───────────────┘
//!                │ Box<dyn DmaPeer>
//!      ┌─────────┴─────────┐
//!      │ VIF/GIF back-ends │
//!      │ IPU decoder, CPU  │
//!      └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use eehw::core::config::HwConfig;
//! use eehw::core::hardware::{DmaPeer, Hardware};
//!
//! struct BusyGif;
//!
//! impl DmaPeer for BusyGif {
//!     fn graphics_paths_idle(&self) -> bool {
//!         false
//!     }
//! }
//!
//! let hw = Hardware::with_peer(HwConfig::default(), Box::new(BusyGif))?;
//! assert!(!hw.peer().graphics_paths_idle());
//! # Ok::<(), eehw::core::error::EmulatorError>(())
//! ```

use crate::core::dma::ChannelId;

/// Hardware FIFOs owned by an external back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFifo {
    Vif0,
    Vif1,
    Gif,
}

/// Collaborator on the far side of the register space
///
/// Every method has a default that logs and otherwise does nothing.
pub trait DmaPeer {
    /// A channel's start function is about to run
    fn channel_started(&mut self, ch: ChannelId) {
        log::trace!("peer: {} started", ch.name());
    }

    /// A channel's completion interrupt was delivered
    fn channel_interrupt(&mut self, ch: ChannelId) {
        log::trace!("peer: {} interrupt", ch.name());
    }

    /// A 128-bit write hit a back-end FIFO
    fn write_fifo(&mut self, fifo: PeerFifo, qword: u128) {
        log::trace!("peer: {:?} FIFO <- {:032X} dropped", fifo, qword);
    }

    /// A 128-bit read hit a back-end FIFO
    fn read_fifo(&mut self, fifo: PeerFifo) -> u128 {
        log::trace!("peer: {:?} FIFO read, returning 0", fifo);
        0
    }

    /// Whether the GIF has flushed every path, allowing toIPU to send
    fn graphics_paths_idle(&self) -> bool {
        true
    }

    /// IPU_CMD was written
    fn ipu_command(&mut self, value: u32) {
        log::trace!("peer: IPU command 0x{:08X}", value);
    }

    /// GIF_CTRL.RST was written
    fn gif_reset(&mut self) {
        log::trace!("peer: GIF reset");
    }

    /// fromIPU drained with stall control active; `drain` may proceed
    fn stall_released(&mut self, drain: ChannelId) {
        log::trace!("peer: stall released for {}", drain.name());
    }
}

/// Peer that accepts everything and provides nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPeer;

impl DmaPeer for NullPeer {}
