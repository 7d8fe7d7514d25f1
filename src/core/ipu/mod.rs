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

//! IPU (Image Processing Unit) DMA engine
//!
//! The IPU is fed by two DMA channels:
//!
//! - **toIPU** (channel 4): memory → input FIFO, normal or chain mode
//! - **fromIPU** (channel 3): output FIFO → memory, normal mode
//!
//! Both FIFOs are eight quadwords deep. A full input FIFO or an empty
//! output FIFO stalls the respective channel; the step functions then
//! return [`StepOutcome::NoProgress`] and are simply called again later.
//!
//! # Chain Walking
//!
//! In chain mode the toIPU channel alternates between fetching a tag at
//! TADR and draining the leg the tag describes:
//!
//! | Tag  | MADR        | TADR after fetch     | TADR after leg |
//! |------|-------------|----------------------|----------------|
//! | REFE | ADDR        | TADR + 16            | -              |
//! | CNT  | TADR + 16   | MADR + QWC * 16      | -              |
//! | NEXT | TADR + 16   | ADDR                 | -              |
//! | REF  | ADDR        | TADR + 16            | -              |
//! | REFS | ADDR        | TADR + 16            | -              |
//! | END  | TADR + 16   | unchanged            | MADR           |
//!
//! REFE and END end the chain, as does any tag with IRQ set while
//! CHCR.TIE is enabled. The completion interrupt is requested only once
//! the final leg has drained.

mod fifo;

pub use fifo::IpuFifo;

use crate::core::dma::{Channel, ChannelId, DmaInterrupt, DmaTag, TagId, TransferMode};
use crate::core::memory::{Memory, QWORD};
use serde::{Deserialize, Serialize};

/// Top-level state of a channel engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineState {
    #[default]
    Idle,
    Normal,
    Chain,
}

/// Per-channel engine bookkeeping that survives between step calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelRuntimeStatus {
    pub state: EngineState,
    /// A leg set up by a tag (or a normal transfer) is being drained
    pub in_progress: bool,
    /// The current leg is the last one
    pub dma_finished: bool,
    pub mode: TransferMode,
    /// Kind of the tag that set up the current leg
    pub chain_tag: TagId,
}

/// Result of one step call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing moved; call again later
    NoProgress,
    /// Some quadwords moved, transfer continues
    Progress(u32),
    /// Transfer finished and its completion was requested
    Complete(u32),
}

/// Everything a step call borrows from its owner
pub struct EngineIo<'a> {
    pub channel: &'a mut Channel,
    pub memory: &'a mut Memory,
    pub irq: &'a mut dyn DmaInterrupt,
    /// GIF path handshake; toIPU may not send while graphics paths are busy
    pub paths_idle: bool,
    pub max_tags: u32,
    pub irq_cycles_per_qword: u32,
}

impl EngineIo<'_> {
    fn request_completion(&mut self, ch: ChannelId, moved: u32) {
        let delay = moved.max(1).saturating_mul(self.irq_cycles_per_qword);
        self.irq.dma_complete(ch, delay);
    }
}

/// IPU FIFOs and the runtime status of both IPU channels
#[derive(Debug, Clone, Default)]
pub struct Ipu {
    to_ipu: ChannelRuntimeStatus,
    from_ipu: ChannelRuntimeStatus,
    in_fifo: IpuFifo,
    out_fifo: IpuFifo,
}

impl Ipu {
    /// Create the IPU with empty FIFOs and both channel engines idle
    pub fn new() -> Self {
        Self::default()
    }

    /// Return to the power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Runtime status of the toIPU channel
    pub fn to_ipu(&self) -> &ChannelRuntimeStatus {
        &self.to_ipu
    }

    /// Runtime status of the fromIPU channel
    pub fn from_ipu(&self) -> &ChannelRuntimeStatus {
        &self.from_ipu
    }

    /// Input FIFO (filled by toIPU, drained by the decoder)
    pub fn in_fifo(&self) -> &IpuFifo {
        &self.in_fifo
    }

    /// Mutable input FIFO; the decoder pops from here
    pub fn in_fifo_mut(&mut self) -> &mut IpuFifo {
        &mut self.in_fifo
    }

    /// Output FIFO (filled by the decoder, drained by fromIPU)
    pub fn out_fifo(&self) -> &IpuFifo {
        &self.out_fifo
    }

    /// Mutable output FIFO; the decoder pushes here
    pub fn out_fifo_mut(&mut self) -> &mut IpuFifo {
        &mut self.out_fifo
    }

    /// IPU_CTRL reset: drop both FIFOs
    pub fn reset_fifos(&mut self) {
        log::debug!(
            "IPU FIFO reset (in={}, out={})",
            self.in_fifo.len(),
            self.out_fifo.len()
        );
        self.in_fifo.clear();
        self.out_fifo.clear();
    }

    /// Restore runtime status and FIFO contents from a save state
    pub(crate) fn restore(
        &mut self,
        to_ipu: ChannelRuntimeStatus,
        from_ipu: ChannelRuntimeStatus,
        in_fifo: &[u128],
        out_fifo: &[u128],
    ) {
        self.to_ipu = to_ipu;
        self.from_ipu = from_ipu;
        self.in_fifo.restore(in_fifo);
        self.out_fifo.restore(out_fifo);
    }

    // ========== toIPU (channel 4) ==========

    /// Prepare the toIPU channel after its STR was set
    ///
    /// A chain start with a leftover QWC first drains that leg from MADR,
    /// treating the tag cached in CHCR as the one that set it up. Where the
    /// chain continues is read from TADR once the leg drains, so registers
    /// rewritten while the channel was stopped take effect.
    pub fn start_to_ipu(&mut self, channel: &Channel) {
        let chcr = channel.chcr;
        let rt = &mut self.to_ipu;

        match chcr.mode() {
            TransferMode::Chain => {
                if channel.qwc > 0 {
                    rt.in_progress = true;
                    rt.chain_tag = chcr.tag_id();
                    rt.dma_finished = leg_ends_chain(rt.chain_tag, chcr.tag_irq(), chcr.tie());
                    log::debug!(
                        "toIPU: draining {:?} leg (madr=0x{:08X}, qwc={})",
                        rt.chain_tag,
                        channel.madr,
                        channel.qwc
                    );
                } else {
                    rt.in_progress = false;
                    rt.dma_finished = false;
                }
                rt.mode = TransferMode::Chain;
                rt.state = EngineState::Chain;
            }
            mode => {
                if mode == TransferMode::Interleave {
                    log::warn!("toIPU: interleave mode not supported, running normal");
                }
                rt.in_progress = true;
                rt.dma_finished = true;
                rt.mode = TransferMode::Normal;
                rt.state = EngineState::Normal;
            }
        }

        log::debug!(
            "toIPU: start {:?} madr=0x{:08X} qwc={} tadr=0x{:08X}",
            rt.state,
            channel.madr,
            channel.qwc,
            channel.tadr
        );
    }

    /// Run the toIPU channel as far as the input FIFO allows
    pub fn step_to_ipu(&mut self, io: &mut EngineIo) -> StepOutcome {
        if !io.channel.is_active()
            || self.to_ipu.state == EngineState::Idle
            || io.irq.is_pending(ChannelId::ToIpu)
        {
            return StepOutcome::NoProgress;
        }
        if !io.paths_idle {
            log::trace!("toIPU: waiting for graphics paths");
            return StepOutcome::NoProgress;
        }

        let mut moved = 0;
        let mut fetched = 0;

        loop {
            if io.channel.qwc > 0 {
                moved += self.fill_in_fifo(io);
                if io.channel.qwc > 0 {
                    // FIFO full or bus error
                    break;
                }
            }

            if self.to_ipu.in_progress {
                self.to_ipu.in_progress = false;
                if self.to_ipu.mode == TransferMode::Chain {
                    match self.to_ipu.chain_tag {
                        TagId::End | TagId::Call | TagId::Ret => {
                            io.channel.tadr = io.channel.madr
                        }
                        _ => {}
                    }
                }
            }

            if self.to_ipu.dma_finished {
                self.to_ipu.state = EngineState::Idle;
                io.request_completion(ChannelId::ToIpu, moved);
                log::debug!("toIPU: transfer complete ({} qwords this step)", moved);
                return StepOutcome::Complete(moved);
            }

            if fetched == io.max_tags || !self.fetch_to_ipu_tag(io) {
                break;
            }
            fetched += 1;
        }

        if moved > 0 || fetched > 0 {
            StepOutcome::Progress(moved)
        } else {
            StepOutcome::NoProgress
        }
    }

    /// Move as much of the current leg as fits into the input FIFO
    fn fill_in_fifo(&mut self, io: &mut EngineIo) -> u32 {
        let budget = (io.channel.qwc as usize).min(self.in_fifo.free());
        let mut moved = 0;

        for _ in 0..budget {
            let Some(qword) = io.memory.read_qword(io.channel.madr) else {
                break;
            };
            self.in_fifo.push(qword);
            io.channel.madr = io.channel.madr.wrapping_add(QWORD as u32);
            io.channel.qwc -= 1;
            moved += 1;
        }

        log::trace!(
            "toIPU: {} qwords -> FIFO ({} queued), qwc={}",
            moved,
            self.in_fifo.len(),
            io.channel.qwc
        );
        moved
    }

    /// Fetch and apply the tag at TADR; false if it could not be read
    fn fetch_to_ipu_tag(&mut self, io: &mut EngineIo) -> bool {
        let tadr = io.channel.tadr;
        let Some(qword) = io.memory.read_qword(tadr) else {
            log::error!("toIPU: tag fetch from 0x{:08X} failed", tadr);
            return false;
        };
        let tag = DmaTag::decode(qword);
        let channel = &mut *io.channel;
        let rt = &mut self.to_ipu;

        channel.chcr.set_tag(tag.upper);
        channel.qwc = tag.qwc;
        let after_tag = tadr.wrapping_add(QWORD as u32);

        match tag.id {
            TagId::Refe | TagId::Ref | TagId::Refs => {
                channel.madr = tag.addr;
                channel.tadr = after_tag;
            }
            TagId::Cnt => {
                channel.madr = after_tag;
                channel.tadr = after_tag.wrapping_add(tag.qwc as u32 * QWORD as u32);
            }
            TagId::Next => {
                channel.madr = after_tag;
                channel.tadr = tag.addr;
            }
            TagId::End => {
                channel.madr = after_tag;
            }
            TagId::Call | TagId::Ret => {
                log::error!(
                    "toIPU: {:?} tag at 0x{:08X} is not supported, ending chain",
                    tag.id,
                    tadr
                );
                channel.madr = after_tag;
            }
        }

        rt.chain_tag = tag.id;
        rt.in_progress = true;
        rt.dma_finished = leg_ends_chain(tag.id, tag.irq, channel.chcr.tie());

        log::debug!(
            "toIPU: tag {:?} at 0x{:08X}: qwc={} addr=0x{:08X} irq={} -> madr=0x{:08X} tadr=0x{:08X}{}",
            tag.id,
            tadr,
            tag.qwc,
            tag.addr,
            tag.irq,
            channel.madr,
            channel.tadr,
            if rt.dma_finished { " (last)" } else { "" }
        );
        true
    }

    // ========== fromIPU (channel 3) ==========

    /// Prepare the fromIPU channel after its STR was set
    pub fn start_from_ipu(&mut self, channel: &Channel) {
        if channel.chcr.mode() != TransferMode::Normal {
            log::warn!(
                "fromIPU: {:?} mode not supported, running normal",
                channel.chcr.mode()
            );
        }
        let rt = &mut self.from_ipu;
        rt.in_progress = true;
        rt.dma_finished = true;
        rt.mode = TransferMode::Normal;
        rt.state = EngineState::Normal;

        log::debug!(
            "fromIPU: start madr=0x{:08X} qwc={}",
            channel.madr,
            channel.qwc
        );
    }

    /// Drain the output FIFO into memory
    ///
    /// A transfer started with QWC 0 never completes.
    pub fn step_from_ipu(&mut self, io: &mut EngineIo) -> StepOutcome {
        if !io.channel.is_active()
            || self.from_ipu.state == EngineState::Idle
            || io.irq.is_pending(ChannelId::FromIpu)
            || io.channel.qwc == 0
        {
            return StepOutcome::NoProgress;
        }

        let budget = (io.channel.qwc as usize).min(self.out_fifo.len());
        let mut moved = 0;

        for _ in 0..budget {
            let Some(qword) = self.out_fifo.peek() else {
                break;
            };
            if !io.memory.write_qword(io.channel.madr, qword) {
                break;
            }
            self.out_fifo.pop();
            io.channel.madr = io.channel.madr.wrapping_add(QWORD as u32);
            io.channel.qwc -= 1;
            moved += 1;
        }

        if io.channel.qwc == 0 {
            self.from_ipu.in_progress = false;
            self.from_ipu.state = EngineState::Idle;
            io.request_completion(ChannelId::FromIpu, moved);
            log::debug!("fromIPU: transfer complete, madr=0x{:08X}", io.channel.madr);
            return StepOutcome::Complete(moved);
        }

        if moved > 0 {
            log::trace!("fromIPU: {} qwords -> memory, qwc={}", moved, io.channel.qwc);
            StepOutcome::Progress(moved)
        } else {
            StepOutcome::NoProgress
        }
    }
}

/// Whether the leg set up by a tag is the last one of the chain
fn leg_ends_chain(id: TagId, irq: bool, tie: bool) -> bool {
    id.ends_chain() || matches!(id, TagId::Call | TagId::Ret) || (irq && tie)
}
