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

//! Hardware context
//!
//! [`Hardware`] owns the whole register space: the register file, the DMA
//! controller and its ten channels, DMA-visible memory, the IPU FIFOs and
//! channel engines, the interrupt controller and the completion schedule.
//! Every operation goes through it; nothing is global.
//!
//! # Driving the Hardware
//!
//! The owner runs a cooperative loop:
//!
//! 1. Guest loads/stores go through [`Hardware::read`]/[`Hardware::write`]
//! 2. Active channels are stepped with [`Hardware::step_channel`]
//! 3. Emulated time is advanced with [`Hardware::advance`], which delivers
//!    due completion interrupts
//!
//! # Example
//!
//! ```
//! use eehw::core::config::HwConfig;
//! use eehw::core::dma::ChannelId;
//! use eehw::core::hardware::Hardware;
//!
//! let mut hw = Hardware::new(HwConfig::default())?;
//!
//! // Enable the DMAC, then run a 2-quadword normal transfer into the IPU
//! hw.write32(0x1000_E000, 1).unwrap();
//! hw.write32(0x1000_B410, 0x0010_0000).unwrap(); // MADR
//! hw.write32(0x1000_B420, 2).unwrap();           // QWC
//! hw.write32(0x1000_B400, 0x0000_0101).unwrap(); // CHCR: from memory, STR
//!
//! assert_eq!(hw.ipu().in_fifo().len(), 2);
//!
//! hw.advance(1000);
//! assert!(!hw.channel(ChannelId::ToIpu).is_active());
//! assert_eq!(hw.read32(0x1000_E010).unwrap() & (1 << 4), 1 << 4);
//! # Ok::<(), eehw::core::error::EmulatorError>(())
//! ```

mod peer;
mod router;

pub use peer::{DmaPeer, NullPeer, PeerFifo};

use crate::core::config::HwConfig;
use crate::core::dma::{
    Channel, ChannelId, ChannelMask, ChcrWrite, CompletionQueue, DmaInterrupt, Dmac,
};
use crate::core::error::Result;
use crate::core::interrupt::InterruptController;
use crate::core::ipu::{ChannelRuntimeStatus, EngineIo, Ipu, StepOutcome};
use crate::core::memory::Memory;
use crate::core::registers::RegisterFile;

/// Start and step entry points of one channel
struct ChannelOps {
    start: fn(&mut Hardware),
    step: fn(&mut Hardware) -> StepOutcome,
}

/// Channels driven by an external engine
const EXTERNAL: ChannelOps = ChannelOps {
    start: start_external,
    step: step_external,
};

const FROM_IPU: ChannelOps = ChannelOps {
    start: start_from_ipu,
    step: step_from_ipu,
};

const TO_IPU: ChannelOps = ChannelOps {
    start: start_to_ipu,
    step: step_to_ipu,
};

/// Per-channel dispatch, indexed by channel number
const CHANNEL_OPS: [ChannelOps; ChannelId::COUNT] = [
    EXTERNAL, // VIF0
    EXTERNAL, // VIF1
    EXTERNAL, // GIF
    FROM_IPU, // fromIPU
    TO_IPU,   // toIPU
    EXTERNAL, // SIF0
    EXTERNAL, // SIF1
    EXTERNAL, // SIF2
    EXTERNAL, // fromSPR
    EXTERNAL, // toSPR
];

/// Emulated hardware register space
pub struct Hardware {
    pub(crate) config: HwConfig,
    pub(crate) regs: RegisterFile,
    pub(crate) dmac: Dmac,
    pub(crate) memory: Memory,
    pub(crate) ipu: Ipu,
    pub(crate) intc: InterruptController,
    pub(crate) completions: CompletionQueue,
    peer: Box<dyn DmaPeer>,
}

impl Hardware {
    /// Create hardware with no external peer
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidConfig`] if `config` does not pass
    /// [`HwConfig::validate`].
    ///
    /// [`EmulatorError::InvalidConfig`]: crate::core::error::EmulatorError::InvalidConfig
    pub fn new(config: HwConfig) -> Result<Self> {
        Self::with_peer(config, Box::new(NullPeer))
    }

    /// Create hardware wired to an external peer
    ///
    /// # Arguments
    ///
    /// * `config` - Memory size, completion timing and guard settings
    /// * `peer` - Back-end notified of channel starts and interrupts
    ///
    /// # Returns
    ///
    /// Hardware in its reset state, or the validation error of `config`
    pub fn with_peer(config: HwConfig, peer: Box<dyn DmaPeer>) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Hardware init: {} MiB main memory, inline IRQs {}",
            config.main_memory_size / (1024 * 1024),
            if config.inline_irqs { "on" } else { "off" }
        );
        Ok(Self {
            regs: RegisterFile::new(),
            dmac: Dmac::new(),
            memory: Memory::new(config.main_memory_size),
            ipu: Ipu::new(),
            intc: InterruptController::new(),
            completions: CompletionQueue::new(config.inline_irqs),
            peer,
            config,
        })
    }

    /// Reset every register and engine; memory contents are kept
    pub fn reset(&mut self) {
        self.regs.reset();
        self.dmac.reset();
        self.ipu.reset();
        self.intc = InterruptController::new();
        self.completions.clear();
        self.memory.clear_bus_error();
        log::info!("Hardware reset");
    }

    /// Configuration the hardware was built with
    pub fn config(&self) -> &HwConfig {
        &self.config
    }

    /// Raw register store
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// DMA controller state
    pub fn dmac(&self) -> &Dmac {
        &self.dmac
    }

    /// Register state of one channel
    ///
    /// # Arguments
    ///
    /// * `ch` - Channel to look up
    pub fn channel(&self, ch: ChannelId) -> &Channel {
        self.dmac.channel(ch)
    }

    /// DMA-visible memory
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable DMA-visible memory, used to preload guest data
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// IPU FIFOs and channel engines
    pub fn ipu(&self) -> &Ipu {
        &self.ipu
    }

    /// Mutable IPU, for the decoder side of the FIFOs
    pub fn ipu_mut(&mut self) -> &mut Ipu {
        &mut self.ipu
    }

    /// Interrupt controller
    pub fn intc(&self) -> &InterruptController {
        &self.intc
    }

    /// Mutable interrupt controller
    pub fn intc_mut(&mut self) -> &mut InterruptController {
        &mut self.intc
    }

    /// External back-end
    pub fn peer(&self) -> &dyn DmaPeer {
        self.peer.as_ref()
    }

    /// Mutable external back-end
    pub fn peer_mut(&mut self) -> &mut dyn DmaPeer {
        self.peer.as_mut()
    }

    /// Runtime status of a channel with a built-in engine
    pub fn runtime_status(&self, ch: ChannelId) -> Option<&ChannelRuntimeStatus> {
        match ch {
            ChannelId::ToIpu => Some(self.ipu.to_ipu()),
            ChannelId::FromIpu => Some(self.ipu.from_ipu()),
            _ => None,
        }
    }

    // ========== DMA Controller ==========

    /// Write a channel's CHCR and act on the result
    pub fn write_control(&mut self, ch: ChannelId, value: u32) {
        match self.dmac.write_chcr(ch, value) {
            ChcrWrite::Start => self.start_channel(ch),
            ChcrWrite::Stopped => {
                if self.completions.cancel(ch) {
                    log::debug!("DMA {}: undelivered completion dropped", ch.name());
                }
            }
            ChcrWrite::Stored | ChcrWrite::Ignored | ChcrWrite::Deferred => {}
        }
    }

    /// Read a channel's CHCR
    pub fn read_control(&self, ch: ChannelId) -> u32 {
        self.dmac.read_chcr(ch)
    }

    /// Write D_ENABLEW, starting queued channels if the gate opens
    pub fn write_global_enable(&mut self, value: u32) {
        let drained = self.dmac.write_enable(value);
        self.start_queued(drained);
    }

    /// Write D_CTRL, starting queued channels if the gate opens
    pub fn write_dma_ctrl(&mut self, value: u32) {
        let drained = self.dmac.write_ctrl(value);
        self.start_queued(drained);
    }

    /// Whether channels may start and run
    pub fn is_gate_open(&self) -> bool {
        self.dmac.is_gate_open()
    }

    /// Read D_STAT, with BEIS taken from the bus error latch
    pub fn read_dma_stat(&self) -> u32 {
        self.dmac.read_stat(self.memory.bus_error())
    }

    /// Write D_STAT
    ///
    /// Low bits are write-1-to-clear and high bits toggle. Clearing BEIS
    /// also clears the bus error latch in memory.
    pub fn write_dma_stat(&mut self, value: u32) {
        if self.dmac.write_stat(value) {
            self.memory.clear_bus_error();
        }
    }

    /// Whether the DMAC interrupt line to the CPU is asserted
    pub fn dmac_irq_pending(&self) -> bool {
        self.dmac.irq_pending(self.memory.bus_error())
    }

    fn start_queued(&mut self, queued: ChannelMask) {
        for ch in queued.channels() {
            self.start_channel(ch);
        }
    }

    fn start_channel(&mut self, ch: ChannelId) {
        let channel = self.dmac.channel_mut(ch);
        if channel.qwc_pad != 0 {
            log::warn!(
                "DMA {}: QWC upper bits 0x{:04X} set at start, clearing QWC",
                ch.name(),
                channel.qwc_pad
            );
            channel.set_qwc_register(0);
        }

        log::debug!(
            "DMA {}: start chcr=0x{:08X} madr=0x{:08X} qwc={} tadr=0x{:08X}",
            ch.name(),
            channel.chcr.bits(),
            channel.madr,
            channel.qwc,
            channel.tadr
        );

        self.peer.channel_started(ch);
        (CHANNEL_OPS[ch.index()].start)(self);
    }

    // ========== Stepping ==========

    /// Run one step of a channel's engine
    ///
    /// Nothing moves while the DMA gate is closed.
    pub fn step_channel(&mut self, ch: ChannelId) -> StepOutcome {
        if !self.dmac.is_gate_open() {
            return StepOutcome::NoProgress;
        }
        let outcome = (CHANNEL_OPS[ch.index()].step)(self);
        if self.config.inline_irqs {
            self.advance(0);
        }
        outcome
    }

    /// Step every active channel once; true if any made progress
    pub fn step_active(&mut self) -> bool {
        let mut progressed = false;
        for ch in ChannelId::ALL {
            if self.dmac.channel(ch).is_active()
                && self.step_channel(ch) != StepOutcome::NoProgress
            {
                progressed = true;
            }
        }
        progressed
    }

    /// Request a completion for a channel driven by an external engine
    pub fn request_completion(&mut self, ch: ChannelId, delay: u32) {
        self.completions.dma_complete(ch, delay);
        if self.config.inline_irqs {
            self.advance(0);
        }
    }

    /// Whether a completion for `ch` is scheduled but not yet delivered
    pub fn completion_pending(&self, ch: ChannelId) -> bool {
        self.completions.is_pending(ch)
    }

    /// Advance emulated time, delivering every completion that falls due
    pub fn advance(&mut self, cycles: u32) {
        let due = self.completions.advance(cycles);
        for ch in due.channels() {
            self.deliver_completion(ch);
        }
    }

    fn deliver_completion(&mut self, ch: ChannelId) {
        self.dmac.channel_mut(ch).chcr.set_str(false);
        self.dmac.set_channel_interrupt(ch);
        log::debug!("DMA {}: completion interrupt", ch.name());
        self.peer.channel_interrupt(ch);

        if ch == ChannelId::FromIpu {
            self.release_stall();
        }
    }

    /// Let the stall-drain channel continue after fromIPU finished
    fn release_stall(&mut self) {
        if self.dmac.stall_source() != Dmac::STALL_SOURCE_FROM_IPU {
            return;
        }
        let drain = match (self.dmac.ctrl() >> 6) & 3 {
            1 => ChannelId::Vif1,
            2 => ChannelId::Gif,
            3 => ChannelId::Sif1,
            _ => return,
        };
        if self.dmac.channel(drain).is_active() {
            self.peer.stall_released(drain);
            self.step_channel(drain);
        }
    }
}

// ========== Channel Engines ==========

fn start_external(_hw: &mut Hardware) {}

fn step_external(_hw: &mut Hardware) -> StepOutcome {
    StepOutcome::NoProgress
}

fn start_to_ipu(hw: &mut Hardware) {
    hw.ipu.start_to_ipu(hw.dmac.channel(ChannelId::ToIpu));
    hw.step_channel(ChannelId::ToIpu);
}

fn step_to_ipu(hw: &mut Hardware) -> StepOutcome {
    let paths_idle = hw.peer.graphics_paths_idle();
    let Hardware {
        config,
        dmac,
        memory,
        ipu,
        completions,
        ..
    } = hw;

    let mut io = EngineIo {
        channel: dmac.channel_mut(ChannelId::ToIpu),
        memory,
        irq: completions,
        paths_idle,
        max_tags: config.max_tags_per_step,
        irq_cycles_per_qword: config.irq_cycles_per_qword,
    };
    ipu.step_to_ipu(&mut io)
}

fn start_from_ipu(hw: &mut Hardware) {
    hw.ipu.start_from_ipu(hw.dmac.channel(ChannelId::FromIpu));
    hw.step_channel(ChannelId::FromIpu);
}

fn step_from_ipu(hw: &mut Hardware) -> StepOutcome {
    let Hardware {
        config,
        dmac,
        memory,
        ipu,
        completions,
        ..
    } = hw;

    let mut io = EngineIo {
        channel: dmac.channel_mut(ChannelId::FromIpu),
        memory,
        irq: completions,
        paths_idle: true,
        max_tags: config.max_tags_per_step,
        irq_cycles_per_qword: config.irq_cycles_per_qword,
    };
    let outcome = ipu.step_from_ipu(&mut io);

    if matches!(outcome, StepOutcome::Complete(_))
        && dmac.stall_source() == Dmac::STALL_SOURCE_FROM_IPU
    {
        let madr = dmac.channel(ChannelId::FromIpu).madr;
        dmac.set_stadr(madr);
        log::trace!("D_STADR = 0x{:08X}", madr);
    }
    outcome
}
