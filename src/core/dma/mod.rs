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

//! DMA (Direct Memory Access) Controller
//!
//! This module implements the DMAC's register-level state machine: the ten
//! channel register blocks, the global control/status registers and the
//! deferred-start set. It never moves data itself. Writes return what the
//! caller must do next (start a channel, cancel a completion) so the owner
//! of the channel engines can act on it.
//!
//! # DMA Channels
//!
//! | Channel | Device   | Base Address |
//! |---------|----------|--------------|
//! | 0       | VIF0     | 0x10008000   |
//! | 1       | VIF1     | 0x10009000   |
//! | 2       | GIF      | 0x1000A000   |
//! | 3       | fromIPU  | 0x1000B000   |
//! | 4       | toIPU    | 0x1000B400   |
//! | 5       | SIF0     | 0x1000C000   |
//! | 6       | SIF1     | 0x1000C400   |
//! | 7       | SIF2     | 0x1000C800   |
//! | 8       | fromSPR  | 0x1000D000   |
//! | 9       | toSPR    | 0x1000D400   |
//!
//! # Global Registers
//!
//! - **D_CTRL** (0x1000E000): bit 0 DMAE master enable, bits 4-5 STS stall
//!   source, bits 6-7 STD stall drain
//! - **D_STAT** (0x1000E010): bits 0-9 channel interrupt status (write 1 to
//!   clear), bit 15 bus error, bits 16-25 channel interrupt mask (write 1
//!   to toggle)
//! - **D_ENABLER/D_ENABLEW** (0x1000F520/0x1000F590): bit 16 suspends every
//!   channel
//!
//! # Control Writes
//!
//! While a channel is busy only STR is writable: clearing it is a forced
//! stop, anything else is ignored. An idle channel takes the whole value.
//! A start requested while the gate (DMAE set, suspend clear) is closed is
//! parked in the deferred-start set and issued, in channel order, when the
//! gate opens.

mod channel;
mod completion;
mod tag;

pub use channel::{Channel, ChannelId, Chcr, TransferMode};
pub use completion::{CompletionQueue, DmaInterrupt};
pub use tag::{DmaTag, TagId};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of DMA channels, one bit per channel number
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ChannelMask: u16 {
        const VIF0 = 1 << 0;
        const VIF1 = 1 << 1;
        const GIF = 1 << 2;
        const FROM_IPU = 1 << 3;
        const TO_IPU = 1 << 4;
        const SIF0 = 1 << 5;
        const SIF1 = 1 << 6;
        const SIF2 = 1 << 7;
        const FROM_SPR = 1 << 8;
        const TO_SPR = 1 << 9;
    }
}

impl ChannelMask {
    /// Mask holding a single channel
    #[inline(always)]
    pub fn of(ch: ChannelId) -> Self {
        Self::from_bits_truncate(1 << ch.index())
    }

    /// Channels in the mask, lowest number first
    pub fn channels(self) -> impl Iterator<Item = ChannelId> {
        ChannelId::ALL
            .into_iter()
            .filter(move |ch| self.contains(Self::of(*ch)))
    }
}

/// Outcome of a CHCR write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChcrWrite {
    /// Idle channel took the new value without starting
    Stored,
    /// Write hit a busy channel and was dropped
    Ignored,
    /// Channel must be started now
    Start,
    /// Start parked until the gate opens
    Deferred,
    /// Busy channel was force-stopped
    Stopped,
}

/// DMA controller register state
///
/// # Examples
///
/// ```
/// use eehw::core::dma::{ChannelId, ChcrWrite, Dmac};
///
/// let mut dmac = Dmac::new();
/// dmac.write_ctrl(1);
///
/// // Chain mode, STR set
/// assert_eq!(dmac.write_chcr(ChannelId::ToIpu, 0x0000_0104), ChcrWrite::Start);
/// assert!(dmac.channel(ChannelId::ToIpu).is_active());
/// ```
pub struct Dmac {
    channels: [Channel; ChannelId::COUNT],

    /// D_CTRL
    ctrl: u32,

    /// D_STAT without the bus error bit, which lives in memory
    stat: u32,

    /// D_ENABLER (D_ENABLEW writes land here too)
    enable: u32,

    /// D_STADR
    stadr: u32,

    /// Channels whose start is waiting for the gate
    queued: ChannelMask,
}

impl Dmac {
    /// D_CTRL master enable
    pub const CTRL_DMAE: u32 = 1 << 0;

    /// D_STAT bus error
    pub const STAT_BEIS: u32 = 1 << 15;

    /// D_STAT status bits cleared by writing 1
    const STAT_CLEAR_MASK: u32 = 0x0000_FFFF;

    /// D_STAT mask bits toggled by writing 1
    const STAT_TOGGLE_MASK: u32 = 0xFFFF_0000;

    /// D_STAT maskable interrupt sources (CIS0-9, SIS, MEIS)
    const STAT_MASKABLE: u32 = 0x63FF;

    /// D_ENABLE suspend bit
    pub const ENABLE_CPND: u32 = 1 << 16;

    /// D_ENABLE power-on value
    const ENABLE_RESET: u32 = 0x1201;

    /// D_CTRL.STS value selecting the fromIPU channel
    pub const STALL_SOURCE_FROM_IPU: u32 = 3;

    /// Create a DMAC in its power-on state
    ///
    /// D_ENABLE reads back 0x1201 and every other register is zero.
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
            ctrl: 0,
            stat: 0,
            enable: Self::ENABLE_RESET,
            stadr: 0,
            queued: ChannelMask::empty(),
        }
    }

    /// Return every register to its power-on value
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Register state of one channel
    #[inline(always)]
    pub fn channel(&self, ch: ChannelId) -> &Channel {
        &self.channels[ch.index()]
    }

    /// Mutable register state of one channel
    #[inline(always)]
    pub fn channel_mut(&mut self, ch: ChannelId) -> &mut Channel {
        &mut self.channels[ch.index()]
    }

    /// Whether channels may run: DMAE set and not suspended
    #[inline(always)]
    pub fn is_gate_open(&self) -> bool {
        self.ctrl & Self::CTRL_DMAE != 0 && self.enable & Self::ENABLE_CPND == 0
    }

    /// Channels waiting for the gate to open
    pub fn queued(&self) -> ChannelMask {
        self.queued
    }

    /// Read a channel's CHCR
    pub fn read_chcr(&self, ch: ChannelId) -> u32 {
        self.channel(ch).chcr.bits()
    }

    /// Write a channel's CHCR
    ///
    /// The caller acts on the returned [`ChcrWrite`]: run the channel's
    /// start function for `Start`, cancel its pending completion for
    /// `Stopped`.
    pub fn write_chcr(&mut self, ch: ChannelId, value: u32) -> ChcrWrite {
        let incoming = Chcr(value);
        let gate_open = self.is_gate_open();
        let channel = &mut self.channels[ch.index()];

        if channel.chcr.str() {
            if incoming.str() {
                log::warn!(
                    "DMA {}: CHCR write 0x{:08X} while busy ignored",
                    ch.name(),
                    value
                );
                return ChcrWrite::Ignored;
            }

            channel.chcr.set_str(false);
            self.queued.remove(ChannelMask::of(ch));
            log::debug!(
                "DMA {}: forced stop (madr=0x{:08X}, qwc={}, tadr=0x{:08X})",
                ch.name(),
                channel.madr,
                channel.qwc,
                channel.tadr
            );
            return ChcrWrite::Stopped;
        }

        let mut chcr = incoming;
        if chcr.mode_bits() == Chcr::MOD_RESERVED {
            log::warn!("DMA {}: reserved transfer mode, using chain", ch.name());
            chcr.set_mode_bits(1);
        }
        // Keep the cached tag so a stopped chain can be resumed
        if chcr.mode() == TransferMode::Chain && chcr.tag() == 0 {
            chcr.set_tag(channel.chcr.tag());
        }
        channel.chcr = chcr;

        if !chcr.str() {
            return ChcrWrite::Stored;
        }

        if gate_open {
            ChcrWrite::Start
        } else {
            log::debug!("DMA {}: start deferred, gate closed", ch.name());
            self.queued.insert(ChannelMask::of(ch));
            ChcrWrite::Deferred
        }
    }

    /// Read D_CTRL
    #[inline(always)]
    pub fn ctrl(&self) -> u32 {
        self.ctrl
    }

    /// D_CTRL.STS
    pub fn stall_source(&self) -> u32 {
        (self.ctrl >> 4) & 3
    }

    /// Write D_CTRL
    ///
    /// Returns the channels to start if this write opened the gate.
    pub fn write_ctrl(&mut self, value: u32) -> ChannelMask {
        let was_open = self.is_gate_open();
        self.ctrl = value;
        log::debug!("D_CTRL = 0x{:08X}", value);
        self.drain_if_opened(was_open)
    }

    /// Read D_ENABLER
    #[inline(always)]
    pub fn enable(&self) -> u32 {
        self.enable
    }

    /// Write D_ENABLEW
    ///
    /// Returns the channels to start if this write opened the gate.
    pub fn write_enable(&mut self, value: u32) -> ChannelMask {
        let was_open = self.is_gate_open();
        self.enable = value;
        log::debug!("D_ENABLE = 0x{:08X}", value);
        self.drain_if_opened(was_open)
    }

    fn drain_if_opened(&mut self, was_open: bool) -> ChannelMask {
        if was_open || !self.is_gate_open() || self.queued.is_empty() {
            return ChannelMask::empty();
        }
        let drained = std::mem::take(&mut self.queued);
        log::debug!("DMA gate opened, starting queued {:?}", drained);
        drained
    }

    /// Read D_STAT, merging in the memory-side bus error latch
    pub fn read_stat(&self, bus_error: bool) -> u32 {
        if bus_error {
            self.stat | Self::STAT_BEIS
        } else {
            self.stat
        }
    }

    /// Write D_STAT
    ///
    /// Returns true when the write acknowledges the bus error, which the
    /// caller clears in memory.
    pub fn write_stat(&mut self, value: u32) -> bool {
        self.stat &= !(value & Self::STAT_CLEAR_MASK);
        self.stat ^= value & Self::STAT_TOGGLE_MASK;
        value & Self::STAT_BEIS != 0
    }

    /// Latch a channel's completion in D_STAT.CIS
    pub fn set_channel_interrupt(&mut self, ch: ChannelId) {
        self.stat |= 1 << ch.index();
    }

    /// Whether the DMAC is signalling the CPU
    pub fn irq_pending(&self, bus_error: bool) -> bool {
        let masked = self.stat & (self.stat >> 16) & Self::STAT_MASKABLE;
        masked != 0 || bus_error
    }

    /// D_STADR: stall address latched by the stall source channel
    #[inline(always)]
    pub fn stadr(&self) -> u32 {
        self.stadr
    }

    /// Write D_STADR
    pub fn set_stadr(&mut self, value: u32) {
        self.stadr = value;
    }

    /// Restore the global registers; BEIS lives in memory and is dropped
    pub(crate) fn restore_globals(&mut self, ctrl: u32, stat: u32, enable: u32, stadr: u32) {
        self.ctrl = ctrl;
        self.stat = stat & !Self::STAT_BEIS;
        self.enable = enable;
        self.stadr = stadr;
    }

    pub(crate) fn restore_queued(&mut self, queued: ChannelMask) {
        self.queued = queued;
    }
}

impl Default for Dmac {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_START: u32 = 0x0000_0104;
    const NORMAL_START: u32 = 0x0000_0100;

    fn enabled() -> Dmac {
        let mut dmac = Dmac::new();
        dmac.write_ctrl(Dmac::CTRL_DMAE);
        dmac
    }

    // ========== Initialization Tests ==========

    #[test]
    fn test_power_on_state() {
        let dmac = Dmac::new();
        assert_eq!(dmac.ctrl(), 0);
        assert_eq!(dmac.enable(), 0x1201);
        assert!(!dmac.is_gate_open(), "DMAE is clear at power on");
        for ch in ChannelId::ALL {
            assert!(!dmac.channel(ch).is_active());
        }
    }

    // ========== CHCR Write Tests ==========

    #[test]
    fn test_idle_write_stores_without_start() {
        let mut dmac = enabled();
        assert_eq!(dmac.write_chcr(ChannelId::Gif, 0x0000_0081), ChcrWrite::Stored);
        assert_eq!(dmac.read_chcr(ChannelId::Gif), 0x0000_0081);
    }

    #[test]
    fn test_start_with_gate_open() {
        let mut dmac = enabled();
        assert_eq!(dmac.write_chcr(ChannelId::ToIpu, CHAIN_START), ChcrWrite::Start);
        assert!(dmac.queued().is_empty());
    }

    #[test]
    fn test_write_while_busy_is_ignored() {
        let mut dmac = enabled();
        dmac.write_chcr(ChannelId::ToIpu, CHAIN_START);

        assert_eq!(
            dmac.write_chcr(ChannelId::ToIpu, 0xFFFF_01FF),
            ChcrWrite::Ignored
        );
        assert_eq!(
            dmac.read_chcr(ChannelId::ToIpu),
            CHAIN_START,
            "Busy channel keeps its control word"
        );
    }

    #[test]
    fn test_forced_stop_only_clears_str() {
        let mut dmac = enabled();
        dmac.write_chcr(ChannelId::ToIpu, 0x2000_0184);

        assert_eq!(
            dmac.write_chcr(ChannelId::ToIpu, 0x0000_0001),
            ChcrWrite::Stopped
        );
        assert_eq!(
            dmac.read_chcr(ChannelId::ToIpu),
            0x2000_0084,
            "Only STR changes on a forced stop"
        );
    }

    #[test]
    fn test_stop_on_idle_channel_is_noop() {
        let mut dmac = enabled();
        dmac.write_chcr(ChannelId::Vif1, 0x0000_0004);
        let before = dmac.read_chcr(ChannelId::Vif1);

        assert_eq!(dmac.write_chcr(ChannelId::Vif1, before), ChcrWrite::Stored);
        assert_eq!(dmac.read_chcr(ChannelId::Vif1), before);
        assert_eq!(dmac.read_stat(false), 0, "No interrupt status raised");
    }

    #[test]
    fn test_reserved_mode_coerced_to_chain() {
        let mut dmac = enabled();
        dmac.write_chcr(ChannelId::Gif, 0x0000_000C);
        assert_eq!(dmac.channel(ChannelId::Gif).chcr.mode_bits(), 1);
        assert_eq!(dmac.channel(ChannelId::Gif).chcr.mode(), TransferMode::Chain);
    }

    #[test]
    fn test_chain_write_keeps_cached_tag() {
        let mut dmac = enabled();
        dmac.channel_mut(ChannelId::ToIpu).chcr = Chcr(0x7000_0004);

        dmac.write_chcr(ChannelId::ToIpu, CHAIN_START);
        assert_eq!(dmac.channel(ChannelId::ToIpu).chcr.tag(), 0x7000);
    }

    #[test]
    fn test_normal_write_replaces_tag() {
        let mut dmac = enabled();
        dmac.channel_mut(ChannelId::ToIpu).chcr = Chcr(0x7000_0004);

        dmac.write_chcr(ChannelId::ToIpu, 0);
        assert_eq!(dmac.read_chcr(ChannelId::ToIpu), 0);
    }

    // ========== Deferred Start Tests ==========

    #[test]
    fn test_start_deferred_when_gate_closed() {
        let mut dmac = Dmac::new();
        assert_eq!(dmac.write_chcr(ChannelId::Sif0, NORMAL_START), ChcrWrite::Deferred);
        assert_eq!(dmac.queued(), ChannelMask::SIF0);
        assert!(dmac.channel(ChannelId::Sif0).is_active());
    }

    #[test]
    fn test_gate_open_drains_queue_in_order() {
        let mut dmac = Dmac::new();
        dmac.write_chcr(ChannelId::ToSpr, NORMAL_START);
        dmac.write_chcr(ChannelId::Vif0, NORMAL_START);
        dmac.write_chcr(ChannelId::ToIpu, CHAIN_START);

        let drained = dmac.write_ctrl(Dmac::CTRL_DMAE);
        let order: Vec<ChannelId> = drained.channels().collect();
        assert_eq!(
            order,
            vec![ChannelId::Vif0, ChannelId::ToIpu, ChannelId::ToSpr],
            "Queued channels start in ascending order"
        );
        assert!(dmac.queued().is_empty());
    }

    #[test]
    fn test_write_ctrl_while_open_does_not_drain() {
        let mut dmac = enabled();
        assert!(dmac.write_ctrl(Dmac::CTRL_DMAE).is_empty());
    }

    #[test]
    fn test_suspend_closes_gate() {
        let mut dmac = enabled();
        dmac.write_enable(Dmac::ENABLE_CPND);
        assert!(!dmac.is_gate_open());

        dmac.write_chcr(ChannelId::Gif, NORMAL_START);
        assert_eq!(dmac.queued(), ChannelMask::GIF);

        let drained = dmac.write_enable(0);
        assert_eq!(drained, ChannelMask::GIF);
    }

    #[test]
    fn test_forced_stop_clears_queued_bit() {
        let mut dmac = Dmac::new();
        dmac.write_chcr(ChannelId::Sif1, NORMAL_START);

        assert_eq!(dmac.write_chcr(ChannelId::Sif1, 0), ChcrWrite::Stopped);
        assert!(dmac.queued().is_empty());
        assert!(dmac.write_ctrl(Dmac::CTRL_DMAE).is_empty());
    }

    // ========== D_STAT Tests ==========

    #[test]
    fn test_stat_write_one_to_clear() {
        let mut dmac = Dmac::new();
        dmac.set_channel_interrupt(ChannelId::FromIpu);
        dmac.set_channel_interrupt(ChannelId::ToIpu);

        dmac.write_stat(1 << 3);
        assert_eq!(dmac.read_stat(false), 1 << 4);
    }

    #[test]
    fn test_stat_mask_toggles() {
        let mut dmac = Dmac::new();
        dmac.write_stat(1 << 20);
        assert_eq!(dmac.read_stat(false), 1 << 20);
        dmac.write_stat(1 << 20);
        assert_eq!(dmac.read_stat(false), 0);
    }

    #[test]
    fn test_irq_requires_mask() {
        let mut dmac = Dmac::new();
        dmac.set_channel_interrupt(ChannelId::ToIpu);
        assert!(!dmac.irq_pending(false), "Masked channel does not interrupt");

        dmac.write_stat(1 << (16 + 4));
        assert!(dmac.irq_pending(false));
    }

    #[test]
    fn test_bus_error_bit() {
        let mut dmac = Dmac::new();
        assert_eq!(dmac.read_stat(true), Dmac::STAT_BEIS);
        assert!(dmac.irq_pending(true), "Bus error is not maskable");
        assert!(dmac.write_stat(Dmac::STAT_BEIS));
        assert!(!dmac.write_stat(1));
    }

    #[test]
    fn test_channel_mask_iteration() {
        let mask = ChannelMask::of(ChannelId::ToSpr) | ChannelMask::of(ChannelId::Vif1);
        let list: Vec<_> = mask.channels().collect();
        assert_eq!(list, vec![ChannelId::Vif1, ChannelId::ToSpr]);
    }
}
