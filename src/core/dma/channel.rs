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

//! DMA channel registers
//!
//! Each channel owns a register block in pages 8-D:
//!
//! | Offset | Register | Description                          |
//! |--------|----------|--------------------------------------|
//! | +0x00  | CHCR     | Channel control                      |
//! | +0x10  | MADR     | Memory address                       |
//! | +0x20  | QWC      | Quadword count (bits 16-31 are pad)  |
//! | +0x30  | TADR     | Tag address                          |
//!
//! # CHCR layout
//!
//! ```text
//! bit  0     DIR  direction (0 = to memory, 1 = from memory)
//! bits 2-3   MOD  0 normal, 1 chain, 2 interleave, 3 reserved
//! bits 4-5   ASP  address stack pointer
//! bit  6     TTE  transfer tag enable
//! bit  7     TIE  tag interrupt enable
//! bit  8     STR  start / busy
//! bits 16-31 TAG  upper half of the last fetched tag
//! ```

use super::tag::TagId;
use serde::{Deserialize, Serialize};

/// DMA channel identifier, numbered in deferred-start priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Vif0 = 0,
    Vif1 = 1,
    Gif = 2,
    FromIpu = 3,
    ToIpu = 4,
    Sif0 = 5,
    Sif1 = 6,
    Sif2 = 7,
    FromSpr = 8,
    ToSpr = 9,
}

impl ChannelId {
    /// Number of DMA channels
    pub const COUNT: usize = 10;

    /// All channels in ascending number order
    pub const ALL: [ChannelId; ChannelId::COUNT] = [
        ChannelId::Vif0,
        ChannelId::Vif1,
        ChannelId::Gif,
        ChannelId::FromIpu,
        ChannelId::ToIpu,
        ChannelId::Sif0,
        ChannelId::Sif1,
        ChannelId::Sif2,
        ChannelId::FromSpr,
        ChannelId::ToSpr,
    ];

    /// Channel from its number
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Channel whose register block contains `offset`
    ///
    /// Blocks are 1KB wide; `offset` is relative to the register window.
    pub fn from_register(offset: u32) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|ch| ch.base() == offset & 0xFC00)
    }

    /// Channel number, 0-9
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Register block base offset
    pub fn base(self) -> u32 {
        match self {
            ChannelId::Vif0 => 0x8000,
            ChannelId::Vif1 => 0x9000,
            ChannelId::Gif => 0xA000,
            ChannelId::FromIpu => 0xB000,
            ChannelId::ToIpu => 0xB400,
            ChannelId::Sif0 => 0xC000,
            ChannelId::Sif1 => 0xC400,
            ChannelId::Sif2 => 0xC800,
            ChannelId::FromSpr => 0xD000,
            ChannelId::ToSpr => 0xD400,
        }
    }

    /// Short name used in log messages
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Vif0 => "VIF0",
            ChannelId::Vif1 => "VIF1",
            ChannelId::Gif => "GIF",
            ChannelId::FromIpu => "fromIPU",
            ChannelId::ToIpu => "toIPU",
            ChannelId::Sif0 => "SIF0",
            ChannelId::Sif1 => "SIF1",
            ChannelId::Sif2 => "SIF2",
            ChannelId::FromSpr => "fromSPR",
            ChannelId::ToSpr => "toSPR",
        }
    }
}

/// Transfer mode (CHCR.MOD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    #[default]
    Normal,
    Chain,
    Interleave,
}

/// Channel control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chcr(pub u32);

impl Chcr {
    const DIR: u32 = 1 << 0;
    const MOD_SHIFT: u32 = 2;
    const MOD_MASK: u32 = 3 << 2;
    const TTE: u32 = 1 << 6;
    const TIE: u32 = 1 << 7;
    const STR: u32 = 1 << 8;

    /// Reserved MOD encoding
    pub const MOD_RESERVED: u32 = 3;

    #[inline(always)]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// DIR: true when transferring from memory to the device
    #[inline(always)]
    pub fn from_memory(self) -> bool {
        self.0 & Self::DIR != 0
    }

    /// Raw MOD field
    #[inline(always)]
    pub fn mode_bits(self) -> u32 {
        (self.0 & Self::MOD_MASK) >> Self::MOD_SHIFT
    }

    /// Decoded transfer mode; the reserved encoding reads as chain
    pub fn mode(self) -> TransferMode {
        match self.mode_bits() {
            0 => TransferMode::Normal,
            2 => TransferMode::Interleave,
            _ => TransferMode::Chain,
        }
    }

    /// Set the raw MOD field
    pub fn set_mode_bits(&mut self, bits: u32) {
        self.0 = (self.0 & !Self::MOD_MASK) | ((bits & 3) << Self::MOD_SHIFT);
    }

    /// ASP: address stack pointer
    #[inline(always)]
    pub fn asp(self) -> u32 {
        (self.0 >> 4) & 3
    }

    /// TTE: transfer tag words to the peer
    #[inline(always)]
    pub fn tte(self) -> bool {
        self.0 & Self::TTE != 0
    }

    /// TIE: a tag with IRQ set ends the chain
    #[inline(always)]
    pub fn tie(self) -> bool {
        self.0 & Self::TIE != 0
    }

    /// STR: transfer active
    #[inline(always)]
    pub fn str(self) -> bool {
        self.0 & Self::STR != 0
    }

    /// Set or clear STR
    pub fn set_str(&mut self, active: bool) {
        if active {
            self.0 |= Self::STR;
        } else {
            self.0 &= !Self::STR;
        }
    }

    /// TAG: upper half of the last fetched tag
    #[inline(always)]
    pub fn tag(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Cache the upper half of a fetched tag in TAG
    pub fn set_tag(&mut self, upper: u16) {
        self.0 = (self.0 & 0xFFFF) | ((upper as u32) << 16);
    }

    /// Tag kind cached in TAG
    pub fn tag_id(self) -> TagId {
        TagId::from_bits(self.0 >> 28)
    }

    /// IRQ flag cached in TAG
    pub fn tag_irq(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// One DMA channel's register state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub chcr: Chcr,
    pub madr: u32,
    /// Remaining quadwords in the current leg
    pub qwc: u16,
    /// Upper 16 bits of the QWC register, kept for read-back only
    pub qwc_pad: u16,
    pub tadr: u32,
}

impl Channel {
    /// Create a channel with every register zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Full QWC register value including pad bits
    #[inline(always)]
    pub fn qwc_register(&self) -> u32 {
        ((self.qwc_pad as u32) << 16) | self.qwc as u32
    }

    /// Write the full QWC register
    ///
    /// The low 16 bits become the count; the rest is kept for read-back.
    pub fn set_qwc_register(&mut self, value: u32) {
        self.qwc = value as u16;
        self.qwc_pad = (value >> 16) as u16;
    }

    /// Whether the channel is transferring (CHCR.STR)
    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.chcr.str()
    }

    /// Read a channel register by block offset
    ///
    /// Returns None for offsets that are not one of the four core registers.
    pub fn read_register(&self, offset: u32) -> Option<u32> {
        use crate::core::registers::addr;
        match offset {
            addr::CHCR => Some(self.chcr.bits()),
            addr::MADR => Some(self.madr),
            addr::QWC => Some(self.qwc_register()),
            addr::TADR => Some(self.tadr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== ChannelId Tests ==========

    #[test]
    fn test_channel_lookup_by_register() {
        assert_eq!(ChannelId::from_register(0x8000), Some(ChannelId::Vif0));
        assert_eq!(ChannelId::from_register(0xB030), Some(ChannelId::FromIpu));
        assert_eq!(ChannelId::from_register(0xB410), Some(ChannelId::ToIpu));
        assert_eq!(ChannelId::from_register(0xC820), Some(ChannelId::Sif2));
        assert_eq!(ChannelId::from_register(0xD480), Some(ChannelId::ToSpr));
        assert_eq!(
            ChannelId::from_register(0x8400),
            None,
            "Gap between VIF0 and VIF1 blocks"
        );
    }

    #[test]
    fn test_channel_order() {
        for (i, ch) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
            assert_eq!(ChannelId::from_index(i), Some(*ch));
        }
        assert_eq!(ChannelId::from_index(10), None);
    }

    // ========== CHCR Tests ==========

    #[test]
    fn test_chcr_fields() {
        let chcr = Chcr(0x2000_0185);
        assert!(chcr.from_memory());
        assert_eq!(chcr.mode(), TransferMode::Chain);
        assert!(chcr.tie());
        assert!(!chcr.tte());
        assert!(chcr.str());
        assert_eq!(chcr.tag(), 0x2000);
        assert_eq!(chcr.tag_id(), TagId::Next);
        assert!(!chcr.tag_irq());
    }

    #[test]
    fn test_chcr_reserved_mode_reads_as_chain() {
        let chcr = Chcr(3 << 2);
        assert_eq!(chcr.mode_bits(), Chcr::MOD_RESERVED);
        assert_eq!(chcr.mode(), TransferMode::Chain);
    }

    #[test]
    fn test_chcr_setters_preserve_other_bits() {
        let mut chcr = Chcr(0xF000_01C5);
        chcr.set_str(false);
        assert_eq!(chcr.bits(), 0xF000_00C5);
        chcr.set_tag(0x1234);
        assert_eq!(chcr.bits(), 0x1234_00C5);
        chcr.set_mode_bits(0);
        assert_eq!(chcr.bits(), 0x1234_00C1);
    }

    // ========== Channel Tests ==========

    #[test]
    fn test_qwc_pad_roundtrip() {
        let mut ch = Channel::new();
        ch.set_qwc_register(0xABCD_0010);
        assert_eq!(ch.qwc, 0x10);
        assert_eq!(ch.qwc_pad, 0xABCD);
        assert_eq!(ch.read_register(0x20), Some(0xABCD_0010));
    }
}
