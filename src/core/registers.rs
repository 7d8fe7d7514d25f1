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

//! Hardware register file
//!
//! The register window at 0x10000000-0x1000FFFF is sixteen 4KB pages:
//!
//! | Page | Range         | Device                           |
//! |------|---------------|----------------------------------|
//! | 0-1  | 0x0000-0x1FFF | Timers                           |
//! | 2    | 0x2000-0x2FFF | IPU                              |
//! | 3    | 0x3000-0x3FFF | GIF, VIF0, VIF1                  |
//! | 4-7  | 0x4000-0x7FFF | VIF0/VIF1/GIF/IPU FIFOs          |
//! | 8-D  | 0x8000-0xDFFF | DMA channels 0-9                 |
//! | E    | 0xE000-0xEFFF | DMA controller                   |
//! | F    | 0xF000-0xFFFF | INTC, SIO, DMA enable latch      |
//!
//! [`RegisterFile`] is the plain byte store behind every register that has
//! no side effects. Registers with behavior are handled by the page router
//! in [`crate::core::hardware`]; everything else is store-and-return.

/// Base physical address of the register window
pub const REGISTER_BASE: u32 = 0x1000_0000;

/// Size of the register window (64KB)
pub const REGISTER_SPACE_SIZE: usize = 0x1_0000;

/// Register offsets within the window
pub mod addr {
    // IPU
    pub const IPU_CMD: u32 = 0x2000;
    pub const IPU_CTRL: u32 = 0x2010;
    pub const IPU_BP: u32 = 0x2020;
    pub const IPU_TOP: u32 = 0x2030;

    // GIF
    pub const GIF_CTRL: u32 = 0x3000;
    pub const GIF_MODE: u32 = 0x3010;
    pub const GIF_STAT: u32 = 0x3020;

    // VIF
    pub const VIF0_STAT: u32 = 0x3800;
    pub const VIF1_STAT: u32 = 0x3C00;

    // FIFOs (128-bit)
    pub const VIF0_FIFO: u32 = 0x4000;
    pub const VIF1_FIFO: u32 = 0x5000;
    pub const GIF_FIFO: u32 = 0x6000;
    pub const IPU_OUT_FIFO: u32 = 0x7000;
    pub const IPU_IN_FIFO: u32 = 0x7010;

    // Per-channel register offsets
    pub const CHCR: u32 = 0x00;
    pub const MADR: u32 = 0x10;
    pub const QWC: u32 = 0x20;
    pub const TADR: u32 = 0x30;
    pub const ASR0: u32 = 0x40;
    pub const ASR1: u32 = 0x50;
    pub const SADR: u32 = 0x80;

    // DMA controller
    pub const D_CTRL: u32 = 0xE000;
    pub const D_STAT: u32 = 0xE010;
    pub const D_PCR: u32 = 0xE020;
    pub const D_SQWC: u32 = 0xE030;
    pub const D_RBSR: u32 = 0xE040;
    pub const D_RBOR: u32 = 0xE050;
    pub const D_STADR: u32 = 0xE060;

    // Interrupt controller
    pub const INTC_STAT: u32 = 0xF000;
    pub const INTC_MASK: u32 = 0xF010;

    // DMA enable latch and its write shadow
    pub const D_ENABLER: u32 = 0xF520;
    pub const D_ENABLEW: u32 = 0xF590;
}

/// Width of a register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Byte = 1,
    Half = 2,
    Word = 4,
    Double = 8,
    Quad = 16,
}

impl AccessWidth {
    /// Width from a byte count
    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(AccessWidth::Byte),
            2 => Some(AccessWidth::Half),
            4 => Some(AccessWidth::Word),
            8 => Some(AccessWidth::Double),
            16 => Some(AccessWidth::Quad),
            _ => None,
        }
    }

    /// Width in bytes
    #[inline(always)]
    pub fn bytes(self) -> u32 {
        self as u32
    }

    /// Mask covering the value bits of this width
    pub fn value_mask(self) -> u128 {
        match self {
            AccessWidth::Quad => u128::MAX,
            w => (1u128 << (w.bytes() * 8)) - 1,
        }
    }
}

/// Page number (0-15) of a register offset
#[inline(always)]
pub fn page_of(offset: u32) -> usize {
    ((offset >> 12) & 0xF) as usize
}

/// Raw byte store for the register window
///
/// Offsets are relative to [`REGISTER_BASE`] and must already be masked to
/// the 64KB window and aligned by the caller.
#[derive(Clone)]
pub struct RegisterFile {
    bytes: Vec<u8>,
}

impl RegisterFile {
    /// Create a zeroed register file
    pub fn new() -> Self {
        Self {
            bytes: vec![0; REGISTER_SPACE_SIZE],
        }
    }

    /// Clear every register
    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    /// Read the raw word at a window offset
    ///
    /// `offset` must be word aligned and inside the window; the router
    /// checks both before calling.
    #[inline(always)]
    pub fn read32(&self, offset: u32) -> u32 {
        let i = offset as usize;
        u32::from_le_bytes([
            self.bytes[i],
            self.bytes[i + 1],
            self.bytes[i + 2],
            self.bytes[i + 3],
        ])
    }

    /// Store a raw word at a window offset without side effects
    #[inline(always)]
    pub fn write32(&mut self, offset: u32, value: u32) {
        let i = offset as usize;
        self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Raw register bytes, for save states
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Restore raw register bytes
    ///
    /// Shorter input leaves the tail untouched; longer input is truncated.
    pub fn load_bytes(&mut self, data: &[u8]) {
        let len = data.len().min(self.bytes.len());
        self.bytes[..len].copy_from_slice(&data[..len]);
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
