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

//! Interrupt Controller (INTC)
//!
//! ## Registers
//!
//! - **INTC_STAT** (0x1000F000): pending interrupt sources
//!   - Writing 1 to a bit clears it
//!   - Writing 0 has no effect
//!
//! - **INTC_MASK** (0x1000F010): enabled interrupt sources
//!   - Writing 1 to a bit toggles it
//!   - Writing 0 has no effect
//!
//! ## Interrupt Sources (Bit Positions)
//!
//! ```text
//! Bit  | Source  | Description
//! -----|---------|----------------------------------
//! 0    | GS      | Graphics synthesizer
//! 1    | SBUS    | Sub-bus (IOP)
//! 2    | VBON    | VBlank start
//! 3    | VBOF    | VBlank end
//! 4    | VIF0    | VIF0
//! 5    | VIF1    | VIF1
//! 6    | VU0     | VU0
//! 7    | VU1     | VU1
//! 8    | IPU     | Image processing unit
//! 9-12 | TIM0-3  | Timers 0-3
//! 13   | SFIFO   | SIF FIFO
//! 14   | VU0WD   | VU0 watchdog
//! ```
//!
//! DMA completions do not go through the INTC; they are reported in
//! D_STAT and signalled on a separate CPU line.

/// Interrupt source bit flags
pub mod interrupts {
    pub const GS: u16 = 1 << 0;
    pub const SBUS: u16 = 1 << 1;
    pub const VBLANK_START: u16 = 1 << 2;
    pub const VBLANK_END: u16 = 1 << 3;
    pub const VIF0: u16 = 1 << 4;
    pub const VIF1: u16 = 1 << 5;
    pub const VU0: u16 = 1 << 6;
    pub const VU1: u16 = 1 << 7;
    pub const IPU: u16 = 1 << 8;
    pub const TIMER0: u16 = 1 << 9;
    pub const TIMER1: u16 = 1 << 10;
    pub const TIMER2: u16 = 1 << 11;
    pub const TIMER3: u16 = 1 << 12;
    pub const SFIFO: u16 = 1 << 13;
    pub const VU0_WATCHDOG: u16 = 1 << 14;

    /// Bits implemented in INTC_STAT and INTC_MASK
    pub const ALL: u16 = 0x7FFF;
}

/// Interrupt controller
///
/// # Example
///
/// ```
/// use eehw::core::interrupt::{InterruptController, interrupts};
///
/// let mut ic = InterruptController::new();
///
/// ic.request(interrupts::IPU);
/// assert!(!ic.is_pending(), "Masked at reset");
///
/// // Writing 1 toggles the mask bit
/// ic.write_mask(interrupts::IPU as u32);
/// assert!(ic.is_pending());
///
/// // Writing 1 acknowledges
/// ic.write_status(interrupts::IPU as u32);
/// assert!(!ic.is_pending());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    /// INTC_STAT
    status: u16,

    /// INTC_MASK
    mask: u16,
}

impl InterruptController {
    /// Create a controller with every source clear and masked
    pub fn new() -> Self {
        Self { status: 0, mask: 0 }
    }

    /// Raise interrupt source bit(s)
    pub fn request(&mut self, interrupt: u16) {
        self.status |= interrupt & interrupts::ALL;
        log::trace!(
            "INTC requested: 0x{:04X}, status=0x{:04X}",
            interrupt,
            self.status
        );
    }

    /// Whether any unmasked source is pending
    pub fn is_pending(&self) -> bool {
        (self.status & self.mask) != 0
    }

    /// Read INTC_STAT
    pub fn read_status(&self) -> u32 {
        self.status as u32
    }

    /// Write INTC_STAT: clear every bit written as 1
    pub fn write_status(&mut self, value: u32) {
        self.status &= !(value as u16);
        log::trace!("INTC acknowledged, status=0x{:04X}", self.status);
    }

    /// Read INTC_MASK
    pub fn read_mask(&self) -> u32 {
        self.mask as u32
    }

    /// Write INTC_MASK: toggle every bit written as 1
    pub fn write_mask(&mut self, value: u32) {
        self.mask ^= value as u16 & interrupts::ALL;
        log::debug!("INTC mask: 0x{:04X}", self.mask);
    }

    pub(crate) fn restore(&mut self, status: u16, mask: u16) {
        self.status = status & interrupts::ALL;
        self.mask = mask & interrupts::ALL;
    }
}
