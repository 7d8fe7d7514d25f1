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

//! DMA address region identification
//!
//! DMA channels see a different address map than the CPU. Ranges are
//! checked in priority order:
//!
//! | Priority | Condition                         | Backing           |
//! |----------|-----------------------------------|-------------------|
//! | 1        | bit 31 set                        | Scratchpad (16KB) |
//! | 2        | `addr & 0x1FFFFFF0` < main size   | Main memory       |
//! | 3        | `addr & 0x1FFFFFF0` < 0x10000000  | Zero-fill buffers |
//! | 4        | 0x70000000-0x70003FFF             | Scratchpad shadow |
//! | 5        | anything else                     | Bus error         |

/// Scratchpad select flag in a DMA address
pub const SCRATCHPAD_FLAG: u32 = 0x8000_0000;

/// Physical address mask applied before the main memory check
pub const PHYSICAL_MASK: u32 = 0x1FFF_FFF0;

/// Offset mask into the 16KB scratchpad
pub const SCRATCHPAD_MASK: u32 = 0x3FF0;

/// Upper bound of the zero-fill hole
pub const ZERO_FILL_END: u32 = 0x1000_0000;

/// Scratchpad shadow range used by code that omits the flag bit
pub const SCRATCHPAD_SHADOW_START: u32 = 0x7000_0000;
pub const SCRATCHPAD_SHADOW_END: u32 = 0x7000_4000;

/// Region a DMA address resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaRegion {
    /// Byte offset into main memory
    Main(usize),
    /// Byte offset into scratchpad
    Scratchpad(usize),
    /// Unbacked physical memory; reads as zero, writes discarded
    ZeroFill,
    /// No backing store; raises a bus error
    Unmapped,
}

impl DmaRegion {
    /// Identify the region for a DMA address
    ///
    /// The low 4 bits of the address are ignored; every DMA access is
    /// quadword aligned.
    ///
    /// # Example
    ///
    /// ```
    /// use eehw::core::memory::DmaRegion;
    ///
    /// let main_size = 32 * 1024 * 1024;
    /// assert_eq!(DmaRegion::identify(0x0000_1000, main_size), DmaRegion::Main(0x1000));
    /// assert_eq!(DmaRegion::identify(0x8000_0020, main_size), DmaRegion::Scratchpad(0x20));
    /// assert_eq!(DmaRegion::identify(0x0800_0000, main_size), DmaRegion::ZeroFill);
    /// assert_eq!(DmaRegion::identify(0x1200_0000, main_size), DmaRegion::Unmapped);
    /// ```
    pub fn identify(addr: u32, main_size: usize) -> Self {
        if addr & SCRATCHPAD_FLAG != 0 {
            return DmaRegion::Scratchpad((addr & SCRATCHPAD_MASK) as usize);
        }

        let phys = addr & PHYSICAL_MASK;
        if (phys as usize) < main_size {
            DmaRegion::Main(phys as usize)
        } else if phys < ZERO_FILL_END {
            DmaRegion::ZeroFill
        } else if (SCRATCHPAD_SHADOW_START..SCRATCHPAD_SHADOW_END).contains(&addr) {
            DmaRegion::Scratchpad((addr & SCRATCHPAD_MASK) as usize)
        } else {
            DmaRegion::Unmapped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: usize = 32 * 1024 * 1024;

    #[test]
    fn test_scratchpad_flag_wins_over_everything() {
        // Would be a bus error without the flag
        assert_eq!(
            DmaRegion::identify(0x9200_3FF0, MAIN),
            DmaRegion::Scratchpad(0x3FF0)
        );
        assert_eq!(
            DmaRegion::identify(0x8000_4010, MAIN),
            DmaRegion::Scratchpad(0x10),
            "Scratchpad offset wraps at 16KB"
        );
    }

    #[test]
    fn test_low_bits_ignored() {
        assert_eq!(DmaRegion::identify(0x0000_100F, MAIN), DmaRegion::Main(0x1000));
    }

    #[test]
    fn test_main_memory_boundary() {
        assert_eq!(
            DmaRegion::identify(0x01FF_FFF0, MAIN),
            DmaRegion::Main(0x01FF_FFF0)
        );
        assert_eq!(DmaRegion::identify(0x0200_0000, MAIN), DmaRegion::ZeroFill);
        assert_eq!(DmaRegion::identify(0x0FFF_FFF0, MAIN), DmaRegion::ZeroFill);
    }

    #[test]
    fn test_kseg_mirrors_reach_main_memory() {
        // 0xA0000000 has bit 31 set and therefore selects scratchpad;
        // 0x20000000 masks down to main memory.
        assert_eq!(DmaRegion::identify(0x2000_0100, MAIN), DmaRegion::Main(0x100));
    }

    #[test]
    fn test_scratchpad_shadow() {
        assert_eq!(
            DmaRegion::identify(0x7000_0000, MAIN),
            DmaRegion::Scratchpad(0)
        );
        assert_eq!(
            DmaRegion::identify(0x7000_3FF0, MAIN),
            DmaRegion::Scratchpad(0x3FF0)
        );
        assert_eq!(DmaRegion::identify(0x7000_4000, MAIN), DmaRegion::Unmapped);
    }

    #[test]
    fn test_register_space_is_unmapped() {
        assert_eq!(DmaRegion::identify(0x1000_8000, MAIN), DmaRegion::Unmapped);
        assert_eq!(DmaRegion::identify(0x1FC0_0000, MAIN), DmaRegion::Unmapped);
    }
}
