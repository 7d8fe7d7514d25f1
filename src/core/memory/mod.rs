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

//! DMA-side memory and address translation
//!
//! [`Memory`] owns the buffers a DMA channel can reach: main memory, the
//! 16KB scratchpad, and the two quadword-sized zero buffers that stand in
//! for unbacked physical memory. [`Memory::translate`] maps a guest DMA
//! address onto one of them.
//!
//! # Example
//!
//! ```
//! use eehw::core::memory::Memory;
//!
//! let mut mem = Memory::new(32 * 1024 * 1024);
//!
//! assert!(mem.write_qword(0x1000, 0xDEAD_BEEF));
//! assert_eq!(mem.read_qword(0x1000), Some(0xDEAD_BEEF));
//!
//! // Unmapped addresses fail and latch the bus error flag
//! assert_eq!(mem.read_qword(0x1200_0000), None);
//! assert!(mem.bus_error());
//! ```

mod region;

pub use region::DmaRegion;

/// Scratchpad size (16KB)
pub const SCRATCHPAD_SIZE: usize = 16 * 1024;

/// Size of one quadword in bytes
pub const QWORD: usize = 16;

/// Memory reachable by DMA channels
pub struct Memory {
    /// Main memory
    main: Vec<u8>,

    /// On-chip scratchpad
    scratchpad: Vec<u8>,

    /// Zero source for reads from unbacked memory
    ///
    /// Re-zeroed before every hand-out
    zero_read: [u8; QWORD],

    /// Write sink for unbacked memory
    zero_write: [u8; QWORD],

    /// Sticky bus error flag (D_STAT.BEIS)
    bus_error: bool,
}

impl Memory {
    /// Create memory with `main_size` bytes of main memory
    ///
    /// The size is rounded down to a whole number of quadwords so every
    /// translated main memory slice holds at least one quadword.
    pub fn new(main_size: usize) -> Self {
        let main_size = main_size & !(QWORD - 1);
        Self {
            main: vec![0; main_size],
            scratchpad: vec![0; SCRATCHPAD_SIZE],
            zero_read: [0; QWORD],
            zero_write: [0; QWORD],
            bus_error: false,
        }
    }

    /// Main memory size in bytes
    pub fn main_size(&self) -> usize {
        self.main.len()
    }

    /// Translate a DMA address to host memory
    ///
    /// Returns the backing buffer starting at the (quadword aligned)
    /// address. `is_write` selects between the two zero buffers for the
    /// unbacked hole. An unmapped address logs an error, sets the bus
    /// error flag and returns `None`; callers must abort the transfer
    /// step without touching any register.
    pub fn translate(&mut self, addr: u32, is_write: bool) -> Option<&mut [u8]> {
        match DmaRegion::identify(addr, self.main.len()) {
            DmaRegion::Main(offset) => Some(&mut self.main[offset..]),
            DmaRegion::Scratchpad(offset) => Some(&mut self.scratchpad[offset..]),
            DmaRegion::ZeroFill if is_write => Some(&mut self.zero_write[..]),
            DmaRegion::ZeroFill => {
                self.zero_read = [0; QWORD];
                Some(&mut self.zero_read[..])
            }
            DmaRegion::Unmapped => {
                log::error!(
                    "DMA bus error: address 0x{:08X} ({})",
                    addr,
                    if is_write { "write" } else { "read" }
                );
                self.bus_error = true;
                None
            }
        }
    }

    /// Read one quadword through the translator
    pub fn read_qword(&mut self, addr: u32) -> Option<u128> {
        let host = self.translate(addr, false)?;
        let mut bytes = [0u8; QWORD];
        bytes.copy_from_slice(&host[..QWORD]);
        Some(u128::from_le_bytes(bytes))
    }

    /// Write one quadword through the translator
    ///
    /// Returns false on a bus error.
    pub fn write_qword(&mut self, addr: u32, value: u128) -> bool {
        match self.translate(addr, true) {
            Some(host) => {
                host[..QWORD].copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Copy a host image into memory starting at a DMA address
    ///
    /// Used to preload guest memory. Returns the number of bytes written,
    /// which stops short at the first unmapped quadword.
    pub fn load(&mut self, addr: u32, data: &[u8]) -> usize {
        let mut written = 0;
        for (i, chunk) in data.chunks(QWORD).enumerate() {
            let mut qword = [0u8; QWORD];
            qword[..chunk.len()].copy_from_slice(chunk);
            let target = addr.wrapping_add((i * QWORD) as u32);
            if !self.write_qword(target, u128::from_le_bytes(qword)) {
                break;
            }
            written += chunk.len();
        }
        written
    }

    /// Whether a DMA bus error has been latched
    #[inline(always)]
    pub fn bus_error(&self) -> bool {
        self.bus_error
    }

    /// Clear the bus error latch (write 1 to D_STAT.BEIS)
    pub fn clear_bus_error(&mut self) {
        self.bus_error = false;
    }

    pub(crate) fn set_bus_error(&mut self, value: bool) {
        self.bus_error = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAIN: usize = 32 * 1024 * 1024;

    // ========== Translation Tests ==========

    #[test]
    fn test_address_zero_maps_to_main_memory() {
        let mut mem = Memory::new(MAIN);
        mem.write_qword(0, 0x1122_3344);

        let host = mem.translate(0x0000_0000, false).expect("main memory");
        assert_eq!(host.len(), MAIN, "Slice should start at offset 0");
        assert_eq!(host[0], 0x44);
        assert!(!mem.bus_error());
    }

    #[test]
    fn test_hole_read_returns_zero_buffer() {
        let mut mem = Memory::new(MAIN);

        let host = mem.translate(0x0800_0000, false).expect("zero buffer");
        assert_eq!(host.len(), QWORD);
        assert!(host.iter().all(|&b| b == 0));
        assert!(!mem.bus_error(), "Zero-fill hole is not a bus error");
    }

    #[test]
    fn test_hole_writes_are_discarded() {
        let mut mem = Memory::new(MAIN);

        assert!(mem.write_qword(0x0800_0000, u128::MAX));
        assert_eq!(mem.read_qword(0x0800_0000), Some(0));
    }

    #[test]
    fn test_zero_read_buffer_is_rezeroed() {
        let mut mem = Memory::new(MAIN);

        let host = mem.translate(0x0800_0000, false).unwrap();
        host[3] = 0xFF;

        let host = mem.translate(0x0900_0000, false).unwrap();
        assert_eq!(host[3], 0, "Read buffer should be zeroed on every hand-out");
    }

    #[test]
    fn test_scratchpad_and_shadow_alias() {
        let mut mem = Memory::new(MAIN);

        mem.write_qword(0x8000_0040, 0xABCD);
        assert_eq!(mem.read_qword(0x7000_0040), Some(0xABCD));
    }

    #[test]
    fn test_bus_error_is_sticky() {
        let mut mem = Memory::new(MAIN);

        assert!(mem.translate(0x1000_0000, true).is_none());
        assert!(mem.bus_error());

        // A later good access does not clear it
        assert!(mem.translate(0x100, false).is_some());
        assert!(mem.bus_error());

        mem.clear_bus_error();
        assert!(!mem.bus_error());
    }

    #[test]
    fn test_smaller_main_memory_grows_the_hole() {
        let mut mem = Memory::new(4 * 1024 * 1024);
        assert_eq!(
            mem.translate(0x0040_0000, false).map(|h| h.len()),
            Some(QWORD),
            "Past 4MB should be zero-fill"
        );
    }

    #[test]
    fn test_unaligned_main_size_rounds_down() {
        let mut mem = Memory::new(0x10_0008);
        assert_eq!(mem.main_size(), 0x10_0000);

        assert_eq!(mem.read_qword(0x0F_FFF0), Some(0));
        assert!(mem.write_qword(0x10_0000, u128::MAX), "Past the end is zero-fill");
        assert_eq!(mem.read_qword(0x10_0000), Some(0));
        assert!(!mem.bus_error());
    }

    #[test]
    fn test_load_stops_at_unmapped() {
        let mut mem = Memory::new(MAIN);
        let data = [0xAAu8; 40];

        assert_eq!(mem.load(0x2000, &data), 40);
        assert_eq!(mem.read_qword(0x2020).unwrap() & 0xFF, 0xAA);
        assert_eq!(mem.load(0x1000_0000, &data), 0);
    }

    // ========== Property Tests ==========

    proptest! {
        #[test]
        fn prop_defined_ranges_translate(addr in any::<u32>()) {
            let mut mem = Memory::new(MAIN);
            let phys = addr & 0x1FFF_FFF0;
            let defined = addr & 0x8000_0000 != 0
                || phys < 0x1000_0000
                || (0x7000_0000..0x7000_4000).contains(&addr);

            let translated = mem.translate(addr, addr & 1 == 0).is_some();
            prop_assert_eq!(translated, defined);
            prop_assert_eq!(mem.bus_error(), !defined);
        }

        #[test]
        fn prop_translated_slice_holds_a_qword(addr in any::<u32>(), write in any::<bool>()) {
            let mut mem = Memory::new(MAIN);
            if let Some(host) = mem.translate(addr, write) {
                prop_assert!(host.len() >= QWORD);
            }
        }
    }
}
