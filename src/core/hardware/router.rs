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

//! Register page router
//!
//! Guest accesses to `0x1000_0000..0x1001_0000` are split into sixteen 4KB
//! pages. Each page has a fixed read and write handler in [`BRIDGE`];
//! anything a handler does not claim falls through to the raw register
//! store, so unknown registers read back the last value written.
//!
//! Only 32-bit accesses reach the handlers. Narrower writes become a
//! read-modify-write of the containing word, 64-bit writes split into a
//! handled low word plus a raw high word, and 128-bit accesses are reserved
//! for the hardware FIFOs.

use super::{Hardware, PeerFifo};
use crate::core::dma::ChannelId;
use crate::core::error::{EmulatorError, Result};
use crate::core::registers::{addr, page_of, AccessWidth, REGISTER_BASE};

/// Page read handler; None falls back to the register store
type PageRead = fn(&Hardware, u32) -> Option<u32>;

/// Page write handler; false falls back to the register store
type PageWrite = fn(&mut Hardware, u32, u32) -> bool;

struct PageBridge {
    read: [PageRead; 16],
    write: [PageWrite; 16],
}

const BRIDGE: PageBridge = PageBridge {
    read: [
        read_default, // 0: timers
        read_default, // 1: timers
        read_ipu,
        read_default, // 3: GIF, VIF status
        read_default, // 4-7: FIFOs
        read_default,
        read_default,
        read_default,
        read_channel, // 8-D: DMA channels
        read_channel,
        read_channel,
        read_channel,
        read_channel,
        read_channel,
        read_dmac,
        read_intc,
    ],
    write: [
        write_default,
        write_default,
        write_ipu,
        write_gif,
        write_fifo_word,
        write_fifo_word,
        write_fifo_word,
        write_fifo_word,
        write_channel,
        write_channel,
        write_channel,
        write_channel,
        write_channel,
        write_channel,
        write_dmac,
        write_intc,
    ],
};

/// IPU_CTRL reset bit
const IPU_CTRL_RST: u32 = 1 << 30;

/// IPU_CTRL input/output FIFO counts
const IPU_CTRL_FIFO_COUNTS: u32 = 0xFF;

/// IPU_BP input FIFO count
const IPU_BP_FIFO_COUNT: u32 = 0xF00;

const GIF_CTRL_RST: u32 = 1 << 0;
const GIF_CTRL_PSE: u32 = 1 << 3;

/// GIF_MODE bits mirrored into GIF_STAT (M3R, IMT)
const GIF_MODE_MIRROR: u32 = 0x5;

/// Registers where a written 1 clears or toggles a bit
const WRITE_ONE_REGISTERS: [u32; 3] = [addr::INTC_STAT, addr::INTC_MASK, addr::D_STAT];

impl Hardware {
    /// Map a guest address to a register offset, checking width alignment
    fn register_offset(address: u32, width: AccessWidth) -> Result<u32> {
        if address & 0x1FFF_0000 != REGISTER_BASE {
            return Err(EmulatorError::OutsideRegisterSpace { address });
        }
        if address % width.bytes() != 0 {
            log::error!(
                "Unaligned {}-byte register access at 0x{:08X}",
                width.bytes(),
                address
            );
            return Err(EmulatorError::UnalignedAccess {
                address,
                size: width.bytes(),
            });
        }
        Ok(address & 0xFFFF)
    }

    fn access_width(address: u32, size: u32) -> Result<AccessWidth> {
        AccessWidth::from_bytes(size)
            .ok_or(EmulatorError::InvalidAccessWidth { address, size })
    }

    // ========== Word Path ==========

    /// 32-bit read through the page handlers, without tracing
    fn read_word(&self, offset: u32) -> u32 {
        (BRIDGE.read[page_of(offset)])(self, offset).unwrap_or_else(|| self.regs.read32(offset))
    }

    /// Returns true if a handler claimed the write
    fn write_word(&mut self, offset: u32, value: u32) -> bool {
        let handled = (BRIDGE.write[page_of(offset)])(self, offset, value);
        if !handled {
            self.regs.write32(offset, value);
        }
        handled
    }

    // ========== Public Access ==========

    /// Read `size` bytes (1, 2, 4, 8 or 16) from a register address
    pub fn read(&mut self, size: u32, address: u32) -> Result<u128> {
        match Self::access_width(address, size)? {
            AccessWidth::Byte => self.read8(address).map(u128::from),
            AccessWidth::Half => self.read16(address).map(u128::from),
            AccessWidth::Word => self.read32(address).map(u128::from),
            AccessWidth::Double => self.read64(address).map(u128::from),
            AccessWidth::Quad => self.read128(address),
        }
    }

    /// Write the low `size` bytes of `value` to a register address
    pub fn write(&mut self, size: u32, address: u32, value: u128) -> Result<()> {
        match Self::access_width(address, size)? {
            AccessWidth::Byte => self.write8(address, value as u8),
            AccessWidth::Half => self.write16(address, value as u16),
            AccessWidth::Word => self.write32(address, value as u32),
            AccessWidth::Double => self.write64(address, value as u64),
            AccessWidth::Quad => self.write128(address, value),
        }
    }

    /// 8-bit register read
    ///
    /// Narrow reads return the addressed bytes of the containing word.
    pub fn read8(&self, address: u32) -> Result<u8> {
        self.read_narrow(address, AccessWidth::Byte).map(|v| v as u8)
    }

    /// 16-bit register read
    pub fn read16(&self, address: u32) -> Result<u16> {
        self.read_narrow(address, AccessWidth::Half).map(|v| v as u16)
    }

    /// 32-bit register read
    ///
    /// # Arguments
    ///
    /// * `address` - Physical address inside the register window
    ///
    /// # Returns
    ///
    /// The register value, or an error for an unaligned or out-of-window address
    pub fn read32(&self, address: u32) -> Result<u32> {
        let offset = Self::register_offset(address, AccessWidth::Word)?;
        let value = self.read_word(offset);
        log::trace!("HW read32  [0x{:08X}] -> 0x{:08X}", address, value);
        Ok(value)
    }

    /// 64-bit register read, low word first
    pub fn read64(&self, address: u32) -> Result<u64> {
        let offset = Self::register_offset(address, AccessWidth::Double)?;
        let lo = self.read_word(offset) as u64;
        let hi = self.read_word(offset + 4) as u64;
        log::trace!("HW read64  [0x{:08X}] -> 0x{:016X}", address, (hi << 32) | lo);
        Ok((hi << 32) | lo)
    }

    /// 128-bit read; pops the IPU output FIFO or asks the peer for VIF/GIF
    pub fn read128(&mut self, address: u32) -> Result<u128> {
        let offset = Self::register_offset(address, AccessWidth::Quad)?;
        let value = match offset {
            addr::VIF0_FIFO => self.peer.read_fifo(PeerFifo::Vif0),
            addr::VIF1_FIFO => self.peer.read_fifo(PeerFifo::Vif1),
            addr::GIF_FIFO => self.peer.read_fifo(PeerFifo::Gif),
            addr::IPU_OUT_FIFO => self.ipu.out_fifo_mut().pop().unwrap_or_else(|| {
                log::warn!("IPU output FIFO read while empty");
                0
            }),
            _ => self.read64(address)? as u128,
        };
        log::trace!("HW read128 [0x{:08X}] -> 0x{:032X}", address, value);
        Ok(value)
    }

    /// 8-bit register write
    pub fn write8(&mut self, address: u32, value: u8) -> Result<()> {
        self.write_narrow(address, AccessWidth::Byte, value as u32)
    }

    /// 16-bit register write
    ///
    /// Subject to the busy-channel guard; see [`HwConfig::narrow_write_busy_guard`].
    ///
    /// [`HwConfig::narrow_write_busy_guard`]: crate::core::config::HwConfig::narrow_write_busy_guard
    pub fn write16(&mut self, address: u32, value: u16) -> Result<()> {
        self.write_narrow(address, AccessWidth::Half, value as u32)
    }

    /// 32-bit register write
    ///
    /// # Arguments
    ///
    /// * `address` - Physical address inside the register window
    /// * `value` - Value to store; side effects depend on the register
    ///
    /// # Errors
    ///
    /// Returns an error for an unaligned or out-of-window address.
    pub fn write32(&mut self, address: u32, value: u32) -> Result<()> {
        let offset = Self::register_offset(address, AccessWidth::Word)?;
        log::trace!("HW write32 [0x{:08X}] <- 0x{:08X}", address, value);
        self.write_word(offset, value);
        Ok(())
    }

    /// 64-bit write; only store-and-return registers keep the high word
    pub fn write64(&mut self, address: u32, value: u64) -> Result<()> {
        let offset = Self::register_offset(address, AccessWidth::Double)?;
        log::trace!("HW write64 [0x{:08X}] <- 0x{:016X}", address, value);
        if !self.write_word(offset, value as u32) {
            self.regs.write32(offset + 4, (value >> 32) as u32);
        }
        Ok(())
    }

    /// 128-bit write; FIFOs take the whole quadword, anything else the low half
    pub fn write128(&mut self, address: u32, value: u128) -> Result<()> {
        let offset = Self::register_offset(address, AccessWidth::Quad)?;
        log::trace!("HW write128 [0x{:08X}] <- 0x{:032X}", address, value);
        match offset {
            addr::VIF0_FIFO => self.peer.write_fifo(PeerFifo::Vif0, value),
            addr::VIF1_FIFO => self.peer.write_fifo(PeerFifo::Vif1, value),
            addr::GIF_FIFO => self.peer.write_fifo(PeerFifo::Gif, value),
            addr::IPU_IN_FIFO => {
                if !self.ipu.in_fifo_mut().push(value) {
                    log::warn!("IPU input FIFO full, 0x{:032X} dropped", value);
                }
            }
            addr::IPU_OUT_FIFO => {
                log::warn!("Write to IPU output FIFO ignored");
            }
            _ => return self.write64(address, value as u64),
        }
        Ok(())
    }

    // ========== Narrow Access ==========

    fn read_narrow(&self, address: u32, width: AccessWidth) -> Result<u32> {
        let offset = Self::register_offset(address, width)?;
        let shift = (offset & 3) * 8;
        let value = (self.read_word(offset & !3) >> shift) & width.value_mask() as u32;
        log::trace!(
            "HW read{:<3} [0x{:08X}] -> 0x{:X}",
            width.bytes() * 8,
            address,
            value
        );
        Ok(value)
    }

    fn write_narrow(&mut self, address: u32, width: AccessWidth, value: u32) -> Result<()> {
        let offset = Self::register_offset(address, width)?;
        let word = offset & !3;
        log::trace!(
            "HW write{:<2} [0x{:08X}] <- 0x{:X}",
            width.bytes() * 8,
            address,
            value
        );

        if self.config.narrow_write_busy_guard && word & 0x3F0 != addr::CHCR {
            if let Some(ch) = ChannelId::from_register(word) {
                if self.dmac.channel(ch).is_active() {
                    log::warn!(
                        "DMA {}: {}-bit write to 0x{:08X} while busy ignored",
                        ch.name(),
                        width.bytes() * 8,
                        address
                    );
                    return Ok(());
                }
            }
        }

        let shift = (offset & 3) * 8;
        let merged = if WRITE_ONE_REGISTERS.contains(&word) {
            value << shift
        } else {
            let lane = (width.value_mask() as u32) << shift;
            (self.read_word(word) & !lane) | (value << shift)
        };
        self.write_word(word, merged);
        Ok(())
    }
}

// ========== Page Handlers ==========

fn read_default(_hw: &Hardware, _offset: u32) -> Option<u32> {
    None
}

fn write_default(_hw: &mut Hardware, _offset: u32, _value: u32) -> bool {
    false
}

fn read_ipu(hw: &Hardware, offset: u32) -> Option<u32> {
    let in_count = hw.ipu.in_fifo().len() as u32;
    let out_count = hw.ipu.out_fifo().len() as u32;
    match offset {
        addr::IPU_CTRL => {
            let stored = hw.regs.read32(offset) & !IPU_CTRL_FIFO_COUNTS;
            Some(stored | in_count | (out_count << 4))
        }
        addr::IPU_BP => {
            let stored = hw.regs.read32(offset) & !IPU_BP_FIFO_COUNT;
            Some(stored | (in_count << 8))
        }
        _ => None,
    }
}

fn write_ipu(hw: &mut Hardware, offset: u32, value: u32) -> bool {
    match offset {
        addr::IPU_CMD => {
            hw.peer.ipu_command(value);
            false
        }
        addr::IPU_CTRL => {
            if value & IPU_CTRL_RST != 0 {
                hw.ipu.reset_fifos();
            }
            hw.regs
                .write32(offset, value & !(IPU_CTRL_RST | IPU_CTRL_FIFO_COUNTS));
            true
        }
        _ => false,
    }
}

fn write_gif(hw: &mut Hardware, offset: u32, value: u32) -> bool {
    match offset {
        addr::GIF_CTRL => {
            if value & GIF_CTRL_RST != 0 {
                hw.peer.gif_reset();
            }
            let pse = value & GIF_CTRL_PSE;
            hw.regs.write32(offset, pse);
            let stat = hw.regs.read32(addr::GIF_STAT) & !GIF_CTRL_PSE;
            hw.regs.write32(addr::GIF_STAT, stat | pse);
            true
        }
        addr::GIF_MODE => {
            let stat = hw.regs.read32(addr::GIF_STAT) & !GIF_MODE_MIRROR;
            hw.regs
                .write32(addr::GIF_STAT, stat | (value & GIF_MODE_MIRROR));
            false
        }
        addr::GIF_STAT => {
            log::warn!("GIF_STAT is read-only, write 0x{:08X} ignored", value);
            true
        }
        _ => false,
    }
}

/// Word writes to a FIFO port carry no quadword and are dropped
fn write_fifo_word(_hw: &mut Hardware, offset: u32, value: u32) -> bool {
    let port = offset & !0xF;
    let is_fifo = matches!(
        port,
        addr::VIF0_FIFO | addr::VIF1_FIFO | addr::GIF_FIFO | addr::IPU_OUT_FIFO | addr::IPU_IN_FIFO
    );
    if is_fifo {
        log::warn!(
            "Sub-quadword write 0x{:08X} to FIFO 0x{:04X} ignored",
            value,
            port
        );
    }
    is_fifo
}

fn read_channel(hw: &Hardware, offset: u32) -> Option<u32> {
    let ch = ChannelId::from_register(offset)?;
    hw.dmac.channel(ch).read_register(offset & 0x3FF)
}

fn write_channel(hw: &mut Hardware, offset: u32, value: u32) -> bool {
    let Some(ch) = ChannelId::from_register(offset) else {
        return false;
    };
    match offset & 0x3FF {
        addr::CHCR => hw.write_control(ch, value),
        addr::MADR => hw.dmac.channel_mut(ch).madr = value,
        addr::QWC => hw.dmac.channel_mut(ch).set_qwc_register(value),
        addr::TADR => hw.dmac.channel_mut(ch).tadr = value,
        _ => return false,
    }
    true
}

fn read_dmac(hw: &Hardware, offset: u32) -> Option<u32> {
    match offset {
        addr::D_CTRL => Some(hw.dmac.ctrl()),
        addr::D_STAT => Some(hw.read_dma_stat()),
        addr::D_STADR => Some(hw.dmac.stadr()),
        _ => None,
    }
}

fn write_dmac(hw: &mut Hardware, offset: u32, value: u32) -> bool {
    match offset {
        addr::D_CTRL => hw.write_dma_ctrl(value),
        addr::D_STAT => hw.write_dma_stat(value),
        addr::D_STADR => hw.dmac.set_stadr(value),
        _ => return false,
    }
    true
}

fn read_intc(hw: &Hardware, offset: u32) -> Option<u32> {
    match offset {
        addr::INTC_STAT => Some(hw.intc.read_status()),
        addr::INTC_MASK => Some(hw.intc.read_mask()),
        addr::D_ENABLER | addr::D_ENABLEW => Some(hw.dmac.enable()),
        _ => None,
    }
}

fn write_intc(hw: &mut Hardware, offset: u32, value: u32) -> bool {
    match offset {
        addr::INTC_STAT => hw.intc.write_status(value),
        addr::INTC_MASK => hw.intc.write_mask(value),
        addr::D_ENABLEW => hw.write_global_enable(value),
        addr::D_ENABLER => log::warn!("D_ENABLER is read-only, write 0x{:08X} ignored", value),
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::config::HwConfig;
    use crate::core::dma::{Dmac, TagId};
    use crate::core::interrupt::interrupts;

    const BASE: u32 = REGISTER_BASE;

    fn hw() -> Hardware {
        Hardware::new(HwConfig {
            main_memory_size: 4 * 1024 * 1024,
            ..HwConfig::default()
        })
        .unwrap()
    }

    // ========== Address Checking Tests ==========

    #[test]
    fn test_outside_register_space() {
        let mut hw = hw();
        assert!(matches!(
            hw.read32(0x1200_0000),
            Err(EmulatorError::OutsideRegisterSpace { address: 0x1200_0000 })
        ));
        assert!(matches!(
            hw.write32(0x0000_0000, 1),
            Err(EmulatorError::OutsideRegisterSpace { .. })
        ));
        // KSEG1 mirror
        assert!(hw.write32(0xB000_E000, 1).is_ok());
        assert!(hw.is_gate_open());
    }

    #[test]
    fn test_unaligned_access_rejected() {
        let mut hw = hw();
        assert!(matches!(
            hw.read32(BASE + 0x2002),
            Err(EmulatorError::UnalignedAccess { size: 4, .. })
        ));
        assert!(matches!(
            hw.write16(BASE + 0x2001, 0),
            Err(EmulatorError::UnalignedAccess { size: 2, .. })
        ));
        assert!(matches!(
            hw.write128(BASE + 0x7008, 0),
            Err(EmulatorError::UnalignedAccess { size: 16, .. })
        ));
    }

    #[test]
    fn test_invalid_width_rejected() {
        let mut hw = hw();
        assert!(matches!(
            hw.read(3, BASE),
            Err(EmulatorError::InvalidAccessWidth { size: 3, .. })
        ));
        assert!(matches!(
            hw.write(0, BASE, 0),
            Err(EmulatorError::InvalidAccessWidth { size: 0, .. })
        ));
    }

    // ========== Store-and-Return Tests ==========

    #[test]
    fn test_unknown_register_reads_back() {
        let mut hw = hw();
        hw.write32(BASE + 0x0010, 0x1234_5678).unwrap();
        assert_eq!(hw.read32(BASE + 0x0010).unwrap(), 0x1234_5678);
        assert_eq!(hw.read(4, BASE + 0x0010).unwrap(), 0x1234_5678);

        hw.write32(BASE + 0xE020, 0xDEAD_BEEF).unwrap(); // D_PCR
        assert_eq!(hw.read32(BASE + 0xE020).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_narrow_read_modify_write() {
        let mut hw = hw();
        hw.write32(BASE + 0x0100, 0x1122_3344).unwrap();
        hw.write8(BASE + 0x0102, 0xAA).unwrap();
        assert_eq!(hw.read32(BASE + 0x0100).unwrap(), 0x11AA_3344);

        hw.write16(BASE + 0x0100, 0xBEEF).unwrap();
        assert_eq!(hw.read32(BASE + 0x0100).unwrap(), 0x11AA_BEEF);
        assert_eq!(hw.read8(BASE + 0x0103).unwrap(), 0x11);
        assert_eq!(hw.read16(BASE + 0x0102).unwrap(), 0x11AA);
    }

    #[test]
    fn test_wide_store_keeps_high_word() {
        let mut hw = hw();
        hw.write64(BASE + 0x0200, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(hw.read64(BASE + 0x0200).unwrap(), 0x0102_0304_0506_0708);

        hw.write128(BASE + 0x0300, 0xFFFF_0000_1111_2222_3333_4444).unwrap();
        assert_eq!(
            hw.read128(BASE + 0x0300).unwrap(),
            0x1111_2222_3333_4444,
            "Upper half of a non-FIFO quadword is dropped"
        );
    }

    #[test]
    fn test_wide_write_to_handled_register_drops_high_word() {
        let mut hw = hw();
        hw.write64(BASE + 0xB410, 0xFFFF_FFFF_0000_1000).unwrap();
        assert_eq!(hw.channel(ChannelId::ToIpu).madr, 0x1000);
        assert_eq!(hw.read32(BASE + 0xB414).unwrap(), 0);
    }

    // ========== Channel Page Tests ==========

    #[test]
    fn test_channel_registers() {
        let mut hw = hw();
        hw.write32(BASE + 0x9010, 0x0040_0000).unwrap();
        hw.write32(BASE + 0x9020, 0x0000_0020).unwrap();
        hw.write32(BASE + 0x9030, 0x0000_8000).unwrap();
        hw.write32(BASE + 0x9040, 0x0000_0123).unwrap(); // ASR0

        let vif1 = hw.channel(ChannelId::Vif1);
        assert_eq!(vif1.madr, 0x0040_0000);
        assert_eq!(vif1.qwc, 0x20);
        assert_eq!(vif1.tadr, 0x8000);
        assert_eq!(hw.read32(BASE + 0x9040).unwrap(), 0x123);
        assert_eq!(hw.read32(BASE + 0x9020).unwrap(), 0x20);
    }

    #[test]
    fn test_chcr_byte_write_starts_once() {
        let mut rig = Rig::small();
        rig.hw.write32(BASE + 0xE000, 1).unwrap();
        rig.hw.write8(BASE + 0xC000, 0x01).unwrap(); // SIF0 DIR
        assert!(rig.starts().is_empty());

        rig.hw.write8(BASE + 0xC001, 0x01).unwrap(); // STR
        assert_eq!(rig.starts(), vec![ChannelId::Sif0]);
        assert_eq!(rig.hw.read32(BASE + 0xC000).unwrap(), 0x0000_0101);
    }

    #[test]
    fn test_narrow_write_to_busy_channel_ignored() {
        let mut hw = hw();
        hw.write32(BASE + 0xE000, 1).unwrap();
        hw.write32(BASE + 0xA000, 0x0000_0101).unwrap(); // GIF busy
        hw.write16(BASE + 0xA010, 0x4000).unwrap();
        assert_eq!(hw.channel(ChannelId::Gif).madr, 0);

        hw.write32(BASE + 0xA010, 0x4000).unwrap();
        assert_eq!(
            hw.channel(ChannelId::Gif).madr,
            0x4000,
            "Word writes are not guarded"
        );
    }

    #[test]
    fn test_narrow_write_guard_disabled() {
        let mut hw = Hardware::new(HwConfig {
            main_memory_size: 4 * 1024 * 1024,
            narrow_write_busy_guard: false,
            ..HwConfig::default()
        })
        .unwrap();
        hw.write32(BASE + 0xE000, 1).unwrap();
        hw.write32(BASE + 0xA000, 0x0000_0101).unwrap();
        hw.write16(BASE + 0xA010, 0x4000).unwrap();
        assert_eq!(hw.channel(ChannelId::Gif).madr, 0x4000);
    }

    #[test]
    fn test_reserved_mode_reads_back_as_chain() {
        let mut hw = hw();
        hw.write32(BASE + 0xD000, 0x0000_000C).unwrap();
        assert_eq!(hw.read32(BASE + 0xD000).unwrap() & 0xC, 0x4);
        assert_eq!(hw.channel(ChannelId::FromSpr).chcr.tag_id(), TagId::Refe);
    }

    // ========== DMAC Page Tests ==========

    #[test]
    fn test_d_stat_byte_write_zero_extends() {
        let mut hw = hw();
        hw.dmac.set_channel_interrupt(ChannelId::Vif0);
        hw.dmac.set_channel_interrupt(ChannelId::Sif0);
        assert_eq!(hw.read32(BASE + 0xE010).unwrap(), 0x21);

        // Clearing CIS0 must not clear CIS5 or touch the masks
        hw.write8(BASE + 0xE010, 0x01).unwrap();
        assert_eq!(hw.read32(BASE + 0xE010).unwrap(), 0x20);

        hw.write8(BASE + 0xE012, 0x20).unwrap();
        assert_eq!(hw.read32(BASE + 0xE010).unwrap(), 0x0020_0020);
        assert!(hw.dmac_irq_pending());
    }

    #[test]
    fn test_bus_error_visible_and_cleared() {
        let mut hw = hw();
        assert!(hw.memory_mut().translate(0x1800_0000, false).is_none());
        assert_eq!(hw.read32(BASE + 0xE010).unwrap(), Dmac::STAT_BEIS);
        assert!(hw.dmac_irq_pending());

        hw.write32(BASE + 0xE010, Dmac::STAT_BEIS).unwrap();
        assert_eq!(hw.read32(BASE + 0xE010).unwrap(), 0);
        assert!(!hw.memory().bus_error());
    }

    #[test]
    fn test_stall_address_register() {
        let mut hw = hw();
        hw.write32(BASE + 0xE060, 0x0012_3450).unwrap();
        assert_eq!(hw.dmac().stadr(), 0x0012_3450);
        assert_eq!(hw.read32(BASE + 0xE060).unwrap(), 0x0012_3450);
    }

    // ========== INTC / Enable Page Tests ==========

    #[test]
    fn test_intc_registers() {
        let mut hw = hw();
        hw.intc_mut().request(interrupts::IPU | interrupts::GS);
        assert_eq!(hw.read32(BASE + 0xF000).unwrap(), 0x101);

        hw.write8(BASE + 0xF001, 0x01).unwrap();
        assert_eq!(hw.read32(BASE + 0xF000).unwrap(), 0x001);

        hw.write32(BASE + 0xF010, 0x0001).unwrap();
        hw.write16(BASE + 0xF010, 0x0100).unwrap();
        assert_eq!(hw.read32(BASE + 0xF010).unwrap(), 0x101);
    }

    #[test]
    fn test_enable_latch_and_shadow() {
        let mut hw = hw();
        assert_eq!(hw.read32(BASE + 0xF520).unwrap(), 0x1201);

        hw.write32(BASE + 0xF590, 0x0001_1201).unwrap();
        assert_eq!(hw.read32(BASE + 0xF520).unwrap(), 0x0001_1201);
        assert_eq!(hw.read32(BASE + 0xF590).unwrap(), 0x0001_1201);

        hw.write32(BASE + 0xF520, 0).unwrap();
        assert_eq!(
            hw.read32(BASE + 0xF520).unwrap(),
            0x0001_1201,
            "D_ENABLER is read-only"
        );
    }

    // ========== IPU / GIF Page Tests ==========

    #[test]
    fn test_ipu_fifo_ports_and_counts() {
        let mut hw = hw();
        hw.write128(BASE + 0x7010, 0xAAAA).unwrap();
        hw.write128(BASE + 0x7010, 0xBBBB).unwrap();
        hw.ipu_mut().out_fifo_mut().push(0x1234);

        assert_eq!(hw.read32(BASE + 0x2010).unwrap() & 0xFF, 0x12);
        assert_eq!(hw.read32(BASE + 0x2020).unwrap() & 0xF00, 0x200);

        assert_eq!(hw.read128(BASE + 0x7000).unwrap(), 0x1234);
        assert_eq!(hw.read128(BASE + 0x7000).unwrap(), 0, "Empty FIFO reads 0");

        hw.write32(BASE + 0x2010, 1 << 30).unwrap();
        assert!(hw.ipu().in_fifo().is_empty());
        assert_eq!(hw.read32(BASE + 0x2010).unwrap(), 0, "RST is not stored");
    }

    #[test]
    fn test_ipu_in_fifo_overflow_dropped() {
        let mut hw = hw();
        for i in 0..9 {
            hw.write128(BASE + 0x7010, i).unwrap();
        }
        assert_eq!(hw.ipu().in_fifo().len(), 8);
    }

    #[test]
    fn test_fifo_word_write_dropped() {
        let mut hw = hw();
        hw.write32(BASE + 0x7010, 0x1111).unwrap();
        assert!(hw.ipu().in_fifo().is_empty());
        assert_eq!(hw.read32(BASE + 0x7010).unwrap(), 0);
    }

    #[test]
    fn test_peer_fifos_and_commands() {
        let mut rig = Rig::small();
        rig.hw.write128(BASE + 0x6000, 0x55).unwrap();
        rig.hw.write32(BASE + 0x2000, 0x7000_0000).unwrap();
        rig.hw.write32(BASE + 0x3000, 0x0000_0009).unwrap();
        assert_eq!(rig.hw.read128(BASE + 0x5000).unwrap(), 0x101);

        assert_eq!(
            *rig.events.borrow(),
            vec![
                PeerEvent::Fifo(PeerFifo::Gif, 0x55),
                PeerEvent::IpuCommand(0x7000_0000),
                PeerEvent::GifReset,
            ]
        );
        assert_eq!(rig.hw.read32(BASE + 0x2000).unwrap(), 0x7000_0000);
    }

    #[test]
    fn test_gif_status_mirrors() {
        let mut hw = hw();
        hw.write32(BASE + 0x3000, 0x0000_0008).unwrap();
        hw.write32(BASE + 0x3010, 0x0000_0005).unwrap();
        assert_eq!(hw.read32(BASE + 0x3020).unwrap(), 0x0D);

        hw.write32(BASE + 0x3020, 0).unwrap();
        assert_eq!(hw.read32(BASE + 0x3020).unwrap(), 0x0D, "GIF_STAT is read-only");

        hw.write32(BASE + 0x3000, 0).unwrap();
        assert_eq!(hw.read32(BASE + 0x3020).unwrap(), 0x05);
    }
}
