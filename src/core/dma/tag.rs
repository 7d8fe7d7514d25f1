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

//! DMA tag decoding
//!
//! A tag is a 128-bit descriptor in memory that drives one leg of a
//! chain-mode transfer. Only the low two words are meaningful:
//!
//! ```text
//! word 0: bits 0-15  QWC    quadwords in this leg
//!         bits 28-30 ID     tag kind
//!         bit  31    IRQ    raise interrupt after this leg (if CHCR.TIE)
//! word 1: bits 0-31  ADDR   data or next-tag address (low 4 bits ignored)
//! ```

use serde::{Deserialize, Serialize};

/// Tag kind (word 0 bits 28-30)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TagId {
    /// Data at ADDR, then end the chain
    #[default]
    Refe = 0,
    /// Data follows the tag, next tag follows the data
    Cnt = 1,
    /// Data follows the tag, next tag at ADDR
    Next = 2,
    /// Data at ADDR, next tag follows this one
    Ref = 3,
    /// Like REF, with stall control on source channels
    Refs = 4,
    /// Data follows the tag, push return address, next tag at ADDR
    Call = 5,
    /// Data follows the tag, pop next tag address
    Ret = 6,
    /// Data follows the tag, then end the chain
    End = 7,
}

impl TagId {
    /// Decode a 3-bit tag ID
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => TagId::Refe,
            1 => TagId::Cnt,
            2 => TagId::Next,
            3 => TagId::Ref,
            4 => TagId::Refs,
            5 => TagId::Call,
            6 => TagId::Ret,
            _ => TagId::End,
        }
    }

    /// Whether this tag is the last one in its chain
    #[inline(always)]
    pub fn ends_chain(self) -> bool {
        matches!(self, TagId::Refe | TagId::End)
    }
}

/// Decoded DMA tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTag {
    pub id: TagId,
    pub irq: bool,
    pub qwc: u16,
    pub addr: u32,
    /// Upper 16 bits of word 0, cached into CHCR.TAG on fetch
    pub upper: u16,
}

impl DmaTag {
    /// Decode a tag from its two meaningful words
    ///
    /// # Example
    ///
    /// ```
    /// use eehw::core::dma::{DmaTag, TagId};
    ///
    /// let tag = DmaTag::from_words(0x8000_0004 | (7 << 28), 0x0000_1238);
    /// assert_eq!(tag.id, TagId::End);
    /// assert!(tag.irq);
    /// assert_eq!(tag.qwc, 4);
    /// assert_eq!(tag.addr, 0x1230);
    /// ```
    pub fn from_words(word0: u32, word1: u32) -> Self {
        Self {
            id: TagId::from_bits(word0 >> 28),
            irq: word0 & 0x8000_0000 != 0,
            qwc: word0 as u16,
            addr: word1 & !0xF,
            upper: (word0 >> 16) as u16,
        }
    }

    /// Decode a tag from a full 128-bit quadword
    pub fn decode(qword: u128) -> Self {
        Self::from_words(qword as u32, (qword >> 32) as u32)
    }

    /// Build the 128-bit form of a tag
    pub fn encode(id: TagId, irq: bool, qwc: u16, addr: u32) -> u128 {
        let word0 = (qwc as u32) | ((id as u32) << 28) | if irq { 0x8000_0000 } else { 0 };
        (word0 as u128) | ((addr as u128) << 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_id_decodes() {
        let ids = [
            TagId::Refe,
            TagId::Cnt,
            TagId::Next,
            TagId::Ref,
            TagId::Refs,
            TagId::Call,
            TagId::Ret,
            TagId::End,
        ];
        for (bits, id) in ids.iter().enumerate() {
            assert_eq!(TagId::from_bits(bits as u32), *id);
        }
    }

    #[test]
    fn test_upper_words_ignored() {
        let qword = DmaTag::encode(TagId::Next, false, 3, 0x4000) | (u128::MAX << 64);
        let tag = DmaTag::decode(qword);
        assert_eq!(tag.id, TagId::Next);
        assert_eq!(tag.qwc, 3);
        assert_eq!(tag.addr, 0x4000);
    }

    #[test]
    fn test_reserved_bits_do_not_leak_into_qwc() {
        // Bits 16-27 are PCE/reserved and must not affect QWC or ID
        let tag = DmaTag::from_words(0x0FFF_0002, 0);
        assert_eq!(tag.qwc, 2);
        assert_eq!(tag.id, TagId::Refe);
        assert!(!tag.irq);
        assert_eq!(tag.upper, 0x0FFF);
    }

    #[test]
    fn test_ends_chain() {
        assert!(TagId::Refe.ends_chain());
        assert!(TagId::End.ends_chain());
        assert!(!TagId::Next.ends_chain());
        assert!(!TagId::Cnt.ends_chain());
    }
}
