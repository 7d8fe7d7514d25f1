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

//! Scheduled DMA completion interrupts
//!
//! A channel engine that drains its last leg does not finish instantly;
//! it asks for a completion interrupt a number of cycles in the future.
//! Until that interrupt is delivered the channel stays busy and its step
//! function makes no progress.

use super::channel::ChannelId;
use super::ChannelMask;

/// Interrupt side of a DMA channel engine
pub trait DmaInterrupt {
    /// Request the completion interrupt for `ch` after `delay` cycles
    fn dma_complete(&mut self, ch: ChannelId, delay: u32);

    /// Whether a completion for `ch` has been requested but not delivered
    fn is_pending(&self, ch: ChannelId) -> bool;
}

/// Per-channel countdown to completion delivery
#[derive(Debug, Clone, Default)]
pub struct CompletionQueue {
    remaining: [Option<u32>; ChannelId::COUNT],
    inline: bool,
}

impl CompletionQueue {
    /// Create a queue; with `inline` set every completion is due at once
    pub fn new(inline: bool) -> Self {
        Self {
            remaining: [None; ChannelId::COUNT],
            inline,
        }
    }

    /// Drop a not-yet-delivered completion
    ///
    /// Returns true if one was pending.
    pub fn cancel(&mut self, ch: ChannelId) -> bool {
        self.remaining[ch.index()].take().is_some()
    }

    /// Count down by `cycles` and remove every completion that became due
    pub fn advance(&mut self, cycles: u32) -> ChannelMask {
        let mut due = ChannelMask::empty();
        for ch in ChannelId::ALL {
            let slot = &mut self.remaining[ch.index()];
            if let Some(left) = *slot {
                if left <= cycles {
                    *slot = None;
                    due |= ChannelMask::of(ch);
                } else {
                    *slot = Some(left - cycles);
                }
            }
        }
        due
    }

    /// Remaining delay for `ch`, if pending
    pub fn remaining(&self, ch: ChannelId) -> Option<u32> {
        self.remaining[ch.index()]
    }

    pub(crate) fn restore(&mut self, ch: ChannelId, remaining: Option<u32>) {
        self.remaining[ch.index()] = remaining;
    }

    /// Cancel every pending completion
    pub fn clear(&mut self) {
        self.remaining = [None; ChannelId::COUNT];
    }
}

impl DmaInterrupt for CompletionQueue {
    fn dma_complete(&mut self, ch: ChannelId, delay: u32) {
        let delay = if self.inline { 0 } else { delay };
        log::trace!("DMA {}: completion in {} cycles", ch.name(), delay);
        self.remaining[ch.index()] = Some(delay);
    }

    fn is_pending(&self, ch: ChannelId) -> bool {
        self.remaining[ch.index()].is_some()
    }
}
