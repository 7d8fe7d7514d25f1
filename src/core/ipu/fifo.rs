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

//! IPU quadword FIFO

use std::collections::VecDeque;

/// Bounded quadword queue between a DMA channel and the IPU core
#[derive(Debug, Clone, Default)]
pub struct IpuFifo {
    data: VecDeque<u128>,
}

impl IpuFifo {
    /// FIFO depth in quadwords
    pub const CAPACITY: usize = 8;

    /// Create an empty FIFO
    pub fn new() -> Self {
        Self {
            data: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    /// Queue a quadword; returns false when full
    pub fn push(&mut self, qword: u128) -> bool {
        if self.data.len() >= Self::CAPACITY {
            return false;
        }
        self.data.push_back(qword);
        true
    }

    /// Dequeue the oldest quadword
    pub fn pop(&mut self) -> Option<u128> {
        self.data.pop_front()
    }

    /// Oldest quadword, left in place
    pub fn peek(&self) -> Option<u128> {
        self.data.front().copied()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Free slots
    #[inline(always)]
    pub fn free(&self) -> usize {
        Self::CAPACITY - self.data.len()
    }

    /// Drop every queued quadword
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Contents, oldest first
    pub fn to_vec(&self) -> Vec<u128> {
        self.data.iter().copied().collect()
    }

    /// Replace the contents; anything past the capacity is dropped
    pub fn restore(&mut self, qwords: &[u128]) {
        self.data.clear();
        self.data
            .extend(qwords.iter().copied().take(Self::CAPACITY));
    }
}
