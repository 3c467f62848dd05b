// Copyright 2025 eraflo
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

//! Placement of per-frame transient attachments into aliased heaps.
//!
//! Transient attachments only live between the first and last scope that use
//! them. Two attachments whose scope ranges do not overlap can share the same
//! heap bytes. Placement is greedy first-fit, largest allocation first.

use crate::config::{HeapAllocationStrategy, PlatformLimits};
use crate::error::{RhiError, RhiResult};
use crate::sync::lock;
use std::sync::Mutex;

const BUFFER_ALIGNMENT: u64 = 256;
const IMAGE_ALIGNMENT: u64 = 4096;

/// The heap a transient attachment is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientHeapKind {
    /// Buffers.
    Buffer,
    /// Images.
    Image,
}

impl TransientHeapKind {
    fn alignment(self) -> u64 {
        match self {
            TransientHeapKind::Buffer => BUFFER_ALIGNMENT,
            TransientHeapKind::Image => IMAGE_ALIGNMENT,
        }
    }
}

/// One transient allocation to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientAllocationRequest {
    /// The bytes needed.
    pub size_in_bytes: u64,
    /// Position of the first scope using the attachment.
    pub first_scope: usize,
    /// Position of the last scope using the attachment.
    pub last_scope: usize,
}

impl TransientAllocationRequest {
    fn overlaps(&self, other: &Self) -> bool {
        self.first_scope <= other.last_scope && other.first_scope <= self.last_scope
    }
}

/// The result of placing a batch of requests into one heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapPlacement {
    /// The heap offset of each request, in request order.
    pub offsets: Vec<u64>,
    /// The bytes the heap needs to hold every request.
    pub heap_size_in_bytes: u64,
    /// The bytes the heap reserves under the allocation strategy.
    pub reserved_in_bytes: u64,
}

/// Per-frame statistics of the transient heaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransientAttachmentStatistics {
    /// Bytes needed by the buffer heap this frame.
    pub buffer_heap_size_in_bytes: u64,
    /// Bytes needed by the image heap this frame.
    pub image_heap_size_in_bytes: u64,
    /// Bytes that would have been needed without aliasing.
    pub unaliased_size_in_bytes: u64,
    /// The number of transient allocations placed.
    pub allocation_count: usize,
}

/// The two heaps backing a frame's transient attachments.
pub struct TransientAttachmentPool {
    limits: PlatformLimits,
    statistics: Mutex<TransientAttachmentStatistics>,
}

impl TransientAttachmentPool {
    /// Creates a pool using the budgets and strategy of `limits`.
    pub fn new(limits: PlatformLimits) -> Self {
        Self {
            limits,
            statistics: Mutex::new(TransientAttachmentStatistics::default()),
        }
    }

    /// Resets the statistics for a new frame.
    pub fn begin_frame(&self) {
        *lock(&self.statistics) = TransientAttachmentStatistics::default();
    }

    /// The statistics accumulated since the last [`begin_frame`](Self::begin_frame).
    pub fn statistics(&self) -> TransientAttachmentStatistics {
        *lock(&self.statistics)
    }

    /// Places a batch of requests into a heap.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the heap exceeds its budget under the
    /// [`HeapAllocationStrategy::Fixed`] strategy.
    pub fn allocate(
        &self,
        kind: TransientHeapKind,
        requests: &[TransientAllocationRequest],
    ) -> RhiResult<HeapPlacement> {
        let alignment = kind.alignment();
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by(|&a, &b| {
            requests[b]
                .size_in_bytes
                .cmp(&requests[a].size_in_bytes)
                .then(a.cmp(&b))
        });

        let mut offsets = vec![0u64; requests.len()];
        let mut placed: Vec<usize> = Vec::with_capacity(requests.len());
        let mut heap_size = 0u64;
        for index in order {
            let request = &requests[index];
            let size = align_up(request.size_in_bytes.max(1), alignment);

            let mut conflicts: Vec<(u64, u64)> = placed
                .iter()
                .filter(|&&other| requests[other].overlaps(request))
                .map(|&other| {
                    let start = offsets[other];
                    (start, start + align_up(requests[other].size_in_bytes.max(1), alignment))
                })
                .collect();
            conflicts.sort_unstable();

            let mut candidate = 0u64;
            for (start, end) in conflicts {
                if candidate + size <= start {
                    break;
                }
                candidate = candidate.max(end);
            }
            offsets[index] = candidate;
            heap_size = heap_size.max(candidate + size);
            placed.push(index);
        }

        let budget = match kind {
            TransientHeapKind::Buffer => self.limits.transient_attachment_pool_budgets.buffer_budget_in_bytes,
            TransientHeapKind::Image => self.limits.transient_attachment_pool_budgets.image_budget_in_bytes,
        };
        let reserved = self.apply_strategy(kind, heap_size, budget)?;

        let mut statistics = lock(&self.statistics);
        match kind {
            TransientHeapKind::Buffer => statistics.buffer_heap_size_in_bytes = heap_size,
            TransientHeapKind::Image => statistics.image_heap_size_in_bytes = heap_size,
        }
        statistics.unaliased_size_in_bytes += requests
            .iter()
            .map(|request| align_up(request.size_in_bytes.max(1), alignment))
            .sum::<u64>();
        statistics.allocation_count += requests.len();

        Ok(HeapPlacement {
            offsets,
            heap_size_in_bytes: heap_size,
            reserved_in_bytes: reserved,
        })
    }

    fn apply_strategy(&self, kind: TransientHeapKind, heap_size: u64, budget: u64) -> RhiResult<u64> {
        match self.limits.heap_allocation_strategy {
            HeapAllocationStrategy::Fixed => {
                if budget > 0 && heap_size > budget {
                    return Err(RhiError::out_of_memory(format!(
                        "transient {kind:?} heap needs {heap_size} bytes, budget is {budget}"
                    )));
                }
                Ok(if budget > 0 { budget } else { heap_size })
            }
            HeapAllocationStrategy::Paging => {
                let page = self.limits.paging_parameters.page_size_in_bytes.max(1);
                let pages = heap_size
                    .div_ceil(page)
                    .max(self.limits.paging_parameters.initial_page_count as u64);
                Ok(pages * page)
            }
            HeapAllocationStrategy::MemoryHint => {
                if budget > 0 && heap_size > budget {
                    log::warn!(
                        "Transient {kind:?} heap needs {heap_size} bytes, over its {budget} byte hint"
                    );
                }
                Ok(heap_size)
            }
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransientAttachmentPoolBudgets;
    use crate::error::ResultCode;

    fn request(size: u64, first: usize, last: usize) -> TransientAllocationRequest {
        TransientAllocationRequest {
            size_in_bytes: size,
            first_scope: first,
            last_scope: last,
        }
    }

    fn pool(strategy: HeapAllocationStrategy, buffer_budget: u64) -> TransientAttachmentPool {
        TransientAttachmentPool::new(PlatformLimits {
            heap_allocation_strategy: strategy,
            transient_attachment_pool_budgets: TransientAttachmentPoolBudgets {
                buffer_budget_in_bytes: buffer_budget,
                image_budget_in_bytes: 0,
            },
            ..Default::default()
        })
    }

    #[test]
    fn disjoint_lifetimes_alias() {
        let pool = pool(HeapAllocationStrategy::Fixed, 0);
        let placement = pool
            .allocate(
                TransientHeapKind::Buffer,
                &[request(1024, 0, 1), request(512, 2, 3)],
            )
            .unwrap();
        assert_eq!(placement.offsets, vec![0, 0]);
        assert_eq!(placement.heap_size_in_bytes, 1024);

        let statistics = pool.statistics();
        assert_eq!(statistics.allocation_count, 2);
        assert_eq!(statistics.unaliased_size_in_bytes, 1536);
    }

    #[test]
    fn overlapping_lifetimes_do_not_alias() {
        let pool = pool(HeapAllocationStrategy::Fixed, 0);
        let placement = pool
            .allocate(
                TransientHeapKind::Buffer,
                &[request(256, 0, 2), request(1024, 1, 3), request(256, 3, 4)],
            )
            .unwrap();
        // Largest first: 1024 at 0, then 256 [0,2] overlaps it, then 256 [3,4] too.
        assert_eq!(placement.offsets, vec![1024, 0, 1024]);
        assert_eq!(placement.heap_size_in_bytes, 1280);
    }

    #[test]
    fn first_fit_uses_gaps() {
        let pool = pool(HeapAllocationStrategy::Fixed, 0);
        let placement = pool
            .allocate(
                TransientHeapKind::Buffer,
                &[
                    request(1024, 0, 0),
                    request(512, 1, 2),
                    request(512, 0, 2),
                    request(256, 1, 1),
                ],
            )
            .unwrap();
        // 1024@0 [0]; 512 [1,2] fits at 0; 512 [0,2] goes after 1024; 256 [1]
        // conflicts with both 512s and lands on 512.
        assert_eq!(placement.offsets, vec![0, 0, 1024, 512]);
        assert_eq!(placement.heap_size_in_bytes, 1536);
    }

    #[test]
    fn fixed_strategy_enforces_the_budget() {
        let pool = pool(HeapAllocationStrategy::Fixed, 1024);
        let err = pool
            .allocate(
                TransientHeapKind::Buffer,
                &[request(1024, 0, 1), request(1024, 1, 2)],
            )
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::OutOfMemory);
    }

    #[test]
    fn paging_rounds_up_to_pages() {
        let pool = pool(HeapAllocationStrategy::Paging, 1024);
        let page = PlatformLimits::default().paging_parameters.page_size_in_bytes;
        let placement = pool
            .allocate(TransientHeapKind::Buffer, &[request(page + 1, 0, 0)])
            .unwrap();
        assert_eq!(placement.reserved_in_bytes, 2 * page);
    }

    #[test]
    fn memory_hint_only_warns() {
        let pool = pool(HeapAllocationStrategy::MemoryHint, 256);
        let placement = pool
            .allocate(TransientHeapKind::Buffer, &[request(4096, 0, 0)])
            .unwrap();
        assert_eq!(placement.heap_size_in_bytes, 4096);
    }
}
