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

use super::{Fence, HardwareQueueClass};
use crate::backend::GraphicsBackend;
use crate::command::CommandList;
use crate::error::{RhiError, RhiResult};
use crate::sync::lock;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

const RECLAIM_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct PoolState<B: GraphicsBackend> {
    free: Vec<CommandList<B>>,
    retired: VecDeque<(u64, Vec<CommandList<B>>)>,
    created: usize,
}

/// A bounded pool of command lists for one hardware queue.
///
/// Submitted lists are retired with the fence value of their submission and only
/// become reusable once the queue fence reaches it.
pub struct CommandListPool<B: GraphicsBackend> {
    backend: Arc<B>,
    device: Arc<B::Device>,
    queue_class: HardwareQueueClass,
    capacity: usize,
    acquire_timeout: Duration,
    fence: Arc<Fence<B>>,
    state: Mutex<PoolState<B>>,
    available: Condvar,
}

impl<B: GraphicsBackend> CommandListPool<B> {
    /// Creates an empty pool that will hold at most `capacity` lists.
    pub fn new(
        backend: Arc<B>,
        device: Arc<B::Device>,
        queue_class: HardwareQueueClass,
        capacity: usize,
        acquire_timeout: Duration,
        fence: Arc<Fence<B>>,
    ) -> Self {
        Self {
            backend,
            device,
            queue_class,
            capacity: capacity.max(1),
            acquire_timeout,
            fence,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                retired: VecDeque::new(),
                created: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Takes a command list, blocking while the pool is exhausted.
    ///
    /// A free list is reused first, then a new one is created while under
    /// capacity. Otherwise the call waits for a retired list's fence to complete.
    ///
    /// # Errors
    ///
    /// `NotReady` if no list became available within the acquire timeout.
    pub fn acquire(&self) -> RhiResult<CommandList<B>> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut state = lock(&self.state);
        loop {
            self.reclaim_locked(&mut state);
            if let Some(mut list) = state.free.pop() {
                list.reset();
                return Ok(list);
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                return match self
                    .backend
                    .create_command_list(&self.device, self.queue_class)
                {
                    Ok(native) => {
                        log::trace!("Created {} command list", self.queue_class);
                        Ok(CommandList::new(native, self.queue_class))
                    }
                    Err(err) => {
                        lock(&self.state).created -= 1;
                        Err(err)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                let msg = format!(
                    "no {} command list became available within {:?} ({} in flight)",
                    self.queue_class,
                    self.acquire_timeout,
                    state.created
                );
                log::error!("{msg}");
                return Err(RhiError::NotReady(msg));
            }
            // Fence progress is not signaled through the condvar, so poll.
            let wait = RECLAIM_POLL_INTERVAL.min(deadline - now);
            state = self
                .available
                .wait_timeout(state, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Returns a list that was never submitted.
    pub fn release(&self, mut list: CommandList<B>) {
        list.reset();
        lock(&self.state).free.push(list);
        self.available.notify_one();
    }

    /// Parks submitted lists until the queue fence reaches `fence_value`.
    pub fn retire(&self, fence_value: u64, lists: Vec<CommandList<B>>) {
        if lists.is_empty() {
            return;
        }
        lock(&self.state).retired.push_back((fence_value, lists));
    }

    /// Moves every retired list whose fence completed back to the free list.
    pub fn reclaim(&self) {
        let reclaimed = {
            let mut state = lock(&self.state);
            self.reclaim_locked(&mut state)
        };
        if reclaimed > 0 {
            self.available.notify_all();
        }
    }

    fn reclaim_locked(&self, state: &mut PoolState<B>) -> usize {
        let completed = self.fence.completed_value();
        let mut reclaimed = 0;
        while let Some((value, _)) = state.retired.front() {
            if *value > completed {
                break;
            }
            if let Some((_, lists)) = state.retired.pop_front() {
                reclaimed += lists.len();
                state.free.extend(lists);
            }
        }
        reclaimed
    }

    /// The queue class the pool's lists record for.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// The maximum number of lists the pool creates.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of lists created so far.
    pub fn created_count(&self) -> usize {
        lock(&self.state).created
    }

    /// The number of lists ready for reuse.
    pub fn free_count(&self) -> usize {
        lock(&self.state).free.len()
    }

    /// The number of lists waiting on their fence.
    pub fn retired_count(&self) -> usize {
        lock(&self.state)
            .retired
            .iter()
            .map(|(_, lists)| lists.len())
            .sum()
    }
}
