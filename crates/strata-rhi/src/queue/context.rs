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

use super::{CommandQueue, CommandQueueDescriptor, HardwareQueueClass, QueueFenceValues};
use crate::backend::GraphicsBackend;
use crate::config::RhiConfig;
use crate::error::RhiResult;
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FrameRing {
    slots: Vec<QueueFenceValues>,
    current: usize,
}

/// The queues of one device plus the ring of per-frame fence values.
///
/// Each slot of the ring remembers how far every queue had to progress for the
/// frame that last used it. [`CommandQueueContext::end`] blocks on the slot it is
/// about to reuse, so at most `frame_count` frames are in flight.
pub struct CommandQueueContext<B: GraphicsBackend> {
    queues: Vec<CommandQueue<B>>,
    frames: Mutex<FrameRing>,
}

impl<B: GraphicsBackend> CommandQueueContext<B> {
    /// Creates and starts one queue per hardware queue class.
    ///
    /// Queues that started before a failure are shut down when the partially
    /// built context is dropped.
    pub fn init(backend: &Arc<B>, device: &Arc<B::Device>, config: &RhiConfig) -> RhiResult<Self> {
        let queues: Vec<CommandQueue<B>> = HardwareQueueClass::ALL
            .into_iter()
            .map(|queue_class| {
                CommandQueue::new(CommandQueueDescriptor {
                    hardware_queue_class: queue_class,
                    command_list_capacity: config.command_lists_per_queue as usize,
                    command_list_acquire_timeout: Duration::from_millis(
                        config.command_list_acquire_timeout_ms,
                    ),
                    fence_wait_timeout: Duration::from_millis(config.fence_wait_timeout_ms),
                })
            })
            .collect();
        for queue in &queues {
            queue.init(backend, device)?;
        }

        let frame_count = config.frame_count.max(1) as usize;
        Ok(Self {
            queues,
            frames: Mutex::new(FrameRing {
                slots: vec![QueueFenceValues::NONE; frame_count],
                current: 0,
            }),
        })
    }

    /// The queue of a hardware queue class.
    pub fn queue(&self, queue_class: HardwareQueueClass) -> &CommandQueue<B> {
        &self.queues[queue_class.index()]
    }

    /// Iterates every queue in class order.
    pub fn queues(&self) -> impl Iterator<Item = &CommandQueue<B>> {
        self.queues.iter()
    }

    /// The size of the frame ring.
    pub fn frame_count(&self) -> usize {
        lock(&self.frames).slots.len()
    }

    /// The ring slot the current frame records into.
    pub fn current_frame_index(&self) -> usize {
        lock(&self.frames).current
    }

    /// Closes the current frame.
    ///
    /// Signals every queue, records the values in the current slot, advances to
    /// the next slot and waits until the GPU finished the frame that last used it.
    /// Command lists whose fences completed are then recycled.
    ///
    /// # Errors
    ///
    /// `NotReady` if the wait on the reused slot times out.
    pub fn end(&self) -> RhiResult<()> {
        let mut frames = lock(&self.frames);

        let mut signaled = QueueFenceValues::NONE;
        for queue in &self.queues {
            signaled.set(queue.hardware_queue_class(), queue.signal_fence()?);
        }
        let current = frames.current;
        frames.slots[current] = signaled;
        frames.current = (current + 1) % frames.slots.len();

        let reused = frames.slots[frames.current];
        log::trace!(
            "Frame slot {current} closed with {signaled:?}, waiting on slot {} {reused:?}",
            frames.current
        );
        for (queue_class, value) in reused.iter() {
            self.queue(queue_class).fence()?.wait_on_cpu(value)?;
        }
        drop(frames);

        for queue in &self.queues {
            queue.command_list_pool()?.reclaim();
        }
        Ok(())
    }

    /// Blocks until every queue drained its work.
    pub fn wait_for_idle(&self) -> RhiResult<()> {
        for queue in &self.queues {
            queue.wait_for_idle()?;
        }
        Ok(())
    }

    /// Stops every queue. Idempotent.
    pub fn shutdown(&self) {
        for queue in &self.queues {
            queue.shutdown();
        }
    }
}
