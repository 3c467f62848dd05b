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

use super::execute_group::FrameGraphExecuteGroup;
use crate::backend::GraphicsBackend;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::queue::{ExecuteWorkRequest, Fence, HardwareQueueClass};
use std::ops::Range;
use std::sync::Arc;

/// Submits a run of consecutive groups on one queue as a single unit of work.
///
/// The handler reserves one fence value on its queue when it is created. Every
/// group it owns publishes that value, and it is signaled exactly once, either
/// by the submission or by [`abort`](Self::abort).
pub struct FrameGraphExecuteGroupHandler<B: GraphicsBackend> {
    device: Arc<Device<B>>,
    fence: Arc<Fence<B>>,
    queue_class: HardwareQueueClass,
    groups: Range<usize>,
    signal_fence_value: u64,
    signaled: bool,
}

impl<B: GraphicsBackend> FrameGraphExecuteGroupHandler<B> {
    /// Creates a handler for `groups` and reserves its signal value.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the queue is not running.
    pub fn init(
        device: Arc<Device<B>>,
        queue_class: HardwareQueueClass,
        groups: Range<usize>,
    ) -> RhiResult<Self> {
        let fence = device.command_queue(queue_class).fence()?;
        let signal_fence_value = fence.next_value();
        Ok(Self {
            device,
            fence,
            queue_class,
            groups,
            signal_fence_value,
            signaled: false,
        })
    }

    /// The queue the handler submits to.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// The indices of the handler's groups in the frame.
    pub fn groups(&self) -> Range<usize> {
        self.groups.clone()
    }

    /// The value the queue fence reaches once every group completed.
    pub fn signal_fence_value(&self) -> u64 {
        self.signal_fence_value
    }

    /// Checks if the reserved value was submitted or signaled.
    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    fn owned<'g>(
        &self,
        groups: &'g mut [FrameGraphExecuteGroup<B>],
    ) -> RhiResult<&'g mut [FrameGraphExecuteGroup<B>]> {
        let len = groups.len();
        groups.get_mut(self.groups.clone()).ok_or_else(|| {
            RhiError::invalid_operation(format!(
                "handler groups {:?} are out of range ({len} groups)",
                self.groups
            ))
        })
    }

    /// Submits the lists of every owned group in order, then the signal.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the handler already signaled or the queue stopped.
    pub fn submit(&mut self, groups: &mut [FrameGraphExecuteGroup<B>]) -> RhiResult<()> {
        if self.signaled {
            return Err(RhiError::invalid_operation(format!(
                "{} handler already signaled {}",
                self.queue_class, self.signal_fence_value
            )));
        }
        let command_lists: Vec<_> = self
            .owned(groups)?
            .iter_mut()
            .flat_map(FrameGraphExecuteGroup::take_command_lists)
            .collect();
        log::trace!(
            "Submitting {} command list(s) on the {} queue, signal {}",
            command_lists.len(),
            self.queue_class,
            self.signal_fence_value
        );
        self.signaled = true;
        let result = self
            .device
            .command_queue(self.queue_class)
            .execute_work(ExecuteWorkRequest {
                command_lists,
                signal_fence_value: self.signal_fence_value,
            });
        if result.is_err() {
            self.fence.signal_on_cpu(self.signal_fence_value);
        }
        result
    }

    /// Releases the owned groups' lists and signals the reserved value with no
    /// work, so that consumers waiting on it do not stall.
    pub fn abort(&mut self, groups: &mut [FrameGraphExecuteGroup<B>]) {
        if let Ok(owned) = self.owned(groups) {
            for group in owned {
                group.release_command_lists();
            }
        }
        if self.signaled {
            return;
        }
        self.signaled = true;
        let request = ExecuteWorkRequest {
            command_lists: Vec::new(),
            signal_fence_value: self.signal_fence_value,
        };
        if let Err(err) = self.device.command_queue(self.queue_class).execute_work(request) {
            log::warn!(
                "{} queue rejected the aborted signal {}, signaling on the CPU: {err}",
                self.queue_class,
                self.signal_fence_value
            );
            self.fence.signal_on_cpu(self.signal_fence_value);
        }
    }
}

impl<B: GraphicsBackend> Drop for FrameGraphExecuteGroupHandler<B> {
    fn drop(&mut self) {
        if !self.signaled {
            self.abort(&mut []);
        }
    }
}
