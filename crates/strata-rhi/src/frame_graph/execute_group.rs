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

//! Groups of scopes recorded together on one hardware queue.

use super::compile_context::FrameGraphCompileContext;
use super::database::FrameGraphAttachmentDatabase;
use super::execute_context::FrameGraphExecuteContext;
use super::graph::FrameGraph;
use super::scope::ScopeProducer;
use crate::backend::GraphicsBackend;
use crate::command::{CommandList, CommandListState};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::queue::{CommandListPool, HardwareQueueClass, QueueFenceValues};
use std::sync::Arc;

/// How a group maps scopes to command lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteGroupKind {
    /// Consecutive scopes recorded into a single command list.
    Merged {
        /// Graph indices of the scopes, in execution order.
        scopes: Vec<usize>,
    },
    /// One scope whose items are spread over several command lists.
    Split {
        /// Graph index of the scope.
        scope: usize,
        /// The number of command lists.
        command_list_count: u32,
    },
}

/// A command list being recorded.
///
/// Dropping the guard without handing it to
/// [`FrameGraphExecuteGroup::end_context`] closes the list and returns it to its
/// pool unsubmitted.
pub struct RecordingGuard<B: GraphicsBackend> {
    pool: Arc<CommandListPool<B>>,
    list: Option<CommandList<B>>,
}

impl<B: GraphicsBackend> RecordingGuard<B> {
    /// The list being recorded.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the recording already ended.
    pub fn command_list(&mut self) -> RhiResult<&mut CommandList<B>> {
        self.list
            .as_mut()
            .ok_or_else(|| RhiError::invalid_operation("command list recording already ended"))
    }
}

impl<B: GraphicsBackend> Drop for RecordingGuard<B> {
    fn drop(&mut self) {
        if let Some(mut list) = self.list.take() {
            if list.state() == CommandListState::Recording {
                if let Err(err) = list.end() {
                    log::warn!("Failed to close an abandoned command list: {err}");
                }
            }
            self.pool.release(list);
        }
    }
}

/// An ordered bundle of scopes assigned to one hardware queue.
///
/// A group lives for one frame. It waits on the fence values of the queues its
/// scopes depend on, and its handler signals one value once it completes.
pub struct FrameGraphExecuteGroup<B: GraphicsBackend> {
    device: Arc<Device<B>>,
    pool: Arc<CommandListPool<B>>,
    group_id: usize,
    queue_class: HardwareQueueClass,
    kind: ExecuteGroupKind,
    wait_fence_values: QueueFenceValues,
    signal_fence_value: u64,
    command_lists: Vec<CommandList<B>>,
}

impl<B: GraphicsBackend> FrameGraphExecuteGroup<B> {
    /// Creates an empty merged group on `queue_class`.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the device's queue of that class is not running.
    pub fn init_base(
        device: Arc<Device<B>>,
        group_id: usize,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<Self> {
        let pool = device.command_list_pool(queue_class)?;
        Ok(Self {
            device,
            pool,
            group_id,
            queue_class,
            kind: ExecuteGroupKind::Merged { scopes: Vec::new() },
            wait_fence_values: QueueFenceValues::NONE,
            signal_fence_value: 0,
            command_lists: Vec::new(),
        })
    }

    pub(crate) fn push_scope(&mut self, scope: usize) {
        if let ExecuteGroupKind::Merged { scopes } = &mut self.kind {
            scopes.push(scope);
        }
    }

    pub(crate) fn set_split(&mut self, scope: usize, command_list_count: u32) {
        self.kind = ExecuteGroupKind::Split {
            scope,
            command_list_count: command_list_count.max(1),
        };
    }

    pub(crate) fn set_wait_fence_values(&mut self, values: QueueFenceValues) {
        self.wait_fence_values = values;
    }

    pub(crate) fn set_signal_fence_value(&mut self, value: u64) {
        self.signal_fence_value = value;
    }

    /// The group's position in the frame.
    pub fn group_id(&self) -> usize {
        self.group_id
    }

    /// The queue the group submits to.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// How the group maps scopes to lists.
    pub fn kind(&self) -> &ExecuteGroupKind {
        &self.kind
    }

    /// Graph indices of the group's scopes.
    pub fn scopes(&self) -> &[usize] {
        match &self.kind {
            ExecuteGroupKind::Merged { scopes } => scopes,
            ExecuteGroupKind::Split { scope, .. } => std::slice::from_ref(scope),
        }
    }

    /// The number of command lists the group records.
    pub fn command_list_count(&self) -> u32 {
        match &self.kind {
            ExecuteGroupKind::Merged { .. } => 1,
            ExecuteGroupKind::Split {
                command_list_count, ..
            } => *command_list_count,
        }
    }

    /// Fence values of other queues to wait on before the group runs.
    pub fn wait_fence_values(&self) -> QueueFenceValues {
        self.wait_fence_values
    }

    /// The fence value the group's queue reaches once the group completed.
    pub fn signal_fence_value(&self) -> u64 {
        self.signal_fence_value
    }

    /// The lists recorded so far.
    pub fn recorded_command_lists(&self) -> &[CommandList<B>] {
        &self.command_lists
    }

    /// Takes a list from the queue's pool, blocking while it is exhausted.
    ///
    /// # Errors
    ///
    /// `NotReady` if no list became available within the acquire timeout.
    pub fn acquire_command_list(&self) -> RhiResult<CommandList<B>> {
        self.pool.acquire()
    }

    /// Encodes one GPU wait per queue the group depends on.
    pub fn encode_wait_events(&self, command_list: &mut CommandList<B>) -> RhiResult<()> {
        for (queue_class, value) in self.wait_fence_values.iter() {
            let fence = self.device.command_queue(queue_class).fence()?;
            command_list.encode_wait_event(&fence, value)?;
        }
        Ok(())
    }

    /// Acquires and opens the `index`-th list of the group. The first list
    /// carries the group's waits.
    pub fn begin_context(&self, index: u32) -> RhiResult<RecordingGuard<B>> {
        let mut guard = RecordingGuard {
            pool: self.pool.clone(),
            list: Some(self.acquire_command_list()?),
        };
        let label = format!("group {} ({}) list {index}", self.group_id, self.queue_class);
        let list = guard.command_list()?;
        list.begin(&label)?;
        if index == 0 {
            self.encode_wait_events(list)?;
        }
        Ok(guard)
    }

    /// Closes a list and keeps it for submission.
    pub fn end_context(&mut self, mut guard: RecordingGuard<B>) -> RhiResult<()> {
        guard.command_list()?.end()?;
        if let Some(list) = guard.list.take() {
            self.command_lists.push(list);
        }
        Ok(())
    }

    /// Records every scope of the group.
    ///
    /// `producers` is indexed like the scopes of `graph`. On error, lists already
    /// recorded stay in the group; the caller releases them.
    pub fn record(
        &mut self,
        graph: &FrameGraph,
        database: &FrameGraphAttachmentDatabase,
        producers: &[Arc<dyn ScopeProducer<B>>],
    ) -> RhiResult<()> {
        let producer = |index: usize| {
            producers.get(index).ok_or_else(|| {
                RhiError::invalid_operation(format!("scope {index} has no producer"))
            })
        };
        let scope = |index: usize| {
            graph
                .scope(index)
                .ok_or_else(|| RhiError::invalid_operation(format!("scope {index} is not in the graph")))
        };

        match self.kind.clone() {
            ExecuteGroupKind::Merged { scopes } => {
                let mut guard = self.begin_context(0)?;
                for index in scopes {
                    let scope = scope(index)?;
                    let list = guard.command_list()?;
                    list.begin_debug_marker(scope.id().as_str())?;
                    let mut context = FrameGraphExecuteContext::new(
                        list,
                        FrameGraphCompileContext::new(scope, database),
                        0,
                        1,
                        0..scope.estimated_item_count(),
                    );
                    producer(index)?.build_command_list(&mut context)?;
                    guard.command_list()?.end_debug_marker()?;
                }
                self.end_context(guard)
            }
            ExecuteGroupKind::Split {
                scope: index,
                command_list_count,
            } => {
                let scope = scope(index)?;
                let total = scope.estimated_item_count();
                let per_list = total.div_ceil(command_list_count).max(1);
                for list_index in 0..command_list_count {
                    let start = (list_index * per_list).min(total);
                    let end = (start + per_list).min(total);
                    let mut guard = self.begin_context(list_index)?;
                    let mut context = FrameGraphExecuteContext::new(
                        guard.command_list()?,
                        FrameGraphCompileContext::new(scope, database),
                        list_index,
                        command_list_count,
                        start..end,
                    );
                    producer(index)?.build_command_list(&mut context)?;
                    self.end_context(guard)?;
                }
                Ok(())
            }
        }
    }

    /// Returns every recorded list to the pool unsubmitted.
    pub fn release_command_lists(&mut self) {
        for list in self.command_lists.drain(..) {
            self.pool.release(list);
        }
    }

    /// Takes the recorded lists for submission.
    pub fn take_command_lists(&mut self) -> Vec<CommandList<B>> {
        std::mem::take(&mut self.command_lists)
    }
}

impl<B: GraphicsBackend> Drop for FrameGraphExecuteGroup<B> {
    fn drop(&mut self) {
        self.release_command_lists();
    }
}
