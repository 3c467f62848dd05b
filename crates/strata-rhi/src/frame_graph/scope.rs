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

//! Scopes, the nodes of the frame graph, and the producers that fill them.

use super::attachment::ScopeAttachment;
use super::compile_context::FrameGraphCompileContext;
use super::execute_context::FrameGraphExecuteContext;
use super::interface::FrameGraphInterface;
use super::{AttachmentId, ScopeId};
use crate::backend::GraphicsBackend;
use crate::error::RhiResult;
use crate::queue::HardwareQueueClass;

/// One unit of GPU work in the frame graph, recorded by a single producer.
#[derive(Debug, Clone)]
pub struct Scope {
    id: ScopeId,
    queue_class: HardwareQueueClass,
    attachments: Vec<ScopeAttachment>,
    execute_after: Vec<ScopeId>,
    execute_before: Vec<ScopeId>,
    estimated_item_count: u32,
    producers_by_queue: [Option<usize>; HardwareQueueClass::COUNT],
}

impl Scope {
    /// Creates an empty scope.
    pub fn new(id: ScopeId, queue_class: HardwareQueueClass) -> Self {
        Self {
            id,
            queue_class,
            attachments: Vec::new(),
            execute_after: Vec::new(),
            execute_before: Vec::new(),
            estimated_item_count: 0,
            producers_by_queue: [None; HardwareQueueClass::COUNT],
        }
    }

    /// The scope's id.
    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    /// The queue class the scope records for.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// Every attachment use, in declaration order.
    pub fn attachments(&self) -> &[ScopeAttachment] {
        &self.attachments
    }

    /// The uses of one attachment, in declaration order.
    pub fn attachment_uses<'a>(
        &'a self,
        id: &'a AttachmentId,
    ) -> impl Iterator<Item = &'a ScopeAttachment> + 'a {
        self.attachments
            .iter()
            .filter(move |attachment| attachment.attachment_id() == id)
    }

    /// Scopes this one must run after.
    pub fn execute_after(&self) -> &[ScopeId] {
        &self.execute_after
    }

    /// Scopes this one must run before.
    pub fn execute_before(&self) -> &[ScopeId] {
        &self.execute_before
    }

    /// The number of draw or dispatch items the producer expects to record.
    pub fn estimated_item_count(&self) -> u32 {
        self.estimated_item_count
    }

    /// The index in the graph of the latest scope on `queue_class` this scope
    /// depends on, if `queue_class` is not the scope's own queue.
    pub fn producer_on(&self, queue_class: HardwareQueueClass) -> Option<usize> {
        self.producers_by_queue[queue_class.index()]
    }

    /// Checks if any scope on another queue must complete before this one.
    pub fn has_cross_queue_producer(&self) -> bool {
        self.producers_by_queue.iter().any(Option::is_some)
    }

    pub(crate) fn attachments_mut(&mut self) -> &mut [ScopeAttachment] {
        &mut self.attachments
    }

    pub(crate) fn push_attachment(&mut self, attachment: ScopeAttachment) {
        self.attachments.push(attachment);
    }

    pub(crate) fn push_execute_after(&mut self, id: ScopeId) {
        if !self.execute_after.contains(&id) {
            self.execute_after.push(id);
        }
    }

    pub(crate) fn push_execute_before(&mut self, id: ScopeId) {
        if !self.execute_before.contains(&id) {
            self.execute_before.push(id);
        }
    }

    pub(crate) fn set_estimated_item_count(&mut self, count: u32) {
        self.estimated_item_count = count;
    }

    pub(crate) fn set_producers(&mut self, producers: [Option<usize>; HardwareQueueClass::COUNT]) {
        self.producers_by_queue = producers;
    }
}

/// Fills one scope of the frame graph each frame.
///
/// The scheduler calls the methods in order: dependencies while the graph is
/// built, resources once it compiled, then recording, possibly from a worker
/// thread and possibly once per command list when the scope is split.
pub trait ScopeProducer<B: GraphicsBackend>: Send + Sync {
    /// The id of the scope the producer fills.
    fn scope_id(&self) -> &ScopeId;

    /// The queue the scope records for.
    fn hardware_queue_class(&self) -> HardwareQueueClass {
        HardwareQueueClass::Graphics
    }

    /// Declares attachment uses and ordering constraints.
    fn setup_frame_graph_dependencies(&self, interface: &mut FrameGraphInterface<'_>) -> RhiResult<()>;

    /// Updates resources that depend on the compiled attachments, e.g. shader
    /// resource groups referencing transient views.
    fn compile_resources(&self, _context: &FrameGraphCompileContext<'_>) -> RhiResult<()> {
        Ok(())
    }

    /// Records the scope's items into `context.command_list()`.
    fn build_command_list(&self, context: &mut FrameGraphExecuteContext<'_, B>) -> RhiResult<()>;
}
