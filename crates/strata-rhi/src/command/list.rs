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

use super::items::{CopyItem, DispatchItem, DispatchRaysItem, DrawItem};
use crate::backend::{GraphicsBackend, NativeCommandList};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::PipelineStateType;
use crate::queue::{Fence, HardwareQueueClass};

/// The recording state of a [`CommandList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// Fresh from the pool.
    Idle,
    /// Between `begin` and `end`.
    Recording,
    /// Closed and ready for submission.
    Closed,
}

/// Counts of the work recorded into a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandListStatistics {
    /// Draw calls.
    pub draws: u32,
    /// Compute dispatches.
    pub dispatches: u32,
    /// Copies.
    pub copies: u32,
    /// Ray dispatches.
    pub ray_dispatches: u32,
    /// GPU-side fence waits.
    pub wait_events: u32,
    /// Debug regions opened.
    pub debug_markers: u32,
}

/// A command list of one hardware queue class.
///
/// Wraps the native list and rejects work the queue class or pipeline cannot
/// run before it reaches the backend.
pub struct CommandList<B: GraphicsBackend> {
    native: B::CommandList,
    queue_class: HardwareQueueClass,
    state: CommandListState,
    statistics: CommandListStatistics,
    open_markers: u32,
}

impl<B: GraphicsBackend> CommandList<B> {
    pub(crate) fn new(native: B::CommandList, queue_class: HardwareQueueClass) -> Self {
        Self {
            native,
            queue_class,
            state: CommandListState::Idle,
            statistics: CommandListStatistics::default(),
            open_markers: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = CommandListState::Idle;
        self.statistics = CommandListStatistics::default();
        self.open_markers = 0;
    }

    /// Opens the list for recording.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` unless the list is idle.
    pub fn begin(&mut self, label: &str) -> RhiResult<()> {
        if self.state != CommandListState::Idle {
            return Err(RhiError::invalid_operation(format!(
                "cannot begin '{label}': command list is {:?}",
                self.state
            )));
        }
        self.native.begin(label)?;
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// Closes the list, closing any debug region left open.
    pub fn end(&mut self) -> RhiResult<()> {
        self.ensure_recording("end")?;
        while self.open_markers > 0 {
            self.native.end_debug_marker();
            self.open_markers -= 1;
        }
        self.native.end()?;
        self.state = CommandListState::Closed;
        Ok(())
    }

    /// Records a GPU-side wait until `fence` reaches `value`.
    pub fn encode_wait_event(&mut self, fence: &Fence<B>, value: u64) -> RhiResult<()> {
        self.ensure_recording("encode a wait event")?;
        self.native.encode_wait_event(fence.native(), value);
        self.statistics.wait_events += 1;
        Ok(())
    }

    /// Opens a named debug region.
    pub fn begin_debug_marker(&mut self, name: &str) -> RhiResult<()> {
        self.ensure_recording("begin a debug marker")?;
        self.native.begin_debug_marker(name);
        self.open_markers += 1;
        self.statistics.debug_markers += 1;
        Ok(())
    }

    /// Closes the innermost debug region.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if no region is open.
    pub fn end_debug_marker(&mut self) -> RhiResult<()> {
        self.ensure_recording("end a debug marker")?;
        if self.open_markers == 0 {
            return Err(RhiError::invalid_operation("no debug marker is open"));
        }
        self.native.end_debug_marker();
        self.open_markers -= 1;
        Ok(())
    }

    /// Records a draw.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the list is not recording or is not a graphics list.
    /// * `InvalidArgument` if the pipeline is not a draw pipeline, or an indexed
    ///   draw has no index buffer.
    pub fn submit_draw(&mut self, item: &DrawItem<'_, B>) -> RhiResult<()> {
        self.ensure_recording("draw")?;
        if self.queue_class != HardwareQueueClass::Graphics {
            return Err(RhiError::invalid_operation(format!(
                "draws need a graphics command list, not {}",
                self.queue_class
            )));
        }
        check_pipeline_type(item.pipeline_state.pipeline_type(), PipelineStateType::Draw)?;
        if item.arguments.is_indexed() && item.index_buffer_view.is_none() {
            return Err(RhiError::invalid_argument("indexed draw without an index buffer view"));
        }
        self.native.draw(item);
        self.statistics.draws += 1;
        Ok(())
    }

    /// Records a compute dispatch on a graphics or compute list.
    pub fn submit_dispatch(&mut self, item: &DispatchItem<'_, B>) -> RhiResult<()> {
        self.ensure_recording("dispatch")?;
        if !self.queue_class.supports(HardwareQueueClass::Compute) {
            return Err(RhiError::invalid_operation(format!(
                "dispatches need a graphics or compute command list, not {}",
                self.queue_class
            )));
        }
        check_pipeline_type(item.pipeline_state.pipeline_type(), PipelineStateType::Dispatch)?;
        if item.thread_groups.contains(&0) {
            log::warn!("Dispatch with an empty thread group count {:?}", item.thread_groups);
        }
        self.native.dispatch(item);
        self.statistics.dispatches += 1;
        Ok(())
    }

    /// Records a ray dispatch on a graphics or compute list.
    pub fn submit_dispatch_rays(&mut self, item: &DispatchRaysItem<'_, B>) -> RhiResult<()> {
        self.ensure_recording("dispatch rays")?;
        if !self.queue_class.supports(HardwareQueueClass::Compute) {
            return Err(RhiError::invalid_operation(format!(
                "ray dispatches need a graphics or compute command list, not {}",
                self.queue_class
            )));
        }
        check_pipeline_type(item.pipeline_state.pipeline_type(), PipelineStateType::RayTracing)?;
        self.native.dispatch_rays(item);
        self.statistics.ray_dispatches += 1;
        Ok(())
    }

    /// Records a copy. Every queue class can copy.
    pub fn submit_copy(&mut self, item: &CopyItem<'_>) -> RhiResult<()> {
        self.ensure_recording("copy")?;
        item.validate()?;
        self.native.copy(item);
        self.statistics.copies += 1;
        Ok(())
    }

    fn ensure_recording(&self, action: &str) -> RhiResult<()> {
        if self.state == CommandListState::Recording {
            Ok(())
        } else {
            Err(RhiError::invalid_operation(format!(
                "cannot {action}: command list is {:?}",
                self.state
            )))
        }
    }

    /// The native list.
    pub fn native(&self) -> &B::CommandList {
        &self.native
    }

    /// The recording state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// The work recorded since the list was last begun.
    pub fn statistics(&self) -> CommandListStatistics {
        self.statistics
    }

    /// The queue class the list records for.
    pub fn hardware_queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }
}

fn check_pipeline_type(actual: PipelineStateType, expected: PipelineStateType) -> RhiResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(RhiError::invalid_argument(format!(
            "expected a {expected:?} pipeline state, got {actual:?}"
        )))
    }
}
