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

use super::backend::NullBackend;
use super::execution_log::NullCommandKind;
use super::fence::NullFence;
use strata_rhi::command::{CopyItem, DispatchItem, DispatchRaysItem, DrawArguments, DrawItem};
use strata_rhi::{HardwareQueueClass, NativeCommandList, RhiError, RhiResult};

/// A command recorded into a [`NullCommandList`].
#[derive(Debug, Clone)]
pub enum NullCommand {
    /// Block until `fence` reaches `value`.
    Wait {
        /// The fence waited on.
        fence: NullFence,
        /// The value waited for.
        value: u64,
    },
    /// Any other command. Executing it appends it to the log.
    Execute(NullCommandKind),
}

/// A command list that records commands as data.
#[derive(Debug)]
pub struct NullCommandList {
    queue_class: HardwareQueueClass,
    label: String,
    commands: Vec<NullCommand>,
    recording: bool,
}

impl NullCommandList {
    pub(crate) fn new(queue_class: HardwareQueueClass) -> Self {
        Self {
            queue_class,
            label: String::new(),
            commands: Vec::new(),
            recording: false,
        }
    }

    /// The queue class the list records for.
    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    /// The label of the current recording.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The recorded commands.
    pub fn commands(&self) -> &[NullCommand] {
        &self.commands
    }

    fn push(&mut self, kind: NullCommandKind) {
        self.commands.push(NullCommand::Execute(kind));
    }
}

impl NativeCommandList<NullBackend> for NullCommandList {
    fn begin(&mut self, label: &str) -> RhiResult<()> {
        if self.recording {
            log::error!("Null command list '{}' begun twice", self.label);
            return Err(RhiError::InvalidOperation(format!(
                "command list '{}' is already recording",
                self.label
            )));
        }
        self.label = label.to_owned();
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        if !self.recording {
            return Err(RhiError::InvalidOperation(format!(
                "command list '{}' is not recording",
                self.label
            )));
        }
        self.recording = false;
        Ok(())
    }

    fn encode_wait_event(&mut self, fence: &NullFence, value: u64) {
        self.commands.push(NullCommand::Wait {
            fence: fence.clone(),
            value,
        });
    }

    fn begin_debug_marker(&mut self, name: &str) {
        self.push(NullCommandKind::BeginMarker(name.to_owned()));
    }

    fn end_debug_marker(&mut self) {
        self.push(NullCommandKind::EndMarker);
    }

    fn draw(&mut self, item: &DrawItem<'_, NullBackend>) {
        let (count, instances) = match item.arguments {
            DrawArguments::Linear {
                vertex_count,
                instance_count,
                ..
            } => (vertex_count, instance_count),
            DrawArguments::Indexed {
                index_count,
                instance_count,
                ..
            } => (index_count, instance_count),
        };
        self.push(NullCommandKind::Draw {
            count,
            instances,
            pipeline: item.pipeline_state.native().content_hash(),
        });
    }

    fn dispatch(&mut self, item: &DispatchItem<'_, NullBackend>) {
        self.push(NullCommandKind::Dispatch {
            thread_groups: item.thread_groups,
            pipeline: item.pipeline_state.native().content_hash(),
        });
    }

    fn copy(&mut self, _item: &CopyItem<'_>) {
        self.push(NullCommandKind::Copy);
    }

    fn dispatch_rays(&mut self, item: &DispatchRaysItem<'_, NullBackend>) {
        self.push(NullCommandKind::DispatchRays {
            extent: [item.extent.width, item.extent.height, item.extent.depth],
        });
    }
}
