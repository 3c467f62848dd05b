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

use std::sync::{Mutex, MutexGuard};
use strata_rhi::{DeviceIndex, HardwareQueueClass};

/// What an executed command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullCommandKind {
    /// A debug region opened.
    BeginMarker(String),
    /// A debug region closed.
    EndMarker,
    /// A draw of `count` vertices or indices.
    Draw {
        /// Vertices or indices drawn.
        count: u32,
        /// Instances drawn.
        instances: u32,
        /// The content hash of the pipeline.
        pipeline: u64,
    },
    /// A compute dispatch.
    Dispatch {
        /// Thread groups along each axis.
        thread_groups: [u32; 3],
        /// The content hash of the pipeline.
        pipeline: u64,
    },
    /// A ray dispatch.
    DispatchRays {
        /// The launch width, height and depth.
        extent: [u32; 3],
    },
    /// A copy.
    Copy,
    /// A fence wait that was satisfied.
    Wait {
        /// The value waited for.
        value: u64,
    },
    /// The submission raised its signal fence.
    Signal {
        /// The value signaled.
        value: u64,
    },
}

/// One entry of the [`ExecutionLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// The device that ran the command.
    pub device_index: DeviceIndex,
    /// The queue that ran the command.
    pub queue_class: HardwareQueueClass,
    /// The label the command list was begun with. Empty for signals.
    pub list_label: String,
    /// What the command did.
    pub kind: NullCommandKind,
}

/// The commands executed by every queue of a backend, in execution order.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    entries: Mutex<Vec<ExecutedCommand>>,
}

impl ExecutionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ExecutedCommand>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record(&self, command: ExecutedCommand) {
        self.entries().push(command);
    }

    /// A copy of every entry so far.
    pub fn snapshot(&self) -> Vec<ExecutedCommand> {
        self.entries().clone()
    }

    /// The position of the first entry matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&ExecutedCommand) -> bool) -> Option<usize> {
        self.entries().iter().position(predicate)
    }

    /// The position of the debug region named `name`.
    pub fn marker_position(&self, name: &str) -> Option<usize> {
        self.position(|entry| matches!(&entry.kind, NullCommandKind::BeginMarker(marker) if marker == name))
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Checks if nothing ran yet.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.entries().clear();
    }
}
