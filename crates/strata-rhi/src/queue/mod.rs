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

//! Hardware queues, their fences, and per-frame fencing.
//!
//! - [`CommandQueue`]: one worker thread per hardware queue draining a FIFO of commands.
//! - [`Fence`]: the timeline counter each queue signals.
//! - [`CommandQueueContext`]: the per-device set of queues plus the frame fence ring.
//! - [`CommandListPool`]: bounded per-queue recycling of native command lists.

mod command_list_pool;
mod command_queue;
mod context;
mod fence;

pub use self::command_list_pool::CommandListPool;
pub use self::command_queue::{
    Command, CommandQueue, CommandQueueDescriptor, ExecuteWorkRequest,
};
pub use self::context::CommandQueueContext;
pub use self::fence::Fence;

use std::fmt;

/// One of the independent submission timelines a GPU exposes.
///
/// Capabilities nest: a graphics queue can do everything a compute queue can,
/// which can do everything a copy queue can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HardwareQueueClass {
    /// Draws, dispatches and copies.
    Graphics,
    /// Dispatches and copies.
    Compute,
    /// Copies only.
    Copy,
}

impl HardwareQueueClass {
    /// The number of queue classes.
    pub const COUNT: usize = 3;

    /// Every queue class, in index order.
    pub const ALL: [HardwareQueueClass; Self::COUNT] = [
        HardwareQueueClass::Graphics,
        HardwareQueueClass::Compute,
        HardwareQueueClass::Copy,
    ];

    /// Returns the dense index of this class.
    pub const fn index(self) -> usize {
        match self {
            HardwareQueueClass::Graphics => 0,
            HardwareQueueClass::Compute => 1,
            HardwareQueueClass::Copy => 2,
        }
    }

    /// Returns the class at a dense index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(HardwareQueueClass::Graphics),
            1 => Some(HardwareQueueClass::Compute),
            2 => Some(HardwareQueueClass::Copy),
            _ => None,
        }
    }

    /// Returns `true` if work recorded for `other` may run on this queue.
    pub const fn supports(self, other: HardwareQueueClass) -> bool {
        self.index() <= other.index()
    }

    /// A short lowercase name, used in thread names and logs.
    pub const fn name(self) -> &'static str {
        match self {
            HardwareQueueClass::Graphics => "graphics",
            HardwareQueueClass::Compute => "compute",
            HardwareQueueClass::Copy => "copy",
        }
    }
}

impl fmt::Display for HardwareQueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One fence value per hardware queue class.
///
/// Used to record cross-queue dependencies: a zero entry means "no dependency on
/// that queue", any other value means "wait until that queue's fence reaches it".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueFenceValues {
    values: [u64; HardwareQueueClass::COUNT],
}

impl QueueFenceValues {
    /// A set with no dependencies.
    pub const NONE: Self = Self {
        values: [0; HardwareQueueClass::COUNT],
    };

    /// Returns the value recorded for a queue class, zero if none.
    pub fn get(&self, queue_class: HardwareQueueClass) -> u64 {
        self.values[queue_class.index()]
    }

    /// Overwrites the value recorded for a queue class.
    pub fn set(&mut self, queue_class: HardwareQueueClass, value: u64) {
        self.values[queue_class.index()] = value;
    }

    /// Raises the value for a queue class to at least `value`.
    pub fn merge_max(&mut self, queue_class: HardwareQueueClass, value: u64) {
        let slot = &mut self.values[queue_class.index()];
        *slot = (*slot).max(value);
    }

    /// Returns `true` if no queue has a dependency.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&v| v == 0)
    }

    /// Iterates the queue classes that carry a dependency.
    pub fn iter(&self) -> impl Iterator<Item = (HardwareQueueClass, u64)> + '_ {
        HardwareQueueClass::ALL
            .into_iter()
            .map(|class| (class, self.get(class)))
            .filter(|&(_, value)| value != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_class_index_round_trip() {
        for class in HardwareQueueClass::ALL {
            assert_eq!(HardwareQueueClass::from_index(class.index()), Some(class));
        }
        assert_eq!(HardwareQueueClass::from_index(3), None);
    }

    #[test]
    fn queue_class_capabilities_nest() {
        use HardwareQueueClass::*;
        assert!(Graphics.supports(Compute));
        assert!(Graphics.supports(Copy));
        assert!(Compute.supports(Copy));
        assert!(!Compute.supports(Graphics));
        assert!(!Copy.supports(Compute));
    }

    #[test]
    fn fence_values_zero_means_no_dependency() {
        let mut values = QueueFenceValues::NONE;
        assert!(values.is_empty());

        values.merge_max(HardwareQueueClass::Compute, 4);
        values.merge_max(HardwareQueueClass::Compute, 2);
        values.set(HardwareQueueClass::Copy, 7);

        let deps: Vec<_> = values.iter().collect();
        assert_eq!(
            deps,
            vec![(HardwareQueueClass::Compute, 4), (HardwareQueueClass::Copy, 7)]
        );
        assert_eq!(values.get(HardwareQueueClass::Graphics), 0);
    }
}
