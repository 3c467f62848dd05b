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

//! GPU resources, the pools that own them, and the per-device pool registry.

mod buffer;
mod database;
mod image;
mod pool;
mod transient;

pub use self::buffer::{Buffer, BufferBindFlags, BufferDescriptor, BufferView, BufferViewDescriptor};
pub use self::database::ResourcePoolDatabase;
pub use self::image::{
    Extent3D, Format, Image, ImageBindFlags, ImageDescriptor, ImageDimension, ImageView,
    ImageViewDescriptor,
};
pub use self::pool::{BufferPool, BufferPoolDescriptor, ImagePool, ImagePoolDescriptor};
pub use self::transient::{
    HeapPlacement, TransientAllocationRequest, TransientAttachmentPool, TransientAttachmentStatistics,
    TransientHeapKind,
};

use crate::error::RhiResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique identifier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocates a fresh identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of resources a pool hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourcePoolType {
    /// Buffers.
    Buffer,
    /// Images.
    Image,
    /// Shader resource groups.
    ShaderResourceGroup,
}

/// Memory accounting of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMemoryUsage {
    /// The pool budget. Zero means unlimited.
    pub budget_in_bytes: u64,
    /// The bytes currently held by live resources.
    pub resident_in_bytes: u64,
}

impl PoolMemoryUsage {
    /// Checks if `additional` bytes fit in the remaining budget.
    pub fn can_allocate(&self, additional: u64) -> bool {
        self.budget_in_bytes == 0
            || self.resident_in_bytes.saturating_add(additional) <= self.budget_in_bytes
    }
}

/// A pool registered in a device's [`ResourcePoolDatabase`].
pub trait ResourcePool: Send + Sync {
    /// The debug name of the pool.
    fn name(&self) -> &str;

    /// The kind of resources the pool owns.
    fn pool_type(&self) -> ResourcePoolType;

    /// The number of live resources.
    fn resource_count(&self) -> usize;

    /// The pool's memory accounting.
    fn memory_usage(&self) -> PoolMemoryUsage;

    /// Releases memory no longer needed by live resources.
    fn compact(&self) {}
}

/// A pool with per-frame work, driven by the frame scheduler.
pub trait ResourcePoolResolver: Send + Sync {
    /// Processes deferred updates before the frame executes.
    fn compile(&self) -> RhiResult<()>;

    /// Called once the frame's work was submitted.
    fn on_frame_end(&self) {}
}
