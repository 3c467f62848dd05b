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

//! Budgeted buffer and image pools.
//!
//! A pool registers itself in its device's [`ResourcePoolDatabase`] when it is
//! created and detaches on [`shutdown`](BufferPool::shutdown). The database only
//! indexes pools; the code that created a pool drives its lifetime.

use super::{
    Buffer, BufferBindFlags, BufferDescriptor, Image, ImageBindFlags, ImageDescriptor,
    PoolMemoryUsage, ResourceId, ResourcePool, ResourcePoolDatabase, ResourcePoolType,
};
use crate::device::ObjectState;
use crate::error::{RhiError, RhiResult};
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

struct Accounting {
    state: ObjectState,
    resident_in_bytes: u64,
    resources: HashMap<ResourceId, u64>,
}

/// Budget bookkeeping shared by buffer and image pools.
struct PoolCore {
    name: String,
    budget_in_bytes: u64,
    database: Weak<ResourcePoolDatabase>,
    accounting: Mutex<Accounting>,
}

impl PoolCore {
    fn new(name: String, budget_in_bytes: u64, database: &Arc<ResourcePoolDatabase>) -> Self {
        Self {
            name,
            budget_in_bytes,
            database: Arc::downgrade(database),
            accounting: Mutex::new(Accounting {
                state: ObjectState::Initialized,
                resident_in_bytes: 0,
                resources: HashMap::new(),
            }),
        }
    }

    fn reserve(&self, id: ResourceId, bytes: u64) -> RhiResult<()> {
        let mut accounting = lock(&self.accounting);
        accounting.state.ensure_initialized(&format!("pool '{}'", self.name))?;
        let usage = PoolMemoryUsage {
            budget_in_bytes: self.budget_in_bytes,
            resident_in_bytes: accounting.resident_in_bytes,
        };
        if !usage.can_allocate(bytes) {
            return Err(RhiError::out_of_memory(format!(
                "pool '{}' cannot fit {bytes} bytes ({} of {} resident)",
                self.name, usage.resident_in_bytes, usage.budget_in_bytes
            )));
        }
        accounting.resident_in_bytes += bytes;
        accounting.resources.insert(id, bytes);
        Ok(())
    }

    fn release(&self, id: ResourceId) -> RhiResult<()> {
        let mut accounting = lock(&self.accounting);
        let bytes = accounting.resources.remove(&id).ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "resource {id} does not belong to pool '{}'",
                self.name
            ))
        })?;
        accounting.resident_in_bytes -= bytes;
        Ok(())
    }

    /// Marks the pool shut down. Returns `false` if it already was.
    fn shutdown(&self) -> bool {
        let mut accounting = lock(&self.accounting);
        if accounting.state != ObjectState::Initialized {
            return false;
        }
        if !accounting.resources.is_empty() {
            log::warn!(
                "Pool '{}' shut down with {} live resource(s)",
                self.name,
                accounting.resources.len()
            );
        }
        accounting.resources.clear();
        accounting.resident_in_bytes = 0;
        accounting.state = ObjectState::Shutdown;
        true
    }

    fn detach(&self, pool: &dyn ResourcePool) {
        match self.database.upgrade() {
            Some(database) => {
                if !database.detach_pool(pool) {
                    log::warn!("Pool '{}' was not attached at shutdown", self.name);
                }
            }
            None => log::debug!("Pool '{}' outlived its database", self.name),
        }
    }

    fn resource_count(&self) -> usize {
        lock(&self.accounting).resources.len()
    }

    fn memory_usage(&self) -> PoolMemoryUsage {
        PoolMemoryUsage {
            budget_in_bytes: self.budget_in_bytes,
            resident_in_bytes: lock(&self.accounting).resident_in_bytes,
        }
    }
}

/// Parameters of a [`BufferPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolDescriptor {
    /// The debug name.
    pub name: String,
    /// The bind flags every buffer of the pool may use.
    pub bind_flags: BufferBindFlags,
    /// The byte budget. Zero means unlimited.
    pub budget_in_bytes: u64,
}

/// A pool of buffers sharing a budget and a set of bind flags.
pub struct BufferPool {
    descriptor: BufferPoolDescriptor,
    core: PoolCore,
}

impl BufferPool {
    /// Creates a pool and attaches it to `database`.
    pub fn init(
        database: &Arc<ResourcePoolDatabase>,
        descriptor: BufferPoolDescriptor,
    ) -> RhiResult<Arc<Self>> {
        let pool = Arc::new(Self {
            core: PoolCore::new(descriptor.name.clone(), descriptor.budget_in_bytes, database),
            descriptor,
        });
        database.attach_pool(pool.clone(), None);
        log::debug!("Buffer pool '{}' initialized", pool.descriptor.name);
        Ok(pool)
    }

    /// Creates a buffer accounted against the pool's budget.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if the buffer requests bind flags the pool lacks.
    /// * `OutOfMemory` if the budget would be exceeded.
    /// * `InvalidOperation` if the pool was shut down.
    pub fn init_buffer(
        &self,
        name: impl Into<String>,
        descriptor: BufferDescriptor,
    ) -> RhiResult<Arc<Buffer>> {
        if !self.descriptor.bind_flags.contains(descriptor.bind_flags) {
            return Err(RhiError::invalid_argument(format!(
                "buffer bind flags {:?} exceed pool '{}' flags {:?}",
                descriptor.bind_flags, self.descriptor.name, self.descriptor.bind_flags
            )));
        }
        let buffer = Buffer::new(name, descriptor);
        self.core.reserve(buffer.id(), descriptor.byte_count)?;
        Ok(buffer)
    }

    /// Returns a buffer's bytes to the pool budget.
    pub fn shutdown_buffer(&self, buffer: &Buffer) -> RhiResult<()> {
        self.core.release(buffer.id())
    }

    /// Releases every buffer and detaches the pool from its database.
    pub fn shutdown(&self) {
        if self.core.shutdown() {
            self.core.detach(self);
            log::debug!("Buffer pool '{}' shut down", self.descriptor.name);
        }
    }

    /// The descriptor the pool was created with.
    pub fn descriptor(&self) -> &BufferPoolDescriptor {
        &self.descriptor
    }
}

impl ResourcePool for BufferPool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn pool_type(&self) -> ResourcePoolType {
        ResourcePoolType::Buffer
    }

    fn resource_count(&self) -> usize {
        self.core.resource_count()
    }

    fn memory_usage(&self) -> PoolMemoryUsage {
        self.core.memory_usage()
    }
}

/// Parameters of an [`ImagePool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePoolDescriptor {
    /// The debug name.
    pub name: String,
    /// The bind flags every image of the pool may use.
    pub bind_flags: ImageBindFlags,
    /// The byte budget. Zero means unlimited.
    pub budget_in_bytes: u64,
}

/// A pool of images sharing a budget and a set of bind flags.
pub struct ImagePool {
    descriptor: ImagePoolDescriptor,
    core: PoolCore,
}

impl ImagePool {
    /// Creates a pool and attaches it to `database`.
    pub fn init(
        database: &Arc<ResourcePoolDatabase>,
        descriptor: ImagePoolDescriptor,
    ) -> RhiResult<Arc<Self>> {
        let pool = Arc::new(Self {
            core: PoolCore::new(descriptor.name.clone(), descriptor.budget_in_bytes, database),
            descriptor,
        });
        database.attach_pool(pool.clone(), None);
        log::debug!("Image pool '{}' initialized", pool.descriptor.name);
        Ok(pool)
    }

    /// Creates an image accounted against the pool's budget.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for bind flags the pool lacks or an invalid descriptor.
    /// * `OutOfMemory` if the budget would be exceeded.
    /// * `InvalidOperation` if the pool was shut down.
    pub fn init_image(
        &self,
        name: impl Into<String>,
        descriptor: ImageDescriptor,
    ) -> RhiResult<Arc<Image>> {
        if !self.descriptor.bind_flags.contains(descriptor.bind_flags) {
            return Err(RhiError::invalid_argument(format!(
                "image bind flags {:?} exceed pool '{}' flags {:?}",
                descriptor.bind_flags, self.descriptor.name, self.descriptor.bind_flags
            )));
        }
        let image = Image::new(name, descriptor)?;
        self.core.reserve(image.id(), descriptor.byte_size())?;
        Ok(image)
    }

    /// Returns an image's bytes to the pool budget.
    pub fn shutdown_image(&self, image: &Image) -> RhiResult<()> {
        self.core.release(image.id())
    }

    /// Releases every image and detaches the pool from its database.
    pub fn shutdown(&self) {
        if self.core.shutdown() {
            self.core.detach(self);
            log::debug!("Image pool '{}' shut down", self.descriptor.name);
        }
    }

    /// The descriptor the pool was created with.
    pub fn descriptor(&self) -> &ImagePoolDescriptor {
        &self.descriptor
    }
}

impl ResourcePool for ImagePool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn pool_type(&self) -> ResourcePoolType {
        ResourcePoolType::Image
    }

    fn resource_count(&self) -> usize {
        self.core.resource_count()
    }

    fn memory_usage(&self) -> PoolMemoryUsage {
        self.core.memory_usage()
    }
}
