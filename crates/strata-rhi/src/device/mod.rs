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

//! Devices and the objects that span them.

mod arena;
mod mask;
mod object;

pub use self::arena::{LayoutArena, PipelineLayoutHandle, SrgLayoutHandle};
pub use self::mask::DeviceMask;
pub use self::object::{MultiDeviceObject, ObjectState};

use crate::backend::{GraphicsBackend, PhysicalDeviceDescriptor};
use crate::config::{PlatformLimits, RhiConfig};
use crate::error::RhiResult;
use crate::queue::{CommandListPool, CommandQueue, CommandQueueContext, HardwareQueueClass};
use crate::resource::ResourcePoolDatabase;
use crate::sync::lock;
use std::sync::{Arc, Mutex};

/// The index of a device within its [`RhiContext`](crate::RhiContext).
pub type DeviceIndex = usize;

/// One logical GPU.
///
/// A device owns its queues, the registry of its resource pools and its layout
/// arena. It is created by the context at startup and shut down with it.
pub struct Device<B: GraphicsBackend> {
    index: DeviceIndex,
    descriptor: PhysicalDeviceDescriptor,
    backend: Arc<B>,
    native: Arc<B::Device>,
    queue_context: CommandQueueContext<B>,
    pool_database: Arc<ResourcePoolDatabase>,
    layout_arena: Arc<LayoutArena>,
    platform_limits: PlatformLimits,
    state: Mutex<ObjectState>,
}

impl<B: GraphicsBackend> Device<B> {
    /// Opens a physical device and starts its queues.
    pub fn init(
        index: DeviceIndex,
        backend: Arc<B>,
        descriptor: PhysicalDeviceDescriptor,
        config: &RhiConfig,
    ) -> RhiResult<Self> {
        let native = Arc::new(backend.create_device(index, &descriptor)?);
        let queue_context = CommandQueueContext::init(&backend, &native, config)?;
        log::info!(
            "Device {index} '{}' ({}) initialized on the {} backend",
            descriptor.name,
            descriptor.vendor,
            backend.name()
        );
        Ok(Self {
            index,
            descriptor,
            backend,
            native,
            queue_context,
            pool_database: Arc::new(ResourcePoolDatabase::new()),
            layout_arena: Arc::new(LayoutArena::new()),
            platform_limits: config.platform_limits,
            state: Mutex::new(ObjectState::Initialized),
        })
    }

    /// Drains and stops the queues, then checks that every pool was released.
    ///
    /// Pools still registered at this point are reported and forcibly detached.
    /// Calling this more than once does nothing.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        if *state == ObjectState::Shutdown {
            return;
        }
        if let Err(err) = self.queue_context.wait_for_idle() {
            log::warn!("Device {} did not drain before shutdown: {err}", self.index);
        }
        self.queue_context.shutdown();

        if !self.pool_database.is_empty() {
            log::error!(
                "Device {} shut down with {} pool(s) and {} resolver(s) still attached",
                self.index,
                self.pool_database.pool_count(),
                self.pool_database.resolver_count()
            );
            self.pool_database.clear();
        }
        *state = ObjectState::Shutdown;
        log::info!("Device {} shut down", self.index);
    }

    /// The device's index in its context.
    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    /// The physical device this device was opened on.
    pub fn descriptor(&self) -> &PhysicalDeviceDescriptor {
        &self.descriptor
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        *lock(&self.state)
    }

    /// The backend that created the device.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The native device.
    pub fn native(&self) -> &Arc<B::Device> {
        &self.native
    }

    /// The device's queues and frame fencing.
    pub fn queue_context(&self) -> &CommandQueueContext<B> {
        &self.queue_context
    }

    /// The queue of a hardware queue class.
    pub fn command_queue(&self, queue_class: HardwareQueueClass) -> &CommandQueue<B> {
        self.queue_context.queue(queue_class)
    }

    /// The command list pool of a hardware queue class.
    pub fn command_list_pool(
        &self,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<Arc<CommandListPool<B>>> {
        self.command_queue(queue_class).command_list_pool()
    }

    /// The registry of the device's resource pools.
    pub fn resource_pool_database(&self) -> &Arc<ResourcePoolDatabase> {
        &self.pool_database
    }

    /// The arena interning the device's layouts.
    pub fn layout_arena(&self) -> &Arc<LayoutArena> {
        &self.layout_arena
    }

    /// The platform limits the device was configured with.
    pub fn platform_limits(&self) -> &PlatformLimits {
        &self.platform_limits
    }
}

impl<B: GraphicsBackend> Drop for Device<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
