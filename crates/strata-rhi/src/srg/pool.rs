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

//! Pools of shader resource groups, per device and across devices.
//!
//! Writing data into a group is deferred: the data is queued on the pool and
//! compiled into the native group when the frame scheduler runs the pool
//! resolvers, right before the frame executes.

use super::{ShaderResourceGroupData, ShaderResourceGroupLayout};
use crate::backend::GraphicsBackend;
use crate::context::RhiContext;
use crate::device::{
    Device, DeviceIndex, DeviceMask, LayoutArena, MultiDeviceObject, ObjectState, SrgLayoutHandle,
};
use crate::error::{RhiError, RhiResult};
use crate::resource::{
    PoolMemoryUsage, ResourceId, ResourcePool, ResourcePoolDatabase, ResourcePoolResolver,
    ResourcePoolType,
};
use crate::sync::{lock, read, write};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// A device-local shader resource group.
pub struct ShaderResourceGroup<B: GraphicsBackend> {
    id: ResourceId,
    name: String,
    pool_id: ResourceId,
    layout: Arc<ShaderResourceGroupLayout>,
    native: B::ShaderResourceGroup,
    data: RwLock<Option<Arc<ShaderResourceGroupData>>>,
    compile_count: AtomicU64,
}

impl<B: GraphicsBackend> ShaderResourceGroup<B> {
    /// The group's unique id.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The group's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The layout of the owning pool.
    pub fn layout(&self) -> &Arc<ShaderResourceGroupLayout> {
        &self.layout
    }

    /// The native group.
    pub fn native(&self) -> &B::ShaderResourceGroup {
        &self.native
    }

    /// The data last compiled into the group, if any.
    pub fn data(&self) -> Option<Arc<ShaderResourceGroupData>> {
        read(&self.data).clone()
    }

    /// How many times data was compiled into the group.
    pub fn compile_count(&self) -> u64 {
        self.compile_count.load(Ordering::Relaxed)
    }
}

/// Parameters of a [`ShaderResourceGroupPool`].
#[derive(Debug, Clone)]
pub struct ShaderResourceGroupPoolDescriptor {
    /// The pool's name.
    pub name: String,
    /// The layout shared by every group of the pool.
    pub layout: Arc<ShaderResourceGroupLayout>,
}

type CompileQueue<B> = BTreeMap<ResourceId, (Arc<ShaderResourceGroup<B>>, Arc<ShaderResourceGroupData>)>;

/// The groups of one layout on one device.
///
/// The pool is attached to its device's [`ResourcePoolDatabase`] both as a pool
/// and as a resolver.
pub struct ShaderResourceGroupPool<B: GraphicsBackend> {
    id: ResourceId,
    descriptor: ShaderResourceGroupPoolDescriptor,
    backend: Arc<B>,
    device: Arc<B::Device>,
    device_index: DeviceIndex,
    database: Weak<ResourcePoolDatabase>,
    arena: Arc<LayoutArena>,
    layout_handle: SrgLayoutHandle,
    state: Mutex<ObjectState>,
    groups: Mutex<Vec<Weak<ShaderResourceGroup<B>>>>,
    compile_queue: Mutex<CompileQueue<B>>,
    compiled_this_frame: AtomicUsize,
    compiled_last_frame: AtomicUsize,
}

impl<B: GraphicsBackend> ShaderResourceGroupPool<B> {
    /// Creates a pool on `device`, interning its layout and attaching it to the
    /// device's pool database.
    pub fn init(
        device: &Device<B>,
        descriptor: ShaderResourceGroupPoolDescriptor,
    ) -> RhiResult<Arc<Self>> {
        device.state().ensure_initialized("device")?;
        let arena = device.layout_arena().clone();
        let layout_handle = arena.intern_srg_layout(descriptor.layout.clone());
        let pool = Arc::new(Self {
            id: ResourceId::next(),
            descriptor,
            backend: device.backend().clone(),
            device: device.native().clone(),
            device_index: device.index(),
            database: Arc::downgrade(device.resource_pool_database()),
            arena,
            layout_handle,
            state: Mutex::new(ObjectState::Initialized),
            groups: Mutex::new(Vec::new()),
            compile_queue: Mutex::new(BTreeMap::new()),
            compiled_this_frame: AtomicUsize::new(0),
            compiled_last_frame: AtomicUsize::new(0),
        });
        let resolver: Arc<dyn ResourcePoolResolver> = pool.clone();
        device
            .resource_pool_database()
            .attach_pool(pool.clone(), Some(resolver));
        log::debug!(
            "Shader resource group pool '{}' initialized on device {}",
            pool.descriptor.name,
            pool.device_index
        );
        Ok(pool)
    }

    /// Creates an empty group.
    pub fn init_group(&self, name: impl Into<String>) -> RhiResult<Arc<ShaderResourceGroup<B>>> {
        lock(&self.state).ensure_initialized(&format!("pool '{}'", self.descriptor.name))?;
        let native = self
            .backend
            .create_shader_resource_group(&self.device, &self.descriptor.layout)?;
        let group = Arc::new(ShaderResourceGroup {
            id: ResourceId::next(),
            name: name.into(),
            pool_id: self.id,
            layout: self.descriptor.layout.clone(),
            native,
            data: RwLock::new(None),
            compile_count: AtomicU64::new(0),
        });
        lock(&self.groups).push(Arc::downgrade(&group));
        Ok(group)
    }

    /// Queues data to be compiled into `group` on the next resolve.
    ///
    /// Queuing the same group again before the resolve replaces its data.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the pool was shut down.
    /// * `InvalidArgument` if the group belongs to another pool or the data was
    ///   built for another layout.
    pub fn queue_for_compile(
        &self,
        group: &Arc<ShaderResourceGroup<B>>,
        data: Arc<ShaderResourceGroupData>,
    ) -> RhiResult<()> {
        lock(&self.state).ensure_initialized(&format!("pool '{}'", self.descriptor.name))?;
        if group.pool_id != self.id {
            return Err(RhiError::invalid_argument(format!(
                "group '{}' does not belong to pool '{}'",
                group.name, self.descriptor.name
            )));
        }
        if **data.layout() != *self.descriptor.layout {
            return Err(RhiError::invalid_argument(format!(
                "data for layout '{}' cannot be compiled into pool '{}' ({})",
                data.layout().name(),
                self.descriptor.name,
                self.descriptor.layout.name()
            )));
        }
        lock(&self.compile_queue).insert(group.id, (group.clone(), data));
        Ok(())
    }

    /// Releases every pending compile and detaches the pool. Idempotent.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        if *state != ObjectState::Initialized {
            return;
        }
        lock(&self.compile_queue).clear();
        match self.database.upgrade() {
            Some(database) => {
                database.detach_pool(self);
            }
            None => log::debug!("Pool '{}' outlived its database", self.descriptor.name),
        }
        if let Err(err) = self.arena.release_srg_layout(self.layout_handle) {
            log::warn!("Pool '{}' could not release its layout: {err}", self.descriptor.name);
        }
        *state = ObjectState::Shutdown;
        log::debug!("Shader resource group pool '{}' shut down", self.descriptor.name);
    }

    /// The pool's layout.
    pub fn layout(&self) -> &Arc<ShaderResourceGroupLayout> {
        &self.descriptor.layout
    }

    /// The handle of the pool's layout in the device arena.
    pub fn layout_handle(&self) -> SrgLayoutHandle {
        self.layout_handle
    }

    /// The device the pool lives on.
    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        *lock(&self.state)
    }

    /// The number of groups waiting for the next resolve.
    pub fn pending_compile_count(&self) -> usize {
        lock(&self.compile_queue).len()
    }

    /// The number of groups compiled during the last completed frame.
    pub fn compiled_last_frame(&self) -> usize {
        self.compiled_last_frame.load(Ordering::Relaxed)
    }
}

impl<B: GraphicsBackend> ResourcePool for ShaderResourceGroupPool<B> {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn pool_type(&self) -> ResourcePoolType {
        ResourcePoolType::ShaderResourceGroup
    }

    fn resource_count(&self) -> usize {
        lock(&self.groups)
            .iter()
            .filter(|group| group.strong_count() > 0)
            .count()
    }

    fn memory_usage(&self) -> PoolMemoryUsage {
        PoolMemoryUsage::default()
    }

    fn compact(&self) {
        lock(&self.groups).retain(|group| group.strong_count() > 0);
    }
}

impl<B: GraphicsBackend> ResourcePoolResolver for ShaderResourceGroupPool<B> {
    /// Compiles every queued group, continuing past failures.
    ///
    /// # Errors
    ///
    /// The first backend error, after every other group was compiled.
    fn compile(&self) -> RhiResult<()> {
        let queue = std::mem::take(&mut *lock(&self.compile_queue));
        let mut first_error = None;
        let mut compiled = 0;
        for (_, (group, data)) in queue {
            match self
                .backend
                .compile_shader_resource_group(&self.device, &group.native, &data)
            {
                Ok(()) => {
                    *write(&group.data) = Some(data);
                    group.compile_count.fetch_add(1, Ordering::Relaxed);
                    compiled += 1;
                }
                Err(err) => {
                    log::error!("Failed to compile group '{}': {err}", group.name);
                    first_error.get_or_insert(err);
                }
            }
        }
        self.compiled_this_frame.fetch_add(compiled, Ordering::Relaxed);
        first_error.map_or(Ok(()), Err)
    }

    fn on_frame_end(&self) {
        let compiled = self.compiled_this_frame.swap(0, Ordering::Relaxed);
        self.compiled_last_frame.store(compiled, Ordering::Relaxed);
    }
}

/// A shader resource group with one device group per device of a mask.
pub struct MultiDeviceShaderResourceGroup<B: GraphicsBackend> {
    mask: DeviceMask,
    groups: BTreeMap<DeviceIndex, Arc<ShaderResourceGroup<B>>>,
}

impl<B: GraphicsBackend> MultiDeviceShaderResourceGroup<B> {
    /// The devices the group spans.
    pub fn device_mask(&self) -> DeviceMask {
        self.mask
    }

    /// The group of one device.
    pub fn device_group(&self, index: DeviceIndex) -> Option<&Arc<ShaderResourceGroup<B>>> {
        self.groups.get(&index)
    }
}

/// A shader resource group pool spanning several devices.
pub struct MultiDeviceShaderResourceGroupPool<B: GraphicsBackend> {
    object: MultiDeviceObject<Arc<ShaderResourceGroupPool<B>>>,
}

impl<B: GraphicsBackend> Default for MultiDeviceShaderResourceGroupPool<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend> MultiDeviceShaderResourceGroupPool<B> {
    /// Creates an uninitialized pool.
    pub fn new() -> Self {
        Self {
            object: MultiDeviceObject::new(),
        }
    }

    /// Creates one device pool per device of `mask`.
    ///
    /// If any device fails, the pools already created are shut down and detached
    /// from their databases, and the mask stays empty.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the pool was already initialized.
    /// * `InvalidArgument` if `mask` is empty or names a device the context lacks.
    /// * The first device error.
    pub fn init(
        &mut self,
        context: &RhiContext<B>,
        mask: DeviceMask,
        descriptor: &ShaderResourceGroupPoolDescriptor,
    ) -> RhiResult<()> {
        context.validate_mask(mask)?;
        self.object.init_with_rollback(
            mask,
            |index| ShaderResourceGroupPool::init(context.device(index)?, descriptor.clone()),
            |index, pool| {
                log::debug!("Rolling back shader resource group pool on device {index}");
                pool.shutdown();
            },
        )
    }

    /// Creates one group per device.
    pub fn init_group(&self, name: &str) -> RhiResult<MultiDeviceShaderResourceGroup<B>> {
        self.ensure_initialized()?;
        let groups = self
            .object
            .device_objects()
            .map(|(index, pool)| Ok((index, pool.init_group(name)?)))
            .collect::<RhiResult<BTreeMap<_, _>>>()?;
        Ok(MultiDeviceShaderResourceGroup {
            mask: self.object.device_mask(),
            groups,
        })
    }

    /// Queues the same data for every device group.
    ///
    /// The data is shared, not copied, between devices.
    pub fn compile_group(
        &self,
        group: &MultiDeviceShaderResourceGroup<B>,
        data: ShaderResourceGroupData,
    ) -> RhiResult<Arc<ShaderResourceGroupData>> {
        self.ensure_initialized()?;
        if group.mask != self.object.device_mask() {
            return Err(RhiError::invalid_argument(format!(
                "group spans {:?}, pool spans {:?}",
                group.mask,
                self.object.device_mask()
            )));
        }
        let data = Arc::new(data);
        for (index, pool) in self.object.device_objects() {
            if let Some(device_group) = group.groups.get(&index) {
                pool.queue_for_compile(device_group, data.clone())?;
            }
        }
        Ok(data)
    }

    /// Shuts down every device pool.
    pub fn shutdown(&mut self) {
        self.object.shutdown_with(|_, pool| pool.shutdown());
    }

    fn ensure_initialized(&self) -> RhiResult<()> {
        self.object
            .state()
            .ensure_initialized("multi-device shader resource group pool")
    }

    /// The devices the pool spans.
    pub fn device_mask(&self) -> DeviceMask {
        self.object.device_mask()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.object.state()
    }

    /// The pool of one device.
    pub fn device_pool(&self, index: DeviceIndex) -> Option<&Arc<ShaderResourceGroupPool<B>>> {
        self.object.device_object(index)
    }

    /// The number of device pools.
    pub fn device_pool_count(&self) -> usize {
        self.object.device_object_count()
    }
}
