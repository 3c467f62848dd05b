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

//! The contract every graphics backend implements.
//!
//! A backend is chosen at build time by instantiating the core types with a
//! concrete [`GraphicsBackend`]. The core only ever manipulates the associated
//! native types through the traits below.

use crate::command::{CopyItem, DispatchItem, DispatchRaysItem, DrawItem};
use crate::error::RhiResult;
use crate::pipeline::PipelineStateDescriptor;
use crate::queue::HardwareQueueClass;
use crate::srg::{ShaderResourceGroupData, ShaderResourceGroupLayout};
use std::time::Duration;

/// Describes a physical device reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalDeviceDescriptor {
    /// The human-readable adapter name.
    pub name: String,
    /// The vendor name or identifier.
    pub vendor: String,
    /// Whether the device can execute ray dispatches.
    pub supports_ray_tracing: bool,
}

/// The root trait of a graphics backend.
///
/// The associated types are the backend's native objects. Factory methods create
/// them from a native device; the core owns and sequences them.
pub trait GraphicsBackend: Send + Sync + Sized + 'static {
    /// A logical device.
    type Device: Send + Sync + 'static;
    /// A hardware queue.
    type Queue: NativeQueue<Self>;
    /// A timeline fence.
    type Fence: NativeFence;
    /// A recordable command list.
    type CommandList: NativeCommandList<Self>;
    /// A pipeline state cache.
    type PipelineLibrary: NativePipelineLibrary;
    /// A compiled pipeline state object.
    type PipelineState: Send + Sync + 'static;
    /// A shader resource group.
    type ShaderResourceGroup: Send + Sync + 'static;

    /// A short name identifying the backend, used in logs.
    fn name(&self) -> &str;

    /// Lists the physical devices available to this backend, in index order.
    fn enumerate_physical_devices(&self) -> RhiResult<Vec<PhysicalDeviceDescriptor>>;

    /// Opens a logical device on a physical device.
    ///
    /// # Arguments
    ///
    /// * `index`: The index the device will have in the context.
    /// * `physical_device`: The physical device to open.
    fn create_device(
        &self,
        index: usize,
        physical_device: &PhysicalDeviceDescriptor,
    ) -> RhiResult<Self::Device>;

    /// Creates the native queue of a hardware queue class.
    fn create_queue(
        &self,
        device: &Self::Device,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<Self::Queue>;

    /// Creates a timeline fence starting at `initial_value`.
    fn create_fence(&self, device: &Self::Device, initial_value: u64) -> RhiResult<Self::Fence>;

    /// Creates a command list that records work for a queue class.
    fn create_command_list(
        &self,
        device: &Self::Device,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<Self::CommandList>;

    /// Creates a pipeline library, optionally seeded with serialized data.
    fn create_pipeline_library(
        &self,
        device: &Self::Device,
        serialized_data: Option<&[u8]>,
    ) -> RhiResult<Self::PipelineLibrary>;

    /// Compiles a pipeline state, recording it into `library` when one is given.
    fn create_pipeline_state(
        &self,
        device: &Self::Device,
        descriptor: &PipelineStateDescriptor,
        library: Option<&Self::PipelineLibrary>,
    ) -> RhiResult<Self::PipelineState>;

    /// Creates an empty shader resource group for a layout.
    fn create_shader_resource_group(
        &self,
        device: &Self::Device,
        layout: &ShaderResourceGroupLayout,
    ) -> RhiResult<Self::ShaderResourceGroup>;

    /// Writes new data into a shader resource group.
    fn compile_shader_resource_group(
        &self,
        device: &Self::Device,
        group: &Self::ShaderResourceGroup,
        data: &ShaderResourceGroupData,
    ) -> RhiResult<()>;
}

/// A native hardware queue.
pub trait NativeQueue<B: GraphicsBackend>: Send + Sync + 'static {
    /// Submits command lists for execution, in order.
    ///
    /// When `signal` is given, the fence is signaled to the value once every list
    /// in the submission has completed. An empty `command_lists` slice only signals.
    fn submit(
        &self,
        command_lists: &[&B::CommandList],
        signal: Option<(&B::Fence, u64)>,
    ) -> RhiResult<()>;

    /// Blocks until every submission made so far has completed.
    fn wait_for_idle(&self) -> RhiResult<()>;
}

/// A native timeline fence.
///
/// Cloning produces a new handle to the same fence.
pub trait NativeFence: Clone + Send + Sync + 'static {
    /// The last value the fence reached.
    fn completed_value(&self) -> u64;

    /// Raises the fence to `value` from the CPU.
    fn signal_on_cpu(&self, value: u64);

    /// Blocks until the fence reaches `value` or the timeout expires.
    ///
    /// Returns `true` if the value was reached.
    fn wait_on_cpu(&self, value: u64, timeout: Duration) -> bool;
}

/// A native command list.
pub trait NativeCommandList<B: GraphicsBackend>: Send + 'static {
    /// Opens the list for recording, discarding anything previously recorded.
    fn begin(&mut self, label: &str) -> RhiResult<()>;

    /// Closes the list.
    fn end(&mut self) -> RhiResult<()>;

    /// Records a GPU-side wait until `fence` reaches `value`.
    fn encode_wait_event(&mut self, fence: &B::Fence, value: u64);

    /// Opens a named debug region.
    fn begin_debug_marker(&mut self, name: &str);

    /// Closes the innermost debug region.
    fn end_debug_marker(&mut self);

    /// Records a draw.
    fn draw(&mut self, item: &DrawItem<'_, B>);

    /// Records a compute dispatch.
    fn dispatch(&mut self, item: &DispatchItem<'_, B>);

    /// Records a copy.
    fn copy(&mut self, item: &CopyItem<'_>);

    /// Records a ray dispatch.
    fn dispatch_rays(&mut self, item: &DispatchRaysItem<'_, B>);
}

/// A native pipeline library.
///
/// Libraries are shared between recording threads, so every method takes `&self`.
pub trait NativePipelineLibrary: Send + Sync + 'static {
    /// Merges the contents of other libraries into this one.
    fn merge_from(&self, libraries: &[&Self]) -> RhiResult<()>;

    /// Returns `true` if the library holds state not yet serialized.
    fn is_merge_required(&self) -> bool;

    /// Serializes the library so it can seed a future one.
    fn serialized_data(&self) -> RhiResult<Vec<u8>>;
}
