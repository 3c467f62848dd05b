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

use super::command::NullCommandList;
use super::execution_log::ExecutionLog;
use super::fence::NullFence;
use super::pipeline::{NullPipelineLibrary, NullPipelineState};
use super::queue::NullQueue;
use super::srg::NullShaderResourceGroup;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_rhi::pipeline::{PipelineStateDescriptor, PipelineStateType};
use strata_rhi::srg::{ShaderResourceGroupData, ShaderResourceGroupLayout};
use strata_rhi::{
    DeviceIndex, GraphicsBackend, HardwareQueueClass, PhysicalDeviceDescriptor, RhiError,
    RhiResult,
};

/// Configures a [`NullBackend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullBackendDescriptor {
    /// How many physical devices the backend reports.
    pub device_count: usize,
    /// How long each non-empty submission sleeps before it runs.
    pub queue_latency: Duration,
    /// How long a queue blocks on a fence wait encoded in a command list.
    pub wait_timeout: Duration,
    /// Devices on which creating a pipeline library fails.
    pub failing_pipeline_library_devices: Vec<DeviceIndex>,
    /// Whether the reported devices can dispatch rays.
    pub supports_ray_tracing: bool,
}

impl Default for NullBackendDescriptor {
    fn default() -> Self {
        Self {
            device_count: 1,
            queue_latency: Duration::ZERO,
            wait_timeout: Duration::from_secs(5),
            failing_pipeline_library_devices: Vec::new(),
            supports_ray_tracing: true,
        }
    }
}

impl NullBackendDescriptor {
    /// A descriptor reporting `device_count` devices.
    pub fn with_devices(device_count: usize) -> Self {
        Self {
            device_count,
            ..Self::default()
        }
    }
}

/// A device of the [`NullBackend`].
#[derive(Debug)]
pub struct NullDevice {
    index: DeviceIndex,
    name: String,
    supports_ray_tracing: bool,
    fail_pipeline_libraries: bool,
    pipeline_states_created: AtomicU64,
    srg_compiles: AtomicU64,
}

impl NullDevice {
    /// The device's index.
    pub fn index(&self) -> DeviceIndex {
        self.index
    }

    /// The adapter name reported at enumeration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many pipeline states were compiled on the device.
    pub fn pipeline_states_created(&self) -> u64 {
        self.pipeline_states_created.load(Ordering::Relaxed)
    }

    /// How many shader resource group compiles ran on the device.
    pub fn srg_compiles(&self) -> u64 {
        self.srg_compiles.load(Ordering::Relaxed)
    }
}

/// A backend that runs everything on the CPU and records what it ran.
#[derive(Debug)]
pub struct NullBackend {
    descriptor: NullBackendDescriptor,
    log: Arc<ExecutionLog>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new(NullBackendDescriptor::default())
    }
}

impl NullBackend {
    /// Creates a backend.
    pub fn new(descriptor: NullBackendDescriptor) -> Self {
        Self {
            descriptor,
            log: Arc::new(ExecutionLog::new()),
        }
    }

    /// The log shared by every queue of every device.
    pub fn execution_log(&self) -> &Arc<ExecutionLog> {
        &self.log
    }

    /// The descriptor the backend was created with.
    pub fn descriptor(&self) -> &NullBackendDescriptor {
        &self.descriptor
    }
}

impl GraphicsBackend for NullBackend {
    type Device = NullDevice;
    type Queue = NullQueue;
    type Fence = NullFence;
    type CommandList = NullCommandList;
    type PipelineLibrary = NullPipelineLibrary;
    type PipelineState = NullPipelineState;
    type ShaderResourceGroup = NullShaderResourceGroup;

    fn name(&self) -> &str {
        "null"
    }

    fn enumerate_physical_devices(&self) -> RhiResult<Vec<PhysicalDeviceDescriptor>> {
        Ok((0..self.descriptor.device_count)
            .map(|index| PhysicalDeviceDescriptor {
                name: format!("Null Device {index}"),
                vendor: "Strata".to_owned(),
                supports_ray_tracing: self.descriptor.supports_ray_tracing,
            })
            .collect())
    }

    fn create_device(
        &self,
        index: usize,
        physical_device: &PhysicalDeviceDescriptor,
    ) -> RhiResult<NullDevice> {
        if index >= self.descriptor.device_count {
            return Err(RhiError::InvalidArgument(format!(
                "null backend has no device {index}"
            )));
        }
        log::debug!("Opening null device {index} '{}'", physical_device.name);
        Ok(NullDevice {
            index,
            name: physical_device.name.clone(),
            supports_ray_tracing: physical_device.supports_ray_tracing,
            fail_pipeline_libraries: self
                .descriptor
                .failing_pipeline_library_devices
                .contains(&index),
            pipeline_states_created: AtomicU64::new(0),
            srg_compiles: AtomicU64::new(0),
        })
    }

    fn create_queue(
        &self,
        device: &NullDevice,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<NullQueue> {
        Ok(NullQueue::new(
            queue_class,
            device.index,
            self.descriptor.queue_latency,
            self.descriptor.wait_timeout,
            self.log.clone(),
        ))
    }

    fn create_fence(&self, _device: &NullDevice, initial_value: u64) -> RhiResult<NullFence> {
        Ok(NullFence::new(initial_value))
    }

    fn create_command_list(
        &self,
        _device: &NullDevice,
        queue_class: HardwareQueueClass,
    ) -> RhiResult<NullCommandList> {
        Ok(NullCommandList::new(queue_class))
    }

    fn create_pipeline_library(
        &self,
        device: &NullDevice,
        serialized_data: Option<&[u8]>,
    ) -> RhiResult<NullPipelineLibrary> {
        if device.fail_pipeline_libraries {
            log::error!("Null device {} refuses to create a pipeline library", device.index);
            return Err(RhiError::Fail(format!(
                "pipeline library creation failed on device {}",
                device.index
            )));
        }
        Ok(NullPipelineLibrary::new(serialized_data))
    }

    fn create_pipeline_state(
        &self,
        device: &NullDevice,
        descriptor: &PipelineStateDescriptor,
        library: Option<&NullPipelineLibrary>,
    ) -> RhiResult<NullPipelineState> {
        if descriptor.pipeline_type == PipelineStateType::RayTracing && !device.supports_ray_tracing {
            return Err(RhiError::InvalidArgument(format!(
                "device {} cannot compile ray tracing pipeline '{}'",
                device.index, descriptor.shader_name
            )));
        }
        let hash = descriptor.content_hash();
        if let Some(library) = library {
            library.insert(hash);
        }
        device.pipeline_states_created.fetch_add(1, Ordering::Relaxed);
        Ok(NullPipelineState::new(hash, descriptor.pipeline_type))
    }

    fn create_shader_resource_group(
        &self,
        _device: &NullDevice,
        layout: &ShaderResourceGroupLayout,
    ) -> RhiResult<NullShaderResourceGroup> {
        Ok(NullShaderResourceGroup::new(layout.name()))
    }

    fn compile_shader_resource_group(
        &self,
        device: &NullDevice,
        group: &NullShaderResourceGroup,
        data: &ShaderResourceGroupData,
    ) -> RhiResult<()> {
        group.record_compile(data.constants().len());
        device.srg_compiles.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
