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

//! Pipeline libraries: caches of compiled pipeline states that can be merged
//! and serialized to speed up later compiles.

use crate::backend::{GraphicsBackend, NativePipelineLibrary};
use crate::context::RhiContext;
use crate::device::{Device, DeviceIndex, DeviceMask, MultiDeviceObject, ObjectState};
use crate::error::{RhiError, RhiResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized library contents, per device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineLibraryDescriptor {
    /// The data that seeds each device's library. Devices without an entry
    /// start empty.
    pub serialized_data: BTreeMap<DeviceIndex, Vec<u8>>,
}

/// A pipeline library on one device.
pub struct PipelineLibrary<B: GraphicsBackend> {
    state: ObjectState,
    device_index: Option<DeviceIndex>,
    native: Option<B::PipelineLibrary>,
}

impl<B: GraphicsBackend> Default for PipelineLibrary<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend> PipelineLibrary<B> {
    /// Creates an uninitialized library.
    pub fn new() -> Self {
        Self {
            state: ObjectState::Uninitialized,
            device_index: None,
            native: None,
        }
    }

    /// Creates the native library, seeded with `serialized_data` when given.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the library was already initialized.
    /// * Any backend error, typically for unreadable serialized data.
    pub fn init(&mut self, device: &Device<B>, serialized_data: Option<&[u8]>) -> RhiResult<()> {
        self.state.ensure_can_init("pipeline library")?;
        device.state().ensure_initialized("device")?;
        let native = device
            .backend()
            .create_pipeline_library(device.native(), serialized_data)?;
        self.native = Some(native);
        self.device_index = Some(device.index());
        self.state = ObjectState::Initialized;
        log::debug!(
            "Pipeline library initialized on device {} ({} seed bytes)",
            device.index(),
            serialized_data.map_or(0, <[u8]>::len)
        );
        Ok(())
    }

    /// Merges other libraries of the same device into this one.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if this library or a source is not initialized.
    /// * `InvalidArgument` if a source is this library or lives on another device.
    pub fn merge_into(&self, sources: &[&PipelineLibrary<B>]) -> RhiResult<()> {
        let native = self.native()?;
        let mut natives = Vec::with_capacity(sources.len());
        for source in sources {
            if std::ptr::eq(*source, self) {
                return Err(RhiError::invalid_argument(
                    "a pipeline library cannot be merged into itself",
                ));
            }
            if source.device_index != self.device_index {
                return Err(RhiError::invalid_argument(format!(
                    "cannot merge a library of device {:?} into one of device {:?}",
                    source.device_index, self.device_index
                )));
            }
            natives.push(source.native()?);
        }
        native.merge_from(&natives)
    }

    /// Checks if the library holds state that was not serialized yet.
    pub fn is_merge_required(&self) -> bool {
        self.native.as_ref().is_some_and(|native| native.is_merge_required())
    }

    /// Serializes the library.
    pub fn serialized_data(&self) -> RhiResult<Vec<u8>> {
        self.native()?.serialized_data()
    }

    /// Releases the native library.
    pub fn shutdown(&mut self) {
        self.native = None;
        self.state = ObjectState::Shutdown;
    }

    /// The native library.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` unless the library is initialized.
    pub fn native(&self) -> RhiResult<&B::PipelineLibrary> {
        self.state.ensure_initialized("pipeline library")?;
        self.native
            .as_ref()
            .ok_or_else(|| RhiError::invalid_operation("pipeline library has no native object"))
    }

    /// The device the library lives on, once initialized.
    pub fn device_index(&self) -> Option<DeviceIndex> {
        self.device_index
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.state
    }
}

/// A pipeline library on every device of a mask.
pub struct MultiDevicePipelineLibrary<B: GraphicsBackend> {
    object: MultiDeviceObject<PipelineLibrary<B>>,
}

impl<B: GraphicsBackend> Default for MultiDevicePipelineLibrary<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend> MultiDevicePipelineLibrary<B> {
    /// Creates an uninitialized library.
    pub fn new() -> Self {
        Self {
            object: MultiDeviceObject::new(),
        }
    }

    /// Creates one device library per device of `mask`.
    ///
    /// Succeeds on every device or on none: libraries created before a failure
    /// are shut down, and the mask stays empty.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the library was already initialized.
    /// * `InvalidArgument` if `mask` is empty or names a device the context lacks.
    /// * The first device error.
    pub fn init(
        &mut self,
        context: &RhiContext<B>,
        mask: DeviceMask,
        descriptor: &PipelineLibraryDescriptor,
    ) -> RhiResult<()> {
        context.validate_mask(mask)?;
        self.object.init_with_rollback(
            mask,
            |index| {
                let mut library = PipelineLibrary::new();
                library.init(
                    context.device(index)?,
                    descriptor.serialized_data.get(&index).map(Vec::as_slice),
                )?;
                Ok(library)
            },
            |_, mut library| library.shutdown(),
        )
    }

    /// Merges other multi-device libraries into this one, device by device.
    ///
    /// A source only contributes to the devices both libraries span.
    pub fn merge_into(&self, sources: &[&MultiDevicePipelineLibrary<B>]) -> RhiResult<()> {
        self.object
            .state()
            .ensure_initialized("multi-device pipeline library")?;
        if sources.iter().any(|source| std::ptr::eq(*source, self)) {
            return Err(RhiError::invalid_argument(
                "a pipeline library cannot be merged into itself",
            ));
        }
        for source in sources {
            source
                .object
                .state()
                .ensure_initialized("merged pipeline library")?;
        }
        for (index, library) in self.object.device_objects() {
            let device_sources: Vec<&PipelineLibrary<B>> = sources
                .iter()
                .filter_map(|source| source.device_library(index))
                .collect();
            if !device_sources.is_empty() {
                library.merge_into(&device_sources)?;
            }
        }
        Ok(())
    }

    /// Checks if any device library holds unserialized state.
    pub fn is_merge_required(&self) -> bool {
        self.object
            .device_objects()
            .any(|(_, library)| library.is_merge_required())
    }

    /// Serializes every device library.
    ///
    /// The result can seed a later [`init`](Self::init).
    pub fn serialized_data(&self) -> RhiResult<PipelineLibraryDescriptor> {
        let serialized_data = self
            .object
            .device_objects()
            .map(|(index, library)| Ok((index, library.serialized_data()?)))
            .collect::<RhiResult<_>>()?;
        Ok(PipelineLibraryDescriptor { serialized_data })
    }

    /// Shuts down every device library.
    pub fn shutdown(&mut self) {
        self.object.shutdown_with(|_, mut library| library.shutdown());
    }

    /// The library of one device.
    pub fn device_library(&self, index: DeviceIndex) -> Option<&PipelineLibrary<B>> {
        self.object.device_object(index)
    }

    /// The number of device libraries.
    pub fn device_library_count(&self) -> usize {
        self.object.device_object_count()
    }

    /// The devices the library spans.
    pub fn device_mask(&self) -> DeviceMask {
        self.object.device_mask()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.object.state()
    }
}
