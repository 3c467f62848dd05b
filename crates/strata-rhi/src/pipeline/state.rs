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

//! Pipeline state descriptors and compiled pipeline states.

use super::library::{MultiDevicePipelineLibrary, PipelineLibrary};
use super::PipelineLayoutDescriptor;
use crate::backend::GraphicsBackend;
use crate::context::RhiContext;
use crate::device::{
    Device, DeviceIndex, DeviceMask, LayoutArena, MultiDeviceObject, ObjectState,
    PipelineLayoutHandle,
};
use crate::error::{RhiError, RhiResult};
use crate::resource::Format;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The kind of work a pipeline state runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStateType {
    /// Rasterized draws.
    Draw,
    /// Compute dispatches.
    Dispatch,
    /// Ray dispatches.
    RayTracing,
}

/// The topology of rasterized primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent points.
    PointList,
    /// Independent lines.
    LineList,
    /// Independent triangles.
    #[default]
    TriangleList,
    /// A strip of triangles.
    TriangleStrip,
}

/// The faces discarded by the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Nothing is culled.
    #[default]
    None,
    /// Front faces are culled.
    Front,
    /// Back faces are culled.
    Back,
}

/// Fixed-function state of a draw pipeline. Ignored by other pipeline types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderStates {
    /// The primitive topology.
    pub topology: PrimitiveTopology,
    /// The cull mode.
    pub cull_mode: CullMode,
    /// Whether depth testing is enabled.
    pub depth_test_enabled: bool,
    /// Whether depth writes are enabled.
    pub depth_write_enabled: bool,
    /// Whether color blending is enabled on every target.
    pub blend_enabled: bool,
    /// The formats of the color targets.
    pub color_formats: Vec<Format>,
    /// The format of the depth-stencil target, if any.
    pub depth_stencil_format: Option<Format>,
}

/// Everything needed to compile a pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineStateDescriptor {
    /// The kind of pipeline.
    pub pipeline_type: PipelineStateType,
    /// The shader variant compiled into the pipeline.
    pub shader_name: String,
    /// The layout of the pipeline's bindings.
    pub layout: Arc<PipelineLayoutDescriptor>,
    /// Fixed-function state for draw pipelines.
    pub render_states: RenderStates,
}

impl PipelineStateDescriptor {
    /// A draw pipeline with default render states.
    pub fn draw(shader_name: impl Into<String>, layout: Arc<PipelineLayoutDescriptor>) -> Self {
        Self::new(PipelineStateType::Draw, shader_name, layout)
    }

    /// A compute pipeline.
    pub fn dispatch(shader_name: impl Into<String>, layout: Arc<PipelineLayoutDescriptor>) -> Self {
        Self::new(PipelineStateType::Dispatch, shader_name, layout)
    }

    /// A ray-tracing pipeline.
    pub fn ray_tracing(
        shader_name: impl Into<String>,
        layout: Arc<PipelineLayoutDescriptor>,
    ) -> Self {
        Self::new(PipelineStateType::RayTracing, shader_name, layout)
    }

    fn new(
        pipeline_type: PipelineStateType,
        shader_name: impl Into<String>,
        layout: Arc<PipelineLayoutDescriptor>,
    ) -> Self {
        Self {
            pipeline_type,
            shader_name: shader_name.into(),
            layout,
            render_states: RenderStates::default(),
        }
    }

    /// Replaces the render states.
    pub fn with_render_states(mut self, render_states: RenderStates) -> Self {
        self.render_states = render_states;
        self
    }

    /// A hash of the descriptor's content, stable for a given build.
    ///
    /// Backends use it to key pipeline libraries.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// A pipeline state compiled on one device.
pub struct PipelineState<B: GraphicsBackend> {
    descriptor: PipelineStateDescriptor,
    native: B::PipelineState,
    device_index: DeviceIndex,
    arena: Arc<LayoutArena>,
    layout_handle: PipelineLayoutHandle,
}

impl<B: GraphicsBackend> PipelineState<B> {
    /// Compiles a pipeline state on `device`, recording it into `library` when given.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if the library lives on another device.
    /// * `InvalidOperation` if the library is not initialized.
    /// * Any backend compile error.
    pub fn init(
        device: &Device<B>,
        descriptor: PipelineStateDescriptor,
        library: Option<&PipelineLibrary<B>>,
    ) -> RhiResult<Self> {
        device.state().ensure_initialized("device")?;
        let native_library = match library {
            Some(library) => {
                if library.device_index() != Some(device.index()) {
                    return Err(RhiError::invalid_argument(format!(
                        "pipeline library of device {:?} used on device {}",
                        library.device_index(),
                        device.index()
                    )));
                }
                Some(library.native()?)
            }
            None => None,
        };
        let native =
            device
                .backend()
                .create_pipeline_state(device.native(), &descriptor, native_library)?;
        let arena = device.layout_arena().clone();
        let layout_handle = arena.intern_pipeline_layout(descriptor.layout.clone());
        log::trace!(
            "Compiled {:?} pipeline '{}' on device {}",
            descriptor.pipeline_type,
            descriptor.shader_name,
            device.index()
        );
        Ok(Self {
            descriptor,
            native,
            device_index: device.index(),
            arena,
            layout_handle,
        })
    }

    /// The descriptor the state was compiled from.
    pub fn descriptor(&self) -> &PipelineStateDescriptor {
        &self.descriptor
    }

    /// The kind of pipeline.
    pub fn pipeline_type(&self) -> PipelineStateType {
        self.descriptor.pipeline_type
    }

    /// The native pipeline state.
    pub fn native(&self) -> &B::PipelineState {
        &self.native
    }

    /// The device the state was compiled on.
    pub fn device_index(&self) -> DeviceIndex {
        self.device_index
    }

    /// The handle of the state's layout in the device arena.
    pub fn layout_handle(&self) -> PipelineLayoutHandle {
        self.layout_handle
    }
}

impl<B: GraphicsBackend> Drop for PipelineState<B> {
    fn drop(&mut self) {
        if let Err(err) = self.arena.release_pipeline_layout(self.layout_handle) {
            log::warn!(
                "Pipeline '{}' could not release its layout: {err}",
                self.descriptor.shader_name
            );
        }
    }
}

/// A pipeline state compiled on every device of a mask.
pub struct MultiDevicePipelineState<B: GraphicsBackend> {
    descriptor: PipelineStateDescriptor,
    object: MultiDeviceObject<PipelineState<B>>,
}

impl<B: GraphicsBackend> MultiDevicePipelineState<B> {
    /// Compiles the state on every device of `mask`, or on none of them.
    pub fn init(
        context: &RhiContext<B>,
        mask: DeviceMask,
        descriptor: PipelineStateDescriptor,
        library: Option<&MultiDevicePipelineLibrary<B>>,
    ) -> RhiResult<Self> {
        context.validate_mask(mask)?;
        let mut object = MultiDeviceObject::new();
        object.init_with(mask, |index| {
            let device_library = library.and_then(|library| library.device_library(index));
            PipelineState::init(context.device(index)?, descriptor.clone(), device_library)
        })?;
        Ok(Self { descriptor, object })
    }

    /// The descriptor the state was compiled from.
    pub fn descriptor(&self) -> &PipelineStateDescriptor {
        &self.descriptor
    }

    /// The state compiled on one device.
    pub fn device_pipeline_state(&self, index: DeviceIndex) -> Option<&PipelineState<B>> {
        self.object.device_object(index)
    }

    /// The devices the state was compiled on.
    pub fn device_mask(&self) -> DeviceMask {
        self.object.device_mask()
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.object.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_follows_content() {
        let layout = Arc::new(PipelineLayoutDescriptor::new("forward"));
        let a = PipelineStateDescriptor::draw("mesh", layout.clone());
        let b = PipelineStateDescriptor::draw("mesh", Arc::new(PipelineLayoutDescriptor::new("forward")));
        let c = PipelineStateDescriptor::dispatch("mesh", layout.clone());
        let d = PipelineStateDescriptor::draw("mesh", layout).with_render_states(RenderStates {
            cull_mode: CullMode::Back,
            ..Default::default()
        });

        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
        assert_ne!(a.content_hash(), d.content_hash());
    }
}
