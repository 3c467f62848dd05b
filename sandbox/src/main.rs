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

// Strata Sandbox
// Drives a shadow, blur and composite frame graph on the null backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use strata_infra::{NullBackend, NullBackendDescriptor, NullCommandKind};
use strata_rhi::command::{DispatchItem, DrawArguments, DrawItem};
use strata_rhi::frame_graph::{
    FrameGraphExecuteContext, FrameGraphInterface, ScopeAttachmentAccess, ScopeAttachmentUsage,
    ScopeId, ScopeProducer,
};
use strata_rhi::pipeline::{
    MultiDevicePipelineState, PipelineLayoutDescriptor, PipelineLibraryDescriptor, PipelineState,
    PipelineStateCache, PipelineStateDescriptor,
};
use strata_rhi::resource::{Format, Image, ImageBindFlags, ImageDescriptor, ImageViewDescriptor};
use strata_rhi::{
    FrameScheduler, GraphicsBackend, HardwareQueueClass, RhiConfig, RhiContext, RhiError, RhiResult,
};

const FRAMES: u64 = 6;
const SHADOW_CASTERS: u32 = 1_500;

type Pipeline = Arc<MultiDevicePipelineState<NullBackend>>;

/// The sandbox only records on the first device.
fn device_pipeline(pipeline: &Pipeline) -> RhiResult<&PipelineState<NullBackend>> {
    pipeline.device_pipeline_state(0).ok_or_else(|| {
        RhiError::InvalidOperation(format!(
            "pipeline '{}' was not compiled for device 0",
            pipeline.descriptor().shader_name
        ))
    })
}

struct ShadowPass {
    id: ScopeId,
    pipeline: Pipeline,
}

impl ScopeProducer<NullBackend> for ShadowPass {
    fn scope_id(&self) -> &ScopeId {
        &self.id
    }

    fn setup_frame_graph_dependencies(&self, interface: &mut FrameGraphInterface<'_>) -> RhiResult<()> {
        interface.use_color_attachment("shadow-map", ImageViewDescriptor::default())?;
        interface.set_estimated_item_count(SHADOW_CASTERS);
        Ok(())
    }

    fn build_command_list(&self, context: &mut FrameGraphExecuteContext<'_, NullBackend>) -> RhiResult<()> {
        let pipeline = device_pipeline(&self.pipeline)?;
        for _ in context.item_range() {
            context
                .command_list()
                .submit_draw(&DrawItem::new(DrawArguments::linear(36), pipeline))?;
        }
        Ok(())
    }
}

struct BlurPass {
    id: ScopeId,
    pipeline: Pipeline,
}

impl ScopeProducer<NullBackend> for BlurPass {
    fn scope_id(&self) -> &ScopeId {
        &self.id
    }

    fn hardware_queue_class(&self) -> HardwareQueueClass {
        HardwareQueueClass::Compute
    }

    fn setup_frame_graph_dependencies(&self, interface: &mut FrameGraphInterface<'_>) -> RhiResult<()> {
        interface.use_image_attachment(
            "shadow-map",
            ScopeAttachmentAccess::Read,
            ScopeAttachmentUsage::Shader,
            ImageViewDescriptor::default(),
        )?;
        interface.use_image_attachment(
            "blurred",
            ScopeAttachmentAccess::Write,
            ScopeAttachmentUsage::Shader,
            ImageViewDescriptor::default(),
        )
    }

    fn build_command_list(&self, context: &mut FrameGraphExecuteContext<'_, NullBackend>) -> RhiResult<()> {
        let pipeline = device_pipeline(&self.pipeline)?;
        context.command_list().begin_debug_marker("blur")?;
        context
            .command_list()
            .submit_dispatch(&DispatchItem::new([64, 64, 1], pipeline))?;
        context.command_list().end_debug_marker()
    }
}

struct CompositePass {
    id: ScopeId,
    pipeline: Pipeline,
}

impl ScopeProducer<NullBackend> for CompositePass {
    fn scope_id(&self) -> &ScopeId {
        &self.id
    }

    fn setup_frame_graph_dependencies(&self, interface: &mut FrameGraphInterface<'_>) -> RhiResult<()> {
        interface.use_image_attachment(
            "blurred",
            ScopeAttachmentAccess::Read,
            ScopeAttachmentUsage::Shader,
            ImageViewDescriptor::default(),
        )?;
        interface.use_color_attachment("backbuffer", ImageViewDescriptor::default())
    }

    fn build_command_list(&self, context: &mut FrameGraphExecuteContext<'_, NullBackend>) -> RhiResult<()> {
        let pipeline = device_pipeline(&self.pipeline)?;
        // Fullscreen triangle.
        context
            .command_list()
            .submit_draw(&DrawItem::new(DrawArguments::linear(3), pipeline))
    }
}

struct Passes {
    shadow: Arc<ShadowPass>,
    blur: Arc<BlurPass>,
    composite: Arc<CompositePass>,
}

fn run_frame(
    scheduler: &mut FrameScheduler<NullBackend>,
    backbuffer: &Arc<Image>,
    passes: &Passes,
) -> Result<()> {
    scheduler.begin_frame()?;
    {
        let database = scheduler.attachment_database_mut()?;
        database.import_image("backbuffer", backbuffer.clone())?;
        database.create_transient_image(
            "shadow-map",
            ImageDescriptor::new_2d(
                2048,
                2048,
                Format::R32Float,
                ImageBindFlags::COLOR | ImageBindFlags::SHADER_READ,
            ),
        )?;
        database.create_transient_image(
            "blurred",
            ImageDescriptor::new_2d(
                2048,
                2048,
                Format::R32Float,
                ImageBindFlags::SHADER_READ_WRITE,
            ),
        )?;
    }
    scheduler.import_scope_producer(passes.shadow.clone())?;
    scheduler.import_scope_producer(passes.blur.clone())?;
    scheduler.import_scope_producer(passes.composite.clone())?;

    scheduler.compile()?;
    scheduler.execute()?;
    let stats = scheduler.end_frame()?;
    log::info!(
        "Frame {}: {} scopes, {} groups, {} submissions, {} command lists, {} KiB transient images{}",
        stats.frame_number,
        stats.scope_count,
        stats.execute_group_count,
        stats.handler_count,
        stats.command_list_count,
        stats.transient_image_heap_bytes / 1024,
        if stats.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => RhiConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => RhiConfig {
            items_per_command_list: 512,
            ..RhiConfig::default()
        },
    };
    let backend = NullBackend::new(NullBackendDescriptor {
        queue_latency: Duration::from_millis(2),
        ..NullBackendDescriptor::default()
    });
    let context = Arc::new(RhiContext::init(backend, config)?);
    log::info!(
        "Sandbox: {} device(s) on the '{}' backend",
        context.device_count(),
        context.backend().name()
    );

    let cache = PipelineStateCache::new(context.clone());
    let library = cache.create_library(&PipelineLibraryDescriptor::default())?;
    let layout = Arc::new(PipelineLayoutDescriptor::new("sandbox"));
    let passes = Passes {
        shadow: Arc::new(ShadowPass {
            id: ScopeId::from("shadow"),
            pipeline: cache.acquire_pipeline_state(
                library,
                &PipelineStateDescriptor::draw("shadow_caster", layout.clone()),
            )?,
        }),
        blur: Arc::new(BlurPass {
            id: ScopeId::from("blur"),
            pipeline: cache.acquire_pipeline_state(
                library,
                &PipelineStateDescriptor::dispatch("gaussian_blur", layout.clone()),
            )?,
        }),
        composite: Arc::new(CompositePass {
            id: ScopeId::from("composite"),
            pipeline: cache.acquire_pipeline_state(
                library,
                &PipelineStateDescriptor::draw("composite", layout),
            )?,
        }),
    };
    cache.compact()?;

    let backbuffer = Image::new(
        "backbuffer",
        ImageDescriptor::new_2d(
            1280,
            720,
            Format::B8G8R8A8Unorm,
            ImageBindFlags::COLOR | ImageBindFlags::SHADER_READ,
        ),
    )?;

    let mut scheduler = context.create_frame_scheduler(0)?;
    for _ in 0..FRAMES {
        run_frame(&mut scheduler, &backbuffer, &passes)?;
    }
    scheduler.device().queue_context().wait_for_idle()?;

    let log = context.backend().execution_log();
    let draws = log
        .snapshot()
        .iter()
        .filter(|entry| matches!(entry.kind, NullCommandKind::Draw { .. }))
        .count();
    log::info!("Executed {} commands, {draws} draws", log.len());
    log::info!(
        "Pipeline library: {} states, {} bytes serialized",
        cache.global_state_count(library)?,
        cache.serialized_data(library, 0)?.len()
    );

    context.shutdown();
    Ok(())
}
