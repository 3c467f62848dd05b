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

//! Integration tests for objects spanning several devices: pipeline libraries,
//! the pipeline state cache, shader resource group pools and the per-device
//! pool databases.

use std::sync::Arc;
use strata_infra::{NullBackend, NullBackendDescriptor};
use strata_rhi::pipeline::{
    MultiDevicePipelineLibrary, PipelineLayoutDescriptor, PipelineLibraryDescriptor,
    PipelineState, PipelineStateCache, PipelineStateDescriptor,
};
use strata_rhi::resource::{
    BufferBindFlags, BufferDescriptor, BufferPool, BufferPoolDescriptor, ImageBindFlags,
    ImagePool, ImagePoolDescriptor,
};
use strata_rhi::srg::{
    MultiDeviceShaderResourceGroupPool, ShaderResourceGroupData, ShaderResourceGroupLayout,
    ShaderResourceGroupPoolDescriptor,
};
use strata_rhi::{DeviceMask, ObjectState, RhiConfig, RhiContext, RhiError};

fn context(descriptor: NullBackendDescriptor) -> RhiContext<NullBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    RhiContext::init(NullBackend::new(descriptor), RhiConfig::default()).unwrap()
}

fn pipeline_descriptor(shader: &str) -> PipelineStateDescriptor {
    PipelineStateDescriptor::draw(shader, Arc::new(PipelineLayoutDescriptor::new("forward")))
}

// ─────────────────────────────────────────────────────────────────────────────
// MultiDevicePipelineLibrary
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_library_init_failure_on_one_device_rolls_back_every_device() {
    let context = context(NullBackendDescriptor {
        device_count: 3,
        failing_pipeline_library_devices: vec![2],
        ..NullBackendDescriptor::default()
    });
    assert_eq!(context.device_count(), 3);

    let mut library = MultiDevicePipelineLibrary::<NullBackend>::new();
    let err = library
        .init(&context, context.all_devices_mask(), &PipelineLibraryDescriptor::default())
        .unwrap_err();
    assert!(matches!(err, RhiError::Fail(_)));
    assert_eq!(library.device_mask(), DeviceMask::NONE);
    assert_eq!(library.device_mask().bits(), 0);
    assert_eq!(library.device_library_count(), 0);
    assert_eq!(library.state(), ObjectState::Uninitialized);

    // The healthy devices alone still work.
    library
        .init(&context, DeviceMask::first(2), &PipelineLibraryDescriptor::default())
        .unwrap();
    assert_eq!(library.device_mask(), DeviceMask::first(2));
    assert_eq!(library.device_library_count(), 2);
}

#[test]
fn test_library_init_rejects_devices_the_context_lacks() {
    let context = context(NullBackendDescriptor::with_devices(2));
    let mut library = MultiDevicePipelineLibrary::<NullBackend>::new();

    let err = library
        .init(&context, DeviceMask::single(5), &PipelineLibraryDescriptor::default())
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
    let err = library
        .init(&context, DeviceMask::NONE, &PipelineLibraryDescriptor::default())
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
}

#[test]
fn test_serialized_library_seeds_a_new_one() {
    let context = context(NullBackendDescriptor::with_devices(2));
    let mask = context.all_devices_mask();
    let descriptor = pipeline_descriptor("opaque");

    let mut library = MultiDevicePipelineLibrary::<NullBackend>::new();
    library.init(&context, mask, &PipelineLibraryDescriptor::default()).unwrap();
    assert!(!library.is_merge_required());

    let _state = PipelineState::init(
        context.device(0).unwrap(),
        descriptor.clone(),
        library.device_library(0),
    )
    .unwrap();
    assert!(library.is_merge_required());

    let serialized = library.serialized_data().unwrap();
    assert_eq!(serialized.serialized_data.len(), 2);
    assert!(!library.is_merge_required());

    let mut seeded = MultiDevicePipelineLibrary::<NullBackend>::new();
    seeded.init(&context, mask, &serialized).unwrap();
    let device0 = seeded.device_library(0).unwrap().native().unwrap();
    let device1 = seeded.device_library(1).unwrap().native().unwrap();
    assert!(device0.contains(descriptor.content_hash()));
    assert!(device1.is_empty());

    library.shutdown();
    assert_eq!(library.state(), ObjectState::Shutdown);
    assert!(library
        .init(&context, mask, &PipelineLibraryDescriptor::default())
        .is_err());
}

#[test]
fn test_merge_into_copies_per_device_contents() {
    let context = context(NullBackendDescriptor::with_devices(2));
    let mask = context.all_devices_mask();
    let descriptor = pipeline_descriptor("transparent");

    let mut source = MultiDevicePipelineLibrary::<NullBackend>::new();
    source.init(&context, mask, &PipelineLibraryDescriptor::default()).unwrap();
    let mut target = MultiDevicePipelineLibrary::<NullBackend>::new();
    target.init(&context, mask, &PipelineLibraryDescriptor::default()).unwrap();

    let _state = PipelineState::init(
        context.device(1).unwrap(),
        descriptor.clone(),
        source.device_library(1),
    )
    .unwrap();

    target.merge_into(&[&source]).unwrap();
    let merged = target.device_library(1).unwrap().native().unwrap();
    assert!(merged.contains(descriptor.content_hash()));
    assert!(target.device_library(0).unwrap().native().unwrap().is_empty());
    assert!(target.is_merge_required());

    let err = target.merge_into(&[&target]).unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// PipelineStateCache
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_concurrent_acquires_compile_each_descriptor_once() {
    let context = Arc::new(context(NullBackendDescriptor::with_devices(2)));
    let cache = PipelineStateCache::new(context.clone());
    let handle = cache.create_library(&PipelineLibraryDescriptor::default()).unwrap();
    let descriptor = pipeline_descriptor("skinned");

    let states: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| cache.acquire_pipeline_state(handle, &descriptor).unwrap()))
            .collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });
    for state in &states[1..] {
        assert!(Arc::ptr_eq(state, &states[0]));
    }
    assert_eq!(states[0].device_mask(), context.all_devices_mask());
    for device in context.devices() {
        assert_eq!(device.native().pipeline_states_created(), 1);
    }

    assert_eq!(cache.pending_state_count(handle).unwrap(), 1);
    cache.compact().unwrap();
    assert_eq!(cache.pending_state_count(handle).unwrap(), 0);
    assert_eq!(cache.global_state_count(handle).unwrap(), 1);
    assert!(cache.is_merge_required(handle).unwrap());
    assert!(!cache.serialized_data(handle, 0).unwrap().is_empty());

    let again = cache.acquire_pipeline_state(handle, &descriptor).unwrap();
    assert!(Arc::ptr_eq(&again, &states[0]));

    cache.release_library(handle).unwrap();
    assert!(matches!(
        cache.acquire_pipeline_state(handle, &descriptor),
        Err(RhiError::StaleHandle(_))
    ));
    assert!(matches!(cache.release_library(handle), Err(RhiError::StaleHandle(_))));
}

#[test]
fn test_library_saved_to_disk_seeds_the_next_run() {
    let context = Arc::new(context(NullBackendDescriptor::default()));
    let descriptor = pipeline_descriptor("terrain");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipelines.bin");

    {
        let cache = PipelineStateCache::new(context.clone());
        let handle = cache.create_library(&PipelineLibraryDescriptor::default()).unwrap();
        cache.acquire_pipeline_state(handle, &descriptor).unwrap();
        cache.compact().unwrap();
        std::fs::write(&path, cache.serialized_data(handle, 0).unwrap()).unwrap();
    }

    let mut seed = PipelineLibraryDescriptor::default();
    seed.serialized_data.insert(0, std::fs::read(&path).unwrap());
    let mut library = MultiDevicePipelineLibrary::<NullBackend>::new();
    library.init(&context, context.all_devices_mask(), &seed).unwrap();
    let native = library.device_library(0).unwrap().native().unwrap();
    assert!(native.contains(descriptor.content_hash()));
    assert_eq!(native.len(), 1);
    assert!(!library.is_merge_required());
}

// ─────────────────────────────────────────────────────────────────────────────
// MultiDeviceShaderResourceGroupPool
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_srg_pool_compiles_on_every_device_during_the_frame() {
    let context = context(NullBackendDescriptor::with_devices(2));
    let layout = Arc::new(ShaderResourceGroupLayout::new("material", 1).with_constants(16));
    let mut pool = MultiDeviceShaderResourceGroupPool::<NullBackend>::new();
    pool.init(
        &context,
        context.all_devices_mask(),
        &ShaderResourceGroupPoolDescriptor {
            name: "materials".into(),
            layout: layout.clone(),
        },
    )
    .unwrap();
    assert_eq!(pool.device_pool_count(), 2);
    for device in context.devices() {
        assert_eq!(device.resource_pool_database().srg_pool_count(), 1);
        assert_eq!(device.resource_pool_database().resolver_count(), 1);
    }

    let group = pool.init_group("brick").unwrap();
    let mut data = ShaderResourceGroupData::new(layout.clone());
    data.set_constants(0, &[7u8; 16]).unwrap();
    pool.compile_group(&group, data).unwrap();

    for device in context.devices() {
        let mut scheduler = context.create_frame_scheduler(device.index()).unwrap();
        scheduler.begin_frame().unwrap();
        scheduler.compile().unwrap();
        scheduler.execute().unwrap();
        let stats = scheduler.end_frame().unwrap();
        assert_eq!(stats.scope_count, 0);
        assert_eq!(device.native().srg_compiles(), 1);
    }
    for index in 0..2 {
        let device_group = group.device_group(index).unwrap();
        assert_eq!(device_group.compile_count(), 1);
        assert_eq!(device_group.native().constant_byte_count(), 16);
        assert_eq!(device_group.data().unwrap().constants(), &[7u8; 16]);
        assert_eq!(pool.device_pool(index).unwrap().compiled_last_frame(), 1);
    }

    pool.shutdown();
    assert_eq!(pool.state(), ObjectState::Shutdown);
    for device in context.devices() {
        assert!(device.resource_pool_database().is_empty());
    }
}

#[test]
fn test_srg_data_for_another_layout_is_rejected() {
    let context = context(NullBackendDescriptor::default());
    let layout = Arc::new(ShaderResourceGroupLayout::new("view", 0).with_constants(64));
    let mut pool = MultiDeviceShaderResourceGroupPool::<NullBackend>::new();
    pool.init(
        &context,
        context.all_devices_mask(),
        &ShaderResourceGroupPoolDescriptor {
            name: "views".into(),
            layout,
        },
    )
    .unwrap();

    let group = pool.init_group("main-view").unwrap();
    let other = Arc::new(ShaderResourceGroupLayout::new("object", 2));
    let err = pool
        .compile_group(&group, ShaderResourceGroupData::new(other))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
    pool.shutdown();
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourcePoolDatabase
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_device_database_tracks_pools_through_detach() {
    let context = context(NullBackendDescriptor::default());
    let device = context.device(0).unwrap();
    let database = device.resource_pool_database();

    let buffer_pools: Vec<_> = (0..3)
        .map(|index| {
            BufferPool::init(
                database,
                BufferPoolDescriptor {
                    name: format!("buffers-{index}"),
                    bind_flags: BufferBindFlags::SHADER_READ_WRITE,
                    budget_in_bytes: 1 << 20,
                },
            )
            .unwrap()
        })
        .collect();
    let image_pools: Vec<_> = (0..2)
        .map(|index| {
            ImagePool::init(
                database,
                ImagePoolDescriptor {
                    name: format!("images-{index}"),
                    bind_flags: ImageBindFlags::COLOR | ImageBindFlags::SHADER_READ,
                    budget_in_bytes: 0,
                },
            )
            .unwrap()
        })
        .collect();
    assert_eq!(database.pool_count(), 5);
    assert_eq!(database.buffer_pool_count(), 3);
    assert_eq!(database.image_pool_count(), 2);

    let buffer = buffer_pools[1]
        .init_buffer("vertices", BufferDescriptor::new(1024, BufferBindFlags::SHADER_READ))
        .unwrap();
    buffer_pools[1].shutdown_buffer(&buffer).unwrap();
    buffer_pools[1].shutdown();

    assert_eq!(database.pool_count(), 4);
    assert_eq!(database.buffer_pool_count(), 2);
    assert_eq!(database.image_pool_count(), 2);
    assert!(!database.contains_pool(&*buffer_pools[1]));
    assert!(database.contains_pool(&*buffer_pools[0]));

    for pool in &buffer_pools {
        pool.shutdown();
    }
    for pool in &image_pools {
        pool.shutdown();
    }
    assert!(database.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// RhiContext
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_device_count_is_capped_at_the_mask_width() {
    let context = context(NullBackendDescriptor::with_devices(DeviceMask::MAX_DEVICES + 1));
    assert_eq!(context.device_count(), DeviceMask::MAX_DEVICES);
    assert_eq!(context.all_devices_mask(), DeviceMask::first(DeviceMask::MAX_DEVICES));
    context.validate_mask(context.all_devices_mask()).unwrap();
    assert!(matches!(
        context.device(DeviceMask::MAX_DEVICES),
        Err(RhiError::InvalidArgument(_))
    ));
}
