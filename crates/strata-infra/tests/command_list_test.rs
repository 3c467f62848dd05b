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

//! Integration tests for command list validation on the null backend.

use std::sync::Arc;
use strata_infra::NullBackend;
use strata_rhi::command::{CommandListState, CopyItem, DispatchItem, DrawArguments, DrawItem};
use strata_rhi::pipeline::{PipelineLayoutDescriptor, PipelineState, PipelineStateDescriptor};
use strata_rhi::resource::{Buffer, BufferBindFlags, BufferDescriptor};
use strata_rhi::{HardwareQueueClass, RhiConfig, RhiContext, RhiError};

struct Fixture {
    context: RhiContext<NullBackend>,
    draw: PipelineState<NullBackend>,
    dispatch: PipelineState<NullBackend>,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let context = RhiContext::init(NullBackend::default(), RhiConfig::default()).unwrap();
    let layout = Arc::new(PipelineLayoutDescriptor::new("lists"));
    let device = context.device(0).unwrap();
    let draw =
        PipelineState::init(device, PipelineStateDescriptor::draw("mesh", layout.clone()), None)
            .unwrap();
    let dispatch =
        PipelineState::init(device, PipelineStateDescriptor::dispatch("cull", layout), None)
            .unwrap();
    Fixture {
        context,
        draw,
        dispatch,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording state
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_list_moves_from_idle_to_closed() {
    let fixture = fixture();
    let pool = fixture
        .context
        .device(0)
        .unwrap()
        .command_list_pool(HardwareQueueClass::Graphics)
        .unwrap();
    let mut list = pool.acquire().unwrap();
    assert_eq!(list.state(), CommandListState::Idle);

    list.begin("frame").unwrap();
    assert_eq!(list.state(), CommandListState::Recording);
    assert!(matches!(list.begin("again"), Err(RhiError::InvalidOperation(_))));

    list.end().unwrap();
    assert_eq!(list.state(), CommandListState::Closed);
    assert!(matches!(list.end(), Err(RhiError::InvalidOperation(_))));
    assert!(matches!(
        list.begin_debug_marker("late"),
        Err(RhiError::InvalidOperation(_))
    ));

    pool.release(list);
    assert_eq!(pool.free_count(), 1);
    let reused = pool.acquire().unwrap();
    assert_eq!(reused.state(), CommandListState::Idle);
    assert_eq!(pool.created_count(), 1);
}

#[test]
fn test_unbalanced_debug_marker_is_rejected() {
    let fixture = fixture();
    let pool = fixture
        .context
        .device(0)
        .unwrap()
        .command_list_pool(HardwareQueueClass::Copy)
        .unwrap();
    let mut list = pool.acquire().unwrap();
    list.begin("markers").unwrap();

    assert!(matches!(list.end_debug_marker(), Err(RhiError::InvalidOperation(_))));
    list.begin_debug_marker("outer").unwrap();
    list.begin_debug_marker("inner").unwrap();
    list.end_debug_marker().unwrap();
    list.end().unwrap();
    assert_eq!(list.statistics().debug_markers, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Work items
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_queue_class_limits_the_work_a_list_accepts() {
    let fixture = fixture();
    let device = fixture.context.device(0).unwrap();

    let mut compute = device
        .command_list_pool(HardwareQueueClass::Compute)
        .unwrap()
        .acquire()
        .unwrap();
    compute.begin("compute").unwrap();
    let err = compute
        .submit_draw(&DrawItem::new(DrawArguments::linear(3), &fixture.draw))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidOperation(_)));
    compute
        .submit_dispatch(&DispatchItem::new([4, 4, 1], &fixture.dispatch))
        .unwrap();

    let mut copy = device
        .command_list_pool(HardwareQueueClass::Copy)
        .unwrap()
        .acquire()
        .unwrap();
    copy.begin("copy").unwrap();
    let err = copy
        .submit_dispatch(&DispatchItem::new([1, 1, 1], &fixture.dispatch))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidOperation(_)));

    assert_eq!(compute.statistics().dispatches, 1);
    assert_eq!(compute.statistics().draws, 0);
    assert_eq!(copy.statistics().dispatches, 0);
}

#[test]
fn test_pipeline_type_must_match_the_item() {
    let fixture = fixture();
    let mut list = fixture
        .context
        .device(0)
        .unwrap()
        .command_list_pool(HardwareQueueClass::Graphics)
        .unwrap()
        .acquire()
        .unwrap();
    list.begin("mismatch").unwrap();

    let err = list
        .submit_dispatch(&DispatchItem::new([1, 1, 1], &fixture.draw))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
    let err = list
        .submit_draw(&DrawItem::new(DrawArguments::linear(3), &fixture.dispatch))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));
    let err = list
        .submit_draw(&DrawItem::new(DrawArguments::indexed(6), &fixture.draw))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));

    list.submit_draw(&DrawItem::new(DrawArguments::linear(3), &fixture.draw))
        .unwrap();
    list.submit_dispatch(&DispatchItem::new([2, 1, 1], &fixture.dispatch))
        .unwrap();
    list.end().unwrap();

    let statistics = list.statistics();
    assert_eq!(statistics.draws, 1);
    assert_eq!(statistics.dispatches, 1);
}

#[test]
fn test_copy_out_of_bounds_is_rejected() {
    let fixture = fixture();
    let mut list = fixture
        .context
        .device(0)
        .unwrap()
        .command_list_pool(HardwareQueueClass::Copy)
        .unwrap()
        .acquire()
        .unwrap();
    let flags = BufferBindFlags::COPY_READ | BufferBindFlags::COPY_WRITE;
    let source = Buffer::new("staging", BufferDescriptor::new(256, flags));
    let destination = Buffer::new("vertices", BufferDescriptor::new(128, flags));
    list.begin("upload").unwrap();

    let err = list
        .submit_copy(&CopyItem::Buffer {
            source: &source,
            source_offset: 0,
            destination: &destination,
            destination_offset: 64,
            size: 128,
        })
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidArgument(_)));

    list.submit_copy(&CopyItem::Buffer {
        source: &source,
        source_offset: 128,
        destination: &destination,
        destination_offset: 0,
        size: 128,
    })
    .unwrap();
    list.end().unwrap();
    assert_eq!(list.statistics().copies, 1);
}
