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

//! Integration tests for command queues running on the null backend.
//!
//! These cover the worker thread contract: FIFO per producer, inline execution
//! from the worker, fence signaling and draining on shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strata_infra::graphics::null::NullQueue;
use strata_infra::{NullBackend, NullCommandKind};
use strata_rhi::queue::{CommandQueue, CommandQueueDescriptor, ExecuteWorkRequest};
use strata_rhi::{HardwareQueueClass, ObjectState, RhiConfig, RhiContext, RhiError};

fn context() -> RhiContext<NullBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    RhiContext::init(NullBackend::default(), RhiConfig::default()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// queue_command()
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_queue_command_preserves_order_per_producer() {
    let context = context();
    let device = context.device(0).unwrap().clone();
    let order = Arc::new(Mutex::new(Vec::new()));

    std::thread::scope(|scope| {
        for producer in 0..4usize {
            let device = &device;
            let order = order.clone();
            scope.spawn(move || {
                let queue = device.command_queue(HardwareQueueClass::Compute);
                for sequence in 0..100usize {
                    let order = order.clone();
                    queue
                        .queue_command(Box::new(move |_: &NullQueue| {
                            order.lock().unwrap().push((producer, sequence));
                        }))
                        .unwrap();
                }
            });
        }
    });

    let queue = device.command_queue(HardwareQueueClass::Compute);
    queue.wait_for_idle().unwrap();

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 400);
    for producer in 0..4 {
        let sequences: Vec<usize> = order
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, s)| *s)
            .collect();
        assert_eq!(sequences, (0..100).collect::<Vec<_>>(), "producer {producer} reordered");
    }
}

#[test]
fn test_four_producers_of_250_commands_run_exactly_1000() {
    let context = context();
    let device = context.device(0).unwrap().clone();
    let executed = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let device = &device;
            let executed = executed.clone();
            scope.spawn(move || {
                let queue = device.command_queue(HardwareQueueClass::Graphics);
                for _ in 0..250 {
                    let executed = executed.clone();
                    queue
                        .queue_command(Box::new(move |_: &NullQueue| {
                            executed.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                }
            });
        }
    });

    let queue = device.command_queue(HardwareQueueClass::Graphics);
    queue.shutdown();
    assert_eq!(executed.load(Ordering::SeqCst), 1000);
    assert_eq!(queue.executed_command_count(), 1000);
    assert_eq!(queue.pending_command_count(), 0);
    assert_eq!(queue.state(), ObjectState::Shutdown);
}

#[test]
fn test_queue_command_after_shutdown_is_rejected() {
    let context = context();
    let queue = context.device(0).unwrap().command_queue(HardwareQueueClass::Copy);
    queue.shutdown();
    queue.shutdown();

    let err = queue.queue_command(Box::new(|_: &NullQueue| {})).unwrap_err();
    assert!(matches!(err, RhiError::InvalidOperation(_)));
}

#[test]
fn test_shutdown_runs_every_command_accepted_while_stopping() {
    let context = context();
    let device = context.device(0).unwrap();

    for round in 0..200 {
        let queue = CommandQueue::<NullBackend>::new(CommandQueueDescriptor::new(
            HardwareQueueClass::Compute,
        ));
        queue.init(context.backend(), device.native()).unwrap();
        let accepted = AtomicUsize::new(0);
        let executed = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let queue = &queue;
                let accepted = &accepted;
                let executed = executed.clone();
                scope.spawn(move || loop {
                    let executed = executed.clone();
                    let queued = queue.queue_command(Box::new(move |_: &NullQueue| {
                        executed.fetch_add(1, Ordering::SeqCst);
                    }));
                    match queued {
                        Ok(()) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => {
                            assert!(matches!(err, RhiError::InvalidOperation(_)));
                            break;
                        }
                    }
                });
            }
            while accepted.load(Ordering::SeqCst) < 8 {
                std::thread::yield_now();
            }
            queue.shutdown();
        });

        assert_eq!(
            executed.load(Ordering::SeqCst),
            accepted.load(Ordering::SeqCst),
            "round {round} dropped accepted commands"
        );
        assert_eq!(queue.pending_command_count(), 0);
        assert_eq!(queue.state(), ObjectState::Shutdown);
    }
}

#[test]
fn test_init_twice_is_invalid_operation() {
    let context = context();
    let device = context.device(0).unwrap();
    let queue =
        CommandQueue::<NullBackend>::new(CommandQueueDescriptor::new(HardwareQueueClass::Copy));
    assert_eq!(queue.state(), ObjectState::Uninitialized);

    queue.init(context.backend(), device.native()).unwrap();
    assert_eq!(queue.state(), ObjectState::Initialized);
    let err = queue.init(context.backend(), device.native()).unwrap_err();
    assert!(matches!(err, RhiError::InvalidOperation(_)));
    assert_eq!(queue.state(), ObjectState::Initialized);

    queue.shutdown();
    queue.shutdown();
    assert_eq!(queue.state(), ObjectState::Shutdown);
    assert!(matches!(
        queue.init(context.backend(), device.native()),
        Err(RhiError::InvalidOperation(_))
    ));
}

#[test]
fn test_command_queued_from_the_worker_runs_inline() {
    let context = context();
    let device = context.device(0).unwrap().clone();
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner_device = device.clone();
    let inner_order = order.clone();
    device
        .command_queue(HardwareQueueClass::Graphics)
        .queue_command(Box::new(move |_: &NullQueue| {
            inner_order.lock().unwrap().push("outer-start");
            let nested_order = inner_order.clone();
            inner_device
                .command_queue(HardwareQueueClass::Graphics)
                .queue_command(Box::new(move |_: &NullQueue| {
                    nested_order.lock().unwrap().push("nested");
                }))
                .unwrap();
            inner_order.lock().unwrap().push("outer-end");
        }))
        .unwrap();

    let next_order = order.clone();
    let queue = device.command_queue(HardwareQueueClass::Graphics);
    queue
        .queue_command(Box::new(move |_: &NullQueue| {
            next_order.lock().unwrap().push("next");
        }))
        .unwrap();
    queue.wait_for_idle().unwrap();

    assert_eq!(
        *order.lock().unwrap(),
        vec!["outer-start", "nested", "outer-end", "next"]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Fences and submissions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_signal_fence_reaches_the_returned_value() {
    let context = context();
    let queue = context.device(0).unwrap().command_queue(HardwareQueueClass::Compute);

    let first = queue.signal_fence().unwrap();
    let second = queue.signal_fence().unwrap();
    assert!(second > first);

    queue.wait_for_idle().unwrap();
    let fence = queue.fence().unwrap();
    assert!(fence.is_complete(second));
    assert_eq!(fence.completed_value(), second);

    let signals = context
        .backend()
        .execution_log()
        .snapshot()
        .into_iter()
        .filter(|entry| matches!(entry.kind, NullCommandKind::Signal { .. }))
        .count();
    assert_eq!(signals, 2);
}

#[test]
fn test_execute_work_runs_lists_and_recycles_them() {
    let context = context();
    let queue = context.device(0).unwrap().command_queue(HardwareQueueClass::Graphics);
    let pool = queue.command_list_pool().unwrap();
    let fence = queue.fence().unwrap();

    let mut list = pool.acquire().unwrap();
    list.begin("upload").unwrap();
    list.begin_debug_marker("upload-marker").unwrap();
    list.end().unwrap();

    let value = fence.next_value();
    queue
        .execute_work(ExecuteWorkRequest {
            command_lists: vec![list],
            signal_fence_value: value,
        })
        .unwrap();
    fence.wait_on_cpu(value).unwrap();
    queue.flush_commands();

    let log = context.backend().execution_log();
    let begin = log.marker_position("upload-marker").unwrap();
    let signal = log
        .position(|entry| entry.kind == NullCommandKind::Signal { value })
        .unwrap();
    // The list left its marker open, so ending it closed the region.
    assert_eq!(log.snapshot()[begin + 1].kind, NullCommandKind::EndMarker);
    assert!(begin < signal);

    pool.reclaim();
    assert_eq!(pool.retired_count(), 0);
    assert_eq!(pool.free_count(), 1);
    assert_eq!(pool.created_count(), 1);
}

#[test]
fn test_queue_context_end_rotates_frame_slots() {
    let config = RhiConfig {
        frame_count: 2,
        ..RhiConfig::default()
    };
    let context = RhiContext::init(NullBackend::default(), config).unwrap();
    let queue_context = context.device(0).unwrap().queue_context();

    assert_eq!(queue_context.frame_count(), 2);
    assert_eq!(queue_context.current_frame_index(), 0);
    queue_context.end().unwrap();
    assert_eq!(queue_context.current_frame_index(), 1);
    queue_context.end().unwrap();
    assert_eq!(queue_context.current_frame_index(), 0);

    queue_context.wait_for_idle().unwrap();
    for queue in queue_context.queues() {
        let fence = queue.fence().unwrap();
        assert_eq!(fence.completed_value(), fence.pending_value());
    }
}
