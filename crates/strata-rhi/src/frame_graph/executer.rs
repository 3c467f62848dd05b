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

//! Partitions a compiled frame graph into execute groups and runs them.

use super::database::FrameGraphAttachmentDatabase;
use super::execute_group::FrameGraphExecuteGroup;
use super::graph::FrameGraph;
use super::handler::FrameGraphExecuteGroupHandler;
use super::scope::ScopeProducer;
use crate::backend::GraphicsBackend;
use crate::config::RhiConfig;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::queue::{HardwareQueueClass, QueueFenceValues};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

struct HandlerPlan {
    queue_class: HardwareQueueClass,
    groups: Range<usize>,
}

/// Records and submits the execute groups of one frame.
pub struct FrameGraphExecuter<B: GraphicsBackend> {
    device: Arc<Device<B>>,
    parallel_recording: bool,
    merge_execute_groups: bool,
    max_scopes_per_group: usize,
    items_per_command_list: u32,
    groups: Vec<FrameGraphExecuteGroup<B>>,
    // Per group, the latest group on each other queue it waits for.
    group_producers: Vec<[Option<usize>; HardwareQueueClass::COUNT]>,
    plans: Vec<HandlerPlan>,
    handlers: Vec<FrameGraphExecuteGroupHandler<B>>,
}

impl<B: GraphicsBackend> FrameGraphExecuter<B> {
    /// Creates an executer submitting to `device`'s queues.
    pub fn new(device: Arc<Device<B>>, config: &RhiConfig) -> Self {
        Self {
            device,
            parallel_recording: config.parallel_recording,
            merge_execute_groups: config.merge_execute_groups,
            max_scopes_per_group: config.max_scopes_per_group.max(1) as usize,
            items_per_command_list: config.items_per_command_list.max(1),
            groups: Vec::new(),
            group_producers: Vec::new(),
            plans: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Partitions the compiled order of `graph` into groups and handlers.
    ///
    /// A new group starts when the queue changes, when a scope waits on another
    /// queue, when the current group is full, and around every scope large
    /// enough to be split over several command lists.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `graph` is not compiled or a queue is not running.
    pub fn begin(&mut self, graph: &FrameGraph) -> RhiResult<()> {
        self.reset();
        if !graph.is_compiled() {
            return Err(RhiError::invalid_operation("frame graph is not compiled"));
        }

        let mut group_of_scope = vec![None::<usize>; graph.scope_count()];
        let mut open_group: Option<usize> = None;
        for &index in graph.compiled_order() {
            let Some(scope) = graph.scope(index) else {
                continue;
            };
            let queue_class = scope.hardware_queue_class();
            let items = scope.estimated_item_count();

            let group_id = if items > self.items_per_command_list {
                let group_id = self.groups.len();
                let mut group = FrameGraphExecuteGroup::init_base(self.device.clone(), group_id, queue_class)?;
                group.set_split(index, items.div_ceil(self.items_per_command_list));
                self.groups.push(group);
                open_group = None;
                group_id
            } else {
                let reusable = open_group.filter(|&group_id| {
                    let group = &self.groups[group_id];
                    self.merge_execute_groups
                        && group.hardware_queue_class() == queue_class
                        && !scope.has_cross_queue_producer()
                        && group.scopes().len() < self.max_scopes_per_group
                });
                let group_id = match reusable {
                    Some(group_id) => group_id,
                    None => {
                        let group_id = self.groups.len();
                        self.groups.push(FrameGraphExecuteGroup::init_base(
                            self.device.clone(),
                            group_id,
                            queue_class,
                        )?);
                        group_id
                    }
                };
                self.groups[group_id].push_scope(index);
                open_group = Some(group_id);
                group_id
            };
            group_of_scope[index] = Some(group_id);
        }

        self.group_producers = self
            .groups
            .iter()
            .map(|group| {
                let mut producers = [None::<usize>; HardwareQueueClass::COUNT];
                for &scope in group.scopes() {
                    for queue_class in HardwareQueueClass::ALL {
                        let producer_group = graph
                            .scope(scope)
                            .and_then(|scope| scope.producer_on(queue_class))
                            .and_then(|producer| group_of_scope[producer]);
                        let slot = &mut producers[queue_class.index()];
                        if producer_group > *slot {
                            *slot = producer_group;
                        }
                    }
                }
                producers
            })
            .collect();

        for (group_id, group) in self.groups.iter().enumerate() {
            match self.plans.last_mut() {
                Some(plan) if plan.queue_class == group.hardware_queue_class() => {
                    plan.groups.end = group_id + 1;
                }
                _ => self.plans.push(HandlerPlan {
                    queue_class: group.hardware_queue_class(),
                    groups: group_id..group_id + 1,
                }),
            }
        }

        log::debug!(
            "Frame partitioned into {} group(s), {} handler(s), {} command list(s)",
            self.groups.len(),
            self.plans.len(),
            self.command_list_count()
        );
        Ok(())
    }

    /// Reserves the handlers' fence values, records every group and submits
    /// the handlers in order.
    ///
    /// If any group fails to record, every acquired list is released, every
    /// reserved fence value is signaled without work, and the first error is
    /// returned. Nothing recorded this frame reaches the GPU.
    pub fn execute(
        &mut self,
        graph: &FrameGraph,
        database: &FrameGraphAttachmentDatabase,
        producers: &[Arc<dyn ScopeProducer<B>>],
    ) -> RhiResult<()> {
        if !self.handlers.is_empty() {
            return Err(RhiError::invalid_operation("frame was already executed"));
        }

        let mut handler_of_group = vec![0usize; self.groups.len()];
        for plan in &self.plans {
            for group_id in plan.groups.clone() {
                handler_of_group[group_id] = self.handlers.len();
            }
            let handler = FrameGraphExecuteGroupHandler::init(
                self.device.clone(),
                plan.queue_class,
                plan.groups.clone(),
            );
            match handler {
                Ok(handler) => self.handlers.push(handler),
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            }
        }

        for (group_id, group) in self.groups.iter_mut().enumerate() {
            let mut waits = QueueFenceValues::NONE;
            for queue_class in HardwareQueueClass::ALL {
                if let Some(producer_group) = self.group_producers[group_id][queue_class.index()] {
                    let value = self.handlers[handler_of_group[producer_group]].signal_fence_value();
                    waits.merge_max(queue_class, value);
                }
            }
            group.set_wait_fence_values(waits);
            group.set_signal_fence_value(self.handlers[handler_of_group[group_id]].signal_fence_value());
        }

        let recorded = if self.parallel_recording && self.groups.len() > 1 {
            Self::record_parallel(&mut self.groups, graph, database, producers)
        } else {
            self.groups
                .iter_mut()
                .try_for_each(|group| group.record(graph, database, producers))
        };
        if let Err(err) = recorded {
            log::error!("Frame recording failed, aborting {} handler(s): {err}", self.handlers.len());
            self.abort();
            return Err(err);
        }

        for index in 0..self.handlers.len() {
            if let Err(err) = self.handlers[index].submit(&mut self.groups) {
                log::error!("Frame submission failed: {err}");
                self.abort();
                return Err(err);
            }
        }
        Ok(())
    }

    fn record_parallel(
        groups: &mut [FrameGraphExecuteGroup<B>],
        graph: &FrameGraph,
        database: &FrameGraphAttachmentDatabase,
        producers: &[Arc<dyn ScopeProducer<B>>],
    ) -> RhiResult<()> {
        let threads = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(groups.len())
            .max(1);
        let chunk_size = groups.len().div_ceil(threads);

        std::thread::scope(|scope| {
            let workers: Vec<_> = groups
                .chunks_mut(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter_mut()
                            .try_for_each(|group| group.record(graph, database, producers))
                    })
                })
                .collect();

            let mut first_error = Ok(());
            for worker in workers {
                let result = worker
                    .join()
                    .unwrap_or_else(|_| Err(RhiError::Fail("a recording thread panicked".to_owned())));
                if first_error.is_ok() {
                    first_error = result;
                }
            }
            first_error
        })
    }

    /// Releases every recorded list and signals every reserved fence value that
    /// was not submitted.
    pub fn abort(&mut self) {
        for handler in &mut self.handlers {
            handler.abort(&mut self.groups);
        }
        for group in &mut self.groups {
            group.release_command_lists();
        }
    }

    /// Forgets the frame's groups and handlers.
    pub fn reset(&mut self) {
        self.abort();
        self.handlers.clear();
        self.plans.clear();
        self.group_producers.clear();
        self.groups.clear();
    }

    /// Checks if every handler of the frame submitted or signaled.
    pub fn is_executed(&self) -> bool {
        !self.handlers.is_empty() && self.handlers.iter().all(FrameGraphExecuteGroupHandler::is_signaled)
    }

    /// The frame's groups, in submission order.
    pub fn groups(&self) -> &[FrameGraphExecuteGroup<B>] {
        &self.groups
    }

    /// The frame's handlers. Empty until executed.
    pub fn handlers(&self) -> &[FrameGraphExecuteGroupHandler<B>] {
        &self.handlers
    }

    /// The number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The number of submissions the frame makes.
    pub fn handler_count(&self) -> usize {
        self.plans.len()
    }

    /// The number of command lists the frame records.
    pub fn command_list_count(&self) -> usize {
        self.groups
            .iter()
            .map(|group| group.command_list_count() as usize)
            .sum()
    }
}

impl<B: GraphicsBackend> Drop for FrameGraphExecuter<B> {
    fn drop(&mut self) {
        self.abort();
    }
}
