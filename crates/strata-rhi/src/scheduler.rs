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

//! The per-device driver of the frame loop.
//!
//! A frame goes through `begin_frame`, producer registration, `compile`,
//! `execute` and `end_frame`, in that order. A frame that failed anywhere can
//! still be ended, which releases its work and signals its fences so that the
//! next frame starts clean.

use crate::backend::GraphicsBackend;
use crate::config::RhiConfig;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::frame_graph::{
    FrameGraph, FrameGraphAttachmentDatabase, FrameGraphCompileContext, FrameGraphCompiler,
    FrameGraphExecuter, FrameGraphInterface, ScopeProducer,
};
use std::sync::Arc;

/// Where the scheduler stands in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePhase {
    /// Between frames.
    Idle,
    /// Accepting attachments and producers.
    Building,
    /// Compiled and partitioned, ready to execute.
    Compiled,
    /// Submitted.
    Executed,
    /// A step failed. Only `end_frame` is accepted.
    Failed,
}

/// A summary of one frame, returned by [`FrameScheduler::end_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatistics {
    /// The frame's number, starting at 1.
    pub frame_number: u64,
    /// Scopes in the frame graph.
    pub scope_count: usize,
    /// Execute groups the scopes were partitioned into.
    pub execute_group_count: usize,
    /// Queue submissions.
    pub handler_count: usize,
    /// Command lists recorded.
    pub command_list_count: usize,
    /// Bytes of the transient buffer heap.
    pub transient_buffer_heap_bytes: u64,
    /// Bytes of the transient image heap.
    pub transient_image_heap_bytes: u64,
    /// Whether the frame's work was discarded instead of submitted.
    pub aborted: bool,
}

/// Builds, compiles and runs the frame graph of one device.
pub struct FrameScheduler<B: GraphicsBackend> {
    device: Arc<Device<B>>,
    graph: FrameGraph,
    database: FrameGraphAttachmentDatabase,
    producers: Vec<Arc<dyn ScopeProducer<B>>>,
    compiler: FrameGraphCompiler,
    executer: FrameGraphExecuter<B>,
    phase: FramePhase,
    frame_number: u64,
}

impl<B: GraphicsBackend> FrameScheduler<B> {
    /// Creates a scheduler for `device`.
    pub fn new(device: Arc<Device<B>>, config: &RhiConfig) -> Self {
        Self {
            compiler: FrameGraphCompiler::new(*device.platform_limits()),
            executer: FrameGraphExecuter::new(device.clone(), config),
            device,
            graph: FrameGraph::new(),
            database: FrameGraphAttachmentDatabase::new(),
            producers: Vec::new(),
            phase: FramePhase::Idle,
            frame_number: 0,
        }
    }

    fn expect_phase(&self, expected: FramePhase, operation: &str) -> RhiResult<()> {
        if self.phase != expected {
            return Err(RhiError::invalid_operation(format!(
                "cannot {operation} while the frame is {:?} (expected {expected:?})",
                self.phase
            )));
        }
        Ok(())
    }

    /// Starts a new frame with an empty graph.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` unless the previous frame was ended.
    pub fn begin_frame(&mut self) -> RhiResult<()> {
        self.expect_phase(FramePhase::Idle, "begin a frame")?;
        self.device.state().ensure_initialized("device")?;
        self.graph.clear();
        self.database.clear();
        self.producers.clear();
        self.frame_number += 1;
        self.phase = FramePhase::Building;
        log::trace!("Frame {} begins on device {}", self.frame_number, self.device.index());
        Ok(())
    }

    /// The frame's attachments, for importing resources and declaring
    /// transients.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` outside of the building phase.
    pub fn attachment_database_mut(&mut self) -> RhiResult<&mut FrameGraphAttachmentDatabase> {
        self.expect_phase(FramePhase::Building, "edit attachments")?;
        Ok(&mut self.database)
    }

    /// Adds a producer and its scope to the frame.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` outside of the building phase.
    /// * `InvalidArgument` if another producer already fills the same scope.
    pub fn import_scope_producer(&mut self, producer: Arc<dyn ScopeProducer<B>>) -> RhiResult<()> {
        self.expect_phase(FramePhase::Building, "import a scope producer")?;
        self.graph
            .add_scope(producer.scope_id().clone(), producer.hardware_queue_class())?;
        self.producers.push(producer);
        Ok(())
    }

    /// Collects the producers' dependencies, compiles the graph, compiles the
    /// device's pools, lets producers update their resources, then partitions
    /// the frame into execute groups.
    ///
    /// On error the frame is marked failed and must be ended.
    pub fn compile(&mut self) -> RhiResult<()> {
        self.expect_phase(FramePhase::Building, "compile")?;
        match self.compile_frame() {
            Ok(()) => {
                self.phase = FramePhase::Compiled;
                Ok(())
            }
            Err(err) => {
                log::error!("Frame {} failed to compile: {err}", self.frame_number);
                self.phase = FramePhase::Failed;
                Err(err)
            }
        }
    }

    fn compile_frame(&mut self) -> RhiResult<()> {
        for (index, producer) in self.producers.iter().enumerate() {
            let scope = self.graph.scope_mut(index).ok_or_else(|| {
                RhiError::invalid_operation(format!("producer {index} has no scope"))
            })?;
            let mut interface = FrameGraphInterface::new(scope, &mut self.database);
            producer.setup_frame_graph_dependencies(&mut interface)?;
        }

        self.compiler.compile(&mut self.graph, &mut self.database)?;

        for resolver in self.device.resource_pool_database().resolvers() {
            resolver.compile()?;
        }

        for &index in self.graph.compiled_order() {
            if let (Some(scope), Some(producer)) = (self.graph.scope(index), self.producers.get(index)) {
                producer.compile_resources(&FrameGraphCompileContext::new(scope, &self.database))?;
            }
        }

        self.executer.begin(&self.graph)
    }

    /// Records and submits the compiled frame.
    ///
    /// On error nothing was submitted; the frame is marked failed and must be
    /// ended.
    pub fn execute(&mut self) -> RhiResult<()> {
        self.expect_phase(FramePhase::Compiled, "execute")?;
        match self
            .executer
            .execute(&self.graph, &self.database, &self.producers)
        {
            Ok(()) => {
                self.phase = FramePhase::Executed;
                Ok(())
            }
            Err(err) => {
                self.phase = FramePhase::Failed;
                Err(err)
            }
        }
    }

    /// Closes the frame.
    ///
    /// Unsubmitted work is discarded, the queue context advances its frame
    /// fencing and the device's pools are told the frame ended. The scheduler
    /// returns to idle even when this fails.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if no frame is in progress.
    /// * `NotReady` if waiting on an older frame's fences timed out.
    pub fn end_frame(&mut self) -> RhiResult<FrameStatistics> {
        if self.phase == FramePhase::Idle {
            return Err(RhiError::invalid_operation("cannot end a frame that was not begun"));
        }
        let aborted = self.phase != FramePhase::Executed;
        if aborted {
            log::warn!(
                "Frame {} ended in phase {:?}, its work is discarded",
                self.frame_number,
                self.phase
            );
            self.executer.abort();
        }

        let transients = self.compiler.transient_statistics();
        let statistics = FrameStatistics {
            frame_number: self.frame_number,
            scope_count: self.graph.scope_count(),
            execute_group_count: self.executer.group_count(),
            handler_count: self.executer.handler_count(),
            command_list_count: self.executer.command_list_count(),
            transient_buffer_heap_bytes: transients.buffer_heap_size_in_bytes,
            transient_image_heap_bytes: transients.image_heap_size_in_bytes,
            aborted,
        };

        let fenced = self.device.queue_context().end();
        for resolver in self.device.resource_pool_database().resolvers() {
            resolver.on_frame_end();
        }
        self.executer.reset();
        self.producers.clear();
        self.graph.clear();
        self.database.clear();
        self.phase = FramePhase::Idle;

        fenced?;
        log::trace!("Frame {} ended: {statistics:?}", self.frame_number);
        Ok(statistics)
    }

    /// The current phase.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// The number of the current or last frame. Zero before the first frame.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The frame graph. Compiled once [`compile`](Self::compile) succeeded.
    pub fn frame_graph(&self) -> &FrameGraph {
        &self.graph
    }

    /// The frame's attachments.
    pub fn attachment_database(&self) -> &FrameGraphAttachmentDatabase {
        &self.database
    }

    /// The frame's execute groups, once compiled.
    pub fn executer(&self) -> &FrameGraphExecuter<B> {
        &self.executer
    }

    /// The device the scheduler drives.
    pub fn device(&self) -> &Arc<Device<B>> {
        &self.device
    }
}
