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

//! Turns a declared frame graph into an executable one.
//!
//! Compilation derives the dependency edges, orders the scopes, places the
//! transient attachments, resolves every declared view and finally records, for
//! each scope, the scopes on other queues it has to wait for.

use super::attachment::{
    AttachmentDescriptor, AttachmentResource, ResolvedView, ScopeAttachmentViewDescriptor,
};
use super::database::FrameGraphAttachmentDatabase;
use super::graph::FrameGraph;
use super::AttachmentId;
use crate::config::PlatformLimits;
use crate::error::{RhiError, RhiResult};
use crate::graph::topological_sort;
use crate::queue::HardwareQueueClass;
use crate::resource::{
    Buffer, BufferView, Image, ImageView, TransientAllocationRequest, TransientAttachmentPool,
    TransientAttachmentStatistics, TransientHeapKind,
};
use std::collections::{BTreeSet, HashMap};

/// Compiles frame graphs and owns the heaps of their transient attachments.
pub struct FrameGraphCompiler {
    transient_pool: TransientAttachmentPool,
}

#[derive(Default)]
struct HazardTracker {
    last_writer: Option<usize>,
    readers: Vec<usize>,
}

impl FrameGraphCompiler {
    /// Creates a compiler placing transients under `limits`.
    pub fn new(limits: PlatformLimits) -> Self {
        Self {
            transient_pool: TransientAttachmentPool::new(limits),
        }
    }

    /// The transient heap statistics of the last compilation.
    pub fn transient_statistics(&self) -> TransientAttachmentStatistics {
        self.transient_pool.statistics()
    }

    /// Compiles `graph` against the attachments of `database`.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if a scope orders itself against an unknown scope.
    /// * `InvalidOperation` if a scope reads a transient attachment no earlier
    ///   scope writes, or if the ordering constraints form a cycle.
    /// * `OutOfMemory` if a transient heap exceeds its fixed budget.
    pub fn compile(
        &self,
        graph: &mut FrameGraph,
        database: &mut FrameGraphAttachmentDatabase,
    ) -> RhiResult<()> {
        self.transient_pool.begin_frame();
        let edges = Self::build_edges(graph, database)?;

        let order = topological_sort(0..graph.scope_count(), edges.iter().copied()).map_err(|cycle| {
            let names: Vec<String> = cycle
                .unresolved
                .iter()
                .filter_map(|&index| graph.scope(index).map(|scope| scope.id().to_string()))
                .collect();
            RhiError::invalid_operation(format!(
                "frame graph has a dependency cycle through scopes {names:?}"
            ))
        })?;
        let mut positions = vec![0usize; order.len()];
        for (position, &index) in order.iter().enumerate() {
            positions[index] = position;
        }

        Self::compute_lifetimes(graph, database, &order);
        self.allocate_transients(database)?;
        Self::resolve_views(graph, database)?;
        Self::assign_producers(graph, &edges, &positions);

        log::debug!(
            "Compiled frame graph: {} scope(s), {} edge(s), order {:?}",
            graph.scope_count(),
            edges.len(),
            order
                .iter()
                .filter_map(|&index| graph.scope(index).map(|scope| scope.id().as_str()))
                .collect::<Vec<_>>()
        );
        graph.set_compiled_order(order);
        Ok(())
    }

    fn build_edges(
        graph: &FrameGraph,
        database: &FrameGraphAttachmentDatabase,
    ) -> RhiResult<BTreeSet<(usize, usize)>> {
        let mut edges = BTreeSet::new();
        let resolve = |from: usize, other: &super::ScopeId| {
            graph.find_scope(other).ok_or_else(|| {
                RhiError::invalid_argument(format!(
                    "scope '{}' is ordered against unknown scope '{other}'",
                    graph.scopes()[from].id()
                ))
            })
        };

        for (index, scope) in graph.scopes().iter().enumerate() {
            for after in scope.execute_after() {
                edges.insert((resolve(index, after)?, index));
            }
            for before in scope.execute_before() {
                edges.insert((index, resolve(index, before)?));
            }
        }

        let mut trackers: HashMap<&AttachmentId, HazardTracker> = HashMap::new();
        for (index, scope) in graph.scopes().iter().enumerate() {
            // One combined access per attachment, in first-use order.
            let mut accesses: Vec<(&AttachmentId, bool, bool)> = Vec::new();
            for attachment in scope.attachments() {
                let (reads, writes) = (attachment.access().is_read(), attachment.access().is_write());
                match accesses
                    .iter_mut()
                    .find(|(id, _, _)| *id == attachment.attachment_id())
                {
                    Some(entry) => {
                        entry.1 |= reads;
                        entry.2 |= writes;
                    }
                    None => accesses.push((attachment.attachment_id(), reads, writes)),
                }
            }

            for (id, reads, writes) in accesses {
                let tracker = trackers.entry(id).or_default();
                if reads {
                    match tracker.last_writer {
                        Some(writer) => {
                            edges.insert((writer, index));
                        }
                        None if !writes
                            && database
                                .find_attachment(id)
                                .is_some_and(|attachment| attachment.is_transient()) =>
                        {
                            return Err(RhiError::invalid_operation(format!(
                                "scope '{}' reads transient attachment '{id}' before any scope writes it",
                                scope.id()
                            )));
                        }
                        None => {}
                    }
                }
                if writes {
                    if let Some(writer) = tracker.last_writer {
                        edges.insert((writer, index));
                    }
                    for &reader in &tracker.readers {
                        edges.insert((reader, index));
                    }
                    tracker.last_writer = Some(index);
                    tracker.readers.clear();
                } else {
                    tracker.readers.push(index);
                }
            }
        }
        Ok(edges)
    }

    fn compute_lifetimes(
        graph: &FrameGraph,
        database: &mut FrameGraphAttachmentDatabase,
        order: &[usize],
    ) {
        for attachment in database.attachments_mut() {
            attachment.set_scope_range(None);
        }
        for (position, &index) in order.iter().enumerate() {
            for attachment in graph.scopes()[index].attachments() {
                if let Some(frame_attachment) = database.find_attachment_mut(attachment.attachment_id()) {
                    frame_attachment.extend_scope_range(position);
                }
            }
        }
    }

    fn allocate_transients(&self, database: &mut FrameGraphAttachmentDatabase) -> RhiResult<()> {
        let mut buffers = Vec::new();
        let mut images = Vec::new();
        for attachment in database.attachments().filter(|a| a.is_transient()) {
            let Some((first_scope, last_scope)) = attachment.scope_range() else {
                log::debug!("Transient attachment '{}' is unused this frame", attachment.id());
                continue;
            };
            let (size_in_bytes, list) = match attachment.descriptor() {
                AttachmentDescriptor::Buffer(descriptor) => (descriptor.byte_count, &mut buffers),
                AttachmentDescriptor::Image(descriptor) => (descriptor.byte_size(), &mut images),
            };
            list.push((
                attachment.id().clone(),
                *attachment.descriptor(),
                TransientAllocationRequest {
                    size_in_bytes,
                    first_scope,
                    last_scope,
                },
            ));
        }

        for (kind, transients) in [
            (TransientHeapKind::Buffer, buffers),
            (TransientHeapKind::Image, images),
        ] {
            if transients.is_empty() {
                continue;
            }
            let requests: Vec<TransientAllocationRequest> =
                transients.iter().map(|(_, _, request)| *request).collect();
            let placement = self.transient_pool.allocate(kind, &requests)?;
            for ((id, descriptor, _), offset) in transients.into_iter().zip(placement.offsets) {
                let resource = match descriptor {
                    AttachmentDescriptor::Buffer(descriptor) => {
                        AttachmentResource::Buffer(Buffer::new(id.as_str(), descriptor))
                    }
                    AttachmentDescriptor::Image(descriptor) => {
                        AttachmentResource::Image(Image::new(id.as_str(), descriptor)?)
                    }
                };
                if let Some(attachment) = database.find_attachment_mut(&id) {
                    attachment.set_resource(resource, offset);
                }
            }
            log::trace!(
                "Transient {kind:?} heap: {} byte(s), {} reserved",
                placement.heap_size_in_bytes,
                placement.reserved_in_bytes
            );
        }
        Ok(())
    }

    fn resolve_views(graph: &mut FrameGraph, database: &FrameGraphAttachmentDatabase) -> RhiResult<()> {
        for scope in graph.scopes_mut() {
            let scope_id = scope.id().clone();
            for attachment in scope.attachments_mut() {
                let resource = database
                    .find_attachment(attachment.attachment_id())
                    .and_then(|frame_attachment| frame_attachment.resource())
                    .ok_or_else(|| {
                        RhiError::invalid_operation(format!(
                            "attachment '{}' used by scope '{scope_id}' has no resource",
                            attachment.attachment_id()
                        ))
                    })?;
                let view = match (resource, *attachment.view_descriptor()) {
                    (AttachmentResource::Buffer(buffer), ScopeAttachmentViewDescriptor::Buffer(descriptor)) => {
                        ResolvedView::Buffer(BufferView::new(buffer.clone(), descriptor)?)
                    }
                    (AttachmentResource::Image(image), ScopeAttachmentViewDescriptor::Image(descriptor)) => {
                        ResolvedView::Image(ImageView::new(image.clone(), descriptor)?)
                    }
                    _ => {
                        return Err(RhiError::invalid_argument(format!(
                            "scope '{scope_id}' requests a view of the wrong kind on '{}'",
                            attachment.attachment_id()
                        )))
                    }
                };
                attachment.set_view(view);
            }
        }
        Ok(())
    }

    fn assign_producers(graph: &mut FrameGraph, edges: &BTreeSet<(usize, usize)>, positions: &[usize]) {
        let mut producers = vec![[None::<usize>; HardwareQueueClass::COUNT]; graph.scope_count()];
        for &(parent, child) in edges {
            let parent_class = graph.scopes()[parent].hardware_queue_class();
            if parent_class == graph.scopes()[child].hardware_queue_class() {
                continue;
            }
            let slot = &mut producers[child][parent_class.index()];
            if slot.map_or(true, |current| positions[parent] > positions[current]) {
                *slot = Some(parent);
            }
        }
        for (scope, producers) in graph.scopes_mut().iter_mut().zip(producers) {
            scope.set_producers(producers);
        }
    }
}
