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

use super::database::FrameGraphAttachmentDatabase;
use super::scope::Scope;
use super::{AttachmentId, ScopeId};
use crate::resource::{Buffer, BufferView, Image, ImageView};
use std::sync::Arc;

/// Resolves attachment ids to the views a compiled scope declared.
///
/// Lookups never fail loudly: an id that is not registered, or that the scope
/// did not declare, yields `None`. A scope can only reach the views it declared,
/// so it cannot read an attachment it did not ask for.
#[derive(Clone, Copy)]
pub struct FrameGraphCompileContext<'a> {
    scope: &'a Scope,
    database: &'a FrameGraphAttachmentDatabase,
}

impl<'a> FrameGraphCompileContext<'a> {
    /// Creates a context over a compiled scope.
    pub fn new(scope: &'a Scope, database: &'a FrameGraphAttachmentDatabase) -> Self {
        Self { scope, database }
    }

    /// The scope the context resolves for.
    pub fn scope_id(&self) -> &'a ScopeId {
        self.scope.id()
    }

    /// Checks if `id` is registered in the frame's attachment database.
    pub fn is_attachment_valid(&self, id: &AttachmentId) -> bool {
        self.database.is_attachment_valid(id)
    }

    /// The number of views the scope declared on `id`. Mip chains and other
    /// multi-view uses address the views by index.
    pub fn get_scope_attachment_count(&self, id: &AttachmentId) -> usize {
        self.scope.attachment_uses(id).count()
    }

    /// The first buffer view the scope declared on `id`.
    pub fn get_buffer_view(&self, id: &AttachmentId) -> Option<&'a BufferView> {
        self.get_buffer_view_at(id, 0)
    }

    /// The `index`-th buffer view the scope declared on `id`.
    pub fn get_buffer_view_at(&self, id: &AttachmentId, index: usize) -> Option<&'a BufferView> {
        let scope = self.scope;
        scope
            .attachments()
            .iter()
            .filter(|attachment| attachment.attachment_id() == id)
            .nth(index)
            .and_then(|attachment| attachment.buffer_view())
    }

    /// The first image view the scope declared on `id`.
    pub fn get_image_view(&self, id: &AttachmentId) -> Option<&'a ImageView> {
        self.get_image_view_at(id, 0)
    }

    /// The `index`-th image view the scope declared on `id`.
    pub fn get_image_view_at(&self, id: &AttachmentId, index: usize) -> Option<&'a ImageView> {
        let scope = self.scope;
        scope
            .attachments()
            .iter()
            .filter(|attachment| attachment.attachment_id() == id)
            .nth(index)
            .and_then(|attachment| attachment.image_view())
    }

    /// The buffer behind `id`, if it is a registered buffer that exists.
    pub fn get_buffer(&self, id: &AttachmentId) -> Option<&'a Arc<Buffer>> {
        self.database.find_attachment(id).and_then(|attachment| attachment.buffer())
    }

    /// The image behind `id`, if it is a registered image that exists.
    pub fn get_image(&self, id: &AttachmentId) -> Option<&'a Arc<Image>> {
        self.database.find_attachment(id).and_then(|attachment| attachment.image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformLimits;
    use crate::frame_graph::interface::FrameGraphInterface;
    use crate::frame_graph::{FrameGraph, FrameGraphCompiler, ScopeAttachmentAccess, ScopeAttachmentUsage};
    use crate::queue::HardwareQueueClass;
    use crate::resource::{
        BufferBindFlags, BufferDescriptor, Format, ImageBindFlags, ImageDescriptor, ImageViewDescriptor,
    };

    #[test]
    fn views_resolve_per_declared_use() {
        let mut database = FrameGraphAttachmentDatabase::new();
        database
            .create_transient_image(
                "bloom",
                ImageDescriptor::new_2d(64, 64, Format::R16G16B16A16Float, ImageBindFlags::SHADER_READ_WRITE)
                    .with_mip_levels(3),
            )
            .unwrap();
        let constants = Buffer::new("constants", BufferDescriptor::new(256, BufferBindFlags::CONSTANT));
        database.import_buffer("constants", constants.clone()).unwrap();

        let mut graph = FrameGraph::new();
        let index = graph
            .add_scope(ScopeId::new("downsample"), HardwareQueueClass::Compute)
            .unwrap();
        {
            let mut interface = FrameGraphInterface::new(graph.scope_mut(index).unwrap(), &mut database);
            for mip in 0..3 {
                interface
                    .use_image_attachment(
                        "bloom",
                        ScopeAttachmentAccess::Write,
                        ScopeAttachmentUsage::Shader,
                        ImageViewDescriptor::mip(mip),
                    )
                    .unwrap();
            }
        }
        FrameGraphCompiler::new(PlatformLimits::default())
            .compile(&mut graph, &mut database)
            .unwrap();

        let context = FrameGraphCompileContext::new(&graph.scopes()[index], &database);
        let bloom = AttachmentId::new("bloom");
        let constants_id = AttachmentId::new("constants");
        let missing = AttachmentId::new("missing");

        assert_eq!(context.scope_id().as_str(), "downsample");
        assert_eq!(context.get_scope_attachment_count(&bloom), 3);
        assert_eq!(context.get_image_view_at(&bloom, 2).unwrap().mip_levels(), 2..3);
        assert!(context.get_image_view_at(&bloom, 3).is_none());
        assert!(context.get_buffer_view(&bloom).is_none());

        // Registered but not declared by this scope.
        assert!(context.is_attachment_valid(&constants_id));
        assert!(context.get_buffer_view(&constants_id).is_none());
        assert_eq!(context.get_buffer(&constants_id).unwrap().id(), constants.id());

        assert!(!context.is_attachment_valid(&missing));
        assert!(context.get_image_view(&missing).is_none());
        assert!(context.get_image(&missing).is_none());
        assert_eq!(context.get_scope_attachment_count(&missing), 0);
    }
}
