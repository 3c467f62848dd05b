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

//! Frame attachments and the ways scopes use them.

use super::AttachmentId;
use crate::resource::{
    Buffer, BufferDescriptor, BufferView, BufferViewDescriptor, Image, ImageDescriptor, ImageView,
    ImageViewDescriptor,
};
use std::sync::Arc;

/// The kind of resource behind an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentType {
    /// A buffer.
    Buffer,
    /// An image.
    Image,
}

/// Where an attachment's resource comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentLifetime {
    /// Supplied by the caller and alive across frames.
    Imported,
    /// Created by the frame graph for one frame, in an aliased heap.
    Transient,
}

/// The description of an attachment's resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentDescriptor {
    /// A buffer attachment.
    Buffer(BufferDescriptor),
    /// An image attachment.
    Image(ImageDescriptor),
}

impl AttachmentDescriptor {
    /// The kind of resource described.
    pub fn attachment_type(&self) -> AttachmentType {
        match self {
            AttachmentDescriptor::Buffer(_) => AttachmentType::Buffer,
            AttachmentDescriptor::Image(_) => AttachmentType::Image,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AttachmentResource {
    Buffer(Arc<Buffer>),
    Image(Arc<Image>),
}

/// A resource registered in the frame graph for the current frame.
#[derive(Debug, Clone)]
pub struct FrameAttachment {
    id: AttachmentId,
    descriptor: AttachmentDescriptor,
    lifetime: AttachmentLifetime,
    resource: Option<AttachmentResource>,
    heap_offset: Option<u64>,
    scope_range: Option<(usize, usize)>,
}

impl FrameAttachment {
    pub(crate) fn imported_buffer(id: AttachmentId, buffer: Arc<Buffer>) -> Self {
        Self {
            id,
            descriptor: AttachmentDescriptor::Buffer(*buffer.descriptor()),
            lifetime: AttachmentLifetime::Imported,
            resource: Some(AttachmentResource::Buffer(buffer)),
            heap_offset: None,
            scope_range: None,
        }
    }

    pub(crate) fn imported_image(id: AttachmentId, image: Arc<Image>) -> Self {
        Self {
            id,
            descriptor: AttachmentDescriptor::Image(*image.descriptor()),
            lifetime: AttachmentLifetime::Imported,
            resource: Some(AttachmentResource::Image(image)),
            heap_offset: None,
            scope_range: None,
        }
    }

    pub(crate) fn transient(id: AttachmentId, descriptor: AttachmentDescriptor) -> Self {
        Self {
            id,
            descriptor,
            lifetime: AttachmentLifetime::Transient,
            resource: None,
            heap_offset: None,
            scope_range: None,
        }
    }

    /// The attachment's id.
    pub fn id(&self) -> &AttachmentId {
        &self.id
    }

    /// The resource description.
    pub fn descriptor(&self) -> &AttachmentDescriptor {
        &self.descriptor
    }

    /// The kind of resource.
    pub fn attachment_type(&self) -> AttachmentType {
        self.descriptor.attachment_type()
    }

    /// Where the resource comes from.
    pub fn lifetime(&self) -> AttachmentLifetime {
        self.lifetime
    }

    /// Checks if the frame graph owns the resource.
    pub fn is_transient(&self) -> bool {
        self.lifetime == AttachmentLifetime::Transient
    }

    /// The buffer, once it exists. Transient buffers exist after compilation.
    pub fn buffer(&self) -> Option<&Arc<Buffer>> {
        match &self.resource {
            Some(AttachmentResource::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// The image, once it exists. Transient images exist after compilation.
    pub fn image(&self) -> Option<&Arc<Image>> {
        match &self.resource {
            Some(AttachmentResource::Image(image)) => Some(image),
            _ => None,
        }
    }

    /// The offset of a transient attachment in its heap.
    pub fn heap_offset(&self) -> Option<u64> {
        self.heap_offset
    }

    /// The positions of the first and last scopes using the attachment in the
    /// compiled order. `None` until compiled, or if no scope uses it.
    pub fn scope_range(&self) -> Option<(usize, usize)> {
        self.scope_range
    }

    pub(crate) fn resource(&self) -> Option<&AttachmentResource> {
        self.resource.as_ref()
    }

    pub(crate) fn set_resource(&mut self, resource: AttachmentResource, heap_offset: u64) {
        self.resource = Some(resource);
        self.heap_offset = Some(heap_offset);
    }

    pub(crate) fn set_scope_range(&mut self, scope_range: Option<(usize, usize)>) {
        self.scope_range = scope_range;
    }

    pub(crate) fn extend_scope_range(&mut self, position: usize) {
        self.scope_range = Some(match self.scope_range {
            Some((first, last)) => (first.min(position), last.max(position)),
            None => (position, position),
        });
    }
}

/// How a scope accesses an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeAttachmentAccess {
    /// Read only.
    Read,
    /// Write only. Previous contents are discarded.
    Write,
    /// Read then write.
    ReadWrite,
}

impl ScopeAttachmentAccess {
    /// Checks if the access reads.
    pub fn is_read(self) -> bool {
        matches!(self, ScopeAttachmentAccess::Read | ScopeAttachmentAccess::ReadWrite)
    }

    /// Checks if the access writes.
    pub fn is_write(self) -> bool {
        matches!(self, ScopeAttachmentAccess::Write | ScopeAttachmentAccess::ReadWrite)
    }
}

/// The pipeline stage through which a scope uses an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeAttachmentUsage {
    /// Bound to shaders.
    Shader,
    /// Bound as a color target.
    RenderTarget,
    /// Bound as the depth-stencil target.
    DepthStencil,
    /// Used by copies.
    Copy,
    /// The target of a multisample resolve.
    Resolve,
    /// Vertex or index input.
    InputAssembly,
    /// Indirect draw or dispatch arguments.
    Indirect,
}

/// The view a scope requests on an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeAttachmentViewDescriptor {
    /// A buffer range.
    Buffer(BufferViewDescriptor),
    /// An image subresource range.
    Image(ImageViewDescriptor),
}

#[derive(Debug, Clone)]
pub(crate) enum ResolvedView {
    Buffer(BufferView),
    Image(ImageView),
}

/// One use of an attachment by a scope.
///
/// A scope may use the same attachment several times, each time with its own
/// view, e.g. once per mip of a chain.
#[derive(Debug, Clone)]
pub struct ScopeAttachment {
    attachment_id: AttachmentId,
    access: ScopeAttachmentAccess,
    usage: ScopeAttachmentUsage,
    view_descriptor: ScopeAttachmentViewDescriptor,
    view: Option<ResolvedView>,
}

impl ScopeAttachment {
    pub(crate) fn new(
        attachment_id: AttachmentId,
        access: ScopeAttachmentAccess,
        usage: ScopeAttachmentUsage,
        view_descriptor: ScopeAttachmentViewDescriptor,
    ) -> Self {
        Self {
            attachment_id,
            access,
            usage,
            view_descriptor,
            view: None,
        }
    }

    /// The attachment used.
    pub fn attachment_id(&self) -> &AttachmentId {
        &self.attachment_id
    }

    /// The access.
    pub fn access(&self) -> ScopeAttachmentAccess {
        self.access
    }

    /// The usage.
    pub fn usage(&self) -> ScopeAttachmentUsage {
        self.usage
    }

    /// The requested view.
    pub fn view_descriptor(&self) -> &ScopeAttachmentViewDescriptor {
        &self.view_descriptor
    }

    /// The resolved buffer view, after compilation.
    pub fn buffer_view(&self) -> Option<&BufferView> {
        match &self.view {
            Some(ResolvedView::Buffer(view)) => Some(view),
            _ => None,
        }
    }

    /// The resolved image view, after compilation.
    pub fn image_view(&self) -> Option<&ImageView> {
        match &self.view {
            Some(ResolvedView::Image(view)) => Some(view),
            _ => None,
        }
    }

    pub(crate) fn set_view(&mut self, view: ResolvedView) {
        self.view = Some(view);
    }
}
