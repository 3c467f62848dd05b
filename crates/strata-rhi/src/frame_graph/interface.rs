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

use super::attachment::{
    AttachmentDescriptor, AttachmentType, FrameAttachment, ScopeAttachment, ScopeAttachmentAccess,
    ScopeAttachmentUsage, ScopeAttachmentViewDescriptor,
};
use super::database::FrameGraphAttachmentDatabase;
use super::scope::Scope;
use super::{AttachmentId, ScopeId};
use crate::error::{RhiError, RhiResult};
use crate::queue::HardwareQueueClass;
use crate::resource::{BufferViewDescriptor, ImageViewDescriptor};

/// What a producer sees while declaring its scope's dependencies.
pub struct FrameGraphInterface<'a> {
    scope: &'a mut Scope,
    database: &'a mut FrameGraphAttachmentDatabase,
}

impl<'a> FrameGraphInterface<'a> {
    pub(crate) fn new(scope: &'a mut Scope, database: &'a mut FrameGraphAttachmentDatabase) -> Self {
        Self { scope, database }
    }

    /// The scope being declared.
    pub fn scope_id(&self) -> &ScopeId {
        self.scope.id()
    }

    /// The frame's attachments. Producers may register transients here.
    pub fn attachment_database(&mut self) -> &mut FrameGraphAttachmentDatabase {
        self.database
    }

    fn attachment(&self, id: &AttachmentId, expected: AttachmentType) -> RhiResult<&FrameAttachment> {
        let attachment = self.database.find_attachment(id).ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "scope '{}' uses unregistered attachment '{id}'",
                self.scope.id()
            ))
        })?;
        if attachment.attachment_type() != expected {
            return Err(RhiError::invalid_argument(format!(
                "scope '{}' uses {:?} attachment '{id}' as {expected:?}",
                self.scope.id(),
                attachment.attachment_type()
            )));
        }
        Ok(attachment)
    }

    /// Declares a use of a buffer attachment.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is not registered or is not a buffer.
    pub fn use_buffer_attachment(
        &mut self,
        id: impl Into<AttachmentId>,
        access: ScopeAttachmentAccess,
        usage: ScopeAttachmentUsage,
        view: BufferViewDescriptor,
    ) -> RhiResult<()> {
        let id = id.into();
        self.attachment(&id, AttachmentType::Buffer)?;
        self.scope.push_attachment(ScopeAttachment::new(
            id,
            access,
            usage,
            ScopeAttachmentViewDescriptor::Buffer(view),
        ));
        Ok(())
    }

    /// Declares a use of an image attachment.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is not registered or is not an image.
    pub fn use_image_attachment(
        &mut self,
        id: impl Into<AttachmentId>,
        access: ScopeAttachmentAccess,
        usage: ScopeAttachmentUsage,
        view: ImageViewDescriptor,
    ) -> RhiResult<()> {
        let id = id.into();
        self.attachment(&id, AttachmentType::Image)?;
        self.scope.push_attachment(ScopeAttachment::new(
            id,
            access,
            usage,
            ScopeAttachmentViewDescriptor::Image(view),
        ));
        Ok(())
    }

    /// Declares an image written as a color target.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `id` is not a registered color image.
    /// * `InvalidOperation` if the scope does not record for the graphics queue.
    pub fn use_color_attachment(
        &mut self,
        id: impl Into<AttachmentId>,
        view: ImageViewDescriptor,
    ) -> RhiResult<()> {
        let id = id.into();
        if self.scope.hardware_queue_class() != HardwareQueueClass::Graphics {
            return Err(RhiError::invalid_operation(format!(
                "scope '{}' on the {} queue cannot bind color target '{id}'",
                self.scope.id(),
                self.scope.hardware_queue_class()
            )));
        }
        if let AttachmentDescriptor::Image(descriptor) =
            self.attachment(&id, AttachmentType::Image)?.descriptor()
        {
            if view.format.unwrap_or(descriptor.format).is_depth_stencil() {
                return Err(RhiError::invalid_argument(format!(
                    "color target '{id}' has a depth format"
                )));
            }
        }
        self.use_image_attachment(
            id,
            ScopeAttachmentAccess::Write,
            ScopeAttachmentUsage::RenderTarget,
            view,
        )
    }

    /// Declares the scope's depth-stencil target.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `id` is not a registered depth image.
    /// * `InvalidOperation` if the scope does not record for the graphics queue.
    pub fn use_depth_stencil_attachment(
        &mut self,
        id: impl Into<AttachmentId>,
        access: ScopeAttachmentAccess,
        view: ImageViewDescriptor,
    ) -> RhiResult<()> {
        let id = id.into();
        if self.scope.hardware_queue_class() != HardwareQueueClass::Graphics {
            return Err(RhiError::invalid_operation(format!(
                "scope '{}' on the {} queue cannot bind depth target '{id}'",
                self.scope.id(),
                self.scope.hardware_queue_class()
            )));
        }
        if let AttachmentDescriptor::Image(descriptor) =
            self.attachment(&id, AttachmentType::Image)?.descriptor()
        {
            if !view.format.unwrap_or(descriptor.format).is_depth_stencil() {
                return Err(RhiError::invalid_argument(format!(
                    "depth target '{id}' does not have a depth format"
                )));
            }
        }
        self.use_image_attachment(id, access, ScopeAttachmentUsage::DepthStencil, view)
    }

    /// Orders this scope after `other`.
    pub fn execute_after(&mut self, other: impl Into<ScopeId>) {
        self.scope.push_execute_after(other.into());
    }

    /// Orders this scope before `other`.
    pub fn execute_before(&mut self, other: impl Into<ScopeId>) {
        self.scope.push_execute_before(other.into());
    }

    /// Hints how many items the scope will record. Large scopes are split
    /// across several command lists.
    pub fn set_estimated_item_count(&mut self, count: u32) {
        self.scope.set_estimated_item_count(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;
    use crate::resource::{BufferBindFlags, BufferDescriptor, Format, ImageBindFlags, ImageDescriptor};

    fn database() -> FrameGraphAttachmentDatabase {
        let mut database = FrameGraphAttachmentDatabase::new();
        database
            .create_transient_buffer("lights", BufferDescriptor::new(256, BufferBindFlags::SHADER_READ))
            .unwrap();
        database
            .create_transient_image(
                "color",
                ImageDescriptor::new_2d(32, 32, Format::R8G8B8A8Unorm, ImageBindFlags::COLOR),
            )
            .unwrap();
        database
            .create_transient_image(
                "depth",
                ImageDescriptor::new_2d(32, 32, Format::D32Float, ImageBindFlags::DEPTH_STENCIL),
            )
            .unwrap();
        database
    }

    #[test]
    fn declarations_are_recorded_in_order() {
        let mut database = database();
        let mut scope = Scope::new(ScopeId::new("forward"), HardwareQueueClass::Graphics);
        let mut interface = FrameGraphInterface::new(&mut scope, &mut database);
        interface
            .use_buffer_attachment(
                "lights",
                ScopeAttachmentAccess::Read,
                ScopeAttachmentUsage::Shader,
                BufferViewDescriptor::whole(),
            )
            .unwrap();
        interface
            .use_color_attachment("color", ImageViewDescriptor::default())
            .unwrap();
        interface
            .use_depth_stencil_attachment(
                "depth",
                ScopeAttachmentAccess::ReadWrite,
                ImageViewDescriptor::default(),
            )
            .unwrap();
        interface.execute_after("shadows");
        interface.execute_after("shadows");
        interface.set_estimated_item_count(4096);

        let usages: Vec<_> = scope.attachments().iter().map(|a| a.usage()).collect();
        assert_eq!(
            usages,
            [
                ScopeAttachmentUsage::Shader,
                ScopeAttachmentUsage::RenderTarget,
                ScopeAttachmentUsage::DepthStencil
            ]
        );
        assert_eq!(scope.execute_after(), [ScopeId::new("shadows")]);
        assert_eq!(scope.estimated_item_count(), 4096);
    }

    #[test]
    fn unknown_or_mistyped_attachments_are_rejected() {
        let mut database = database();
        let mut scope = Scope::new(ScopeId::new("forward"), HardwareQueueClass::Graphics);
        let mut interface = FrameGraphInterface::new(&mut scope, &mut database);

        let err = interface
            .use_image_attachment(
                "missing",
                ScopeAttachmentAccess::Read,
                ScopeAttachmentUsage::Shader,
                ImageViewDescriptor::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);

        let err = interface
            .use_image_attachment(
                "lights",
                ScopeAttachmentAccess::Read,
                ScopeAttachmentUsage::Shader,
                ImageViewDescriptor::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);

        let err = interface
            .use_color_attachment("depth", ImageViewDescriptor::default())
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
        assert!(scope.attachments().is_empty());
    }

    #[test]
    fn render_targets_require_the_graphics_queue() {
        let mut database = database();
        let mut scope = Scope::new(ScopeId::new("blur"), HardwareQueueClass::Compute);
        let mut interface = FrameGraphInterface::new(&mut scope, &mut database);
        let err = interface
            .use_color_attachment("color", ImageViewDescriptor::default())
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidOperation);
    }
}
