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

use super::attachment::{AttachmentDescriptor, FrameAttachment};
use super::AttachmentId;
use crate::error::{RhiError, RhiResult};
use crate::resource::{Buffer, BufferDescriptor, Image, ImageDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Every attachment registered for the current frame.
///
/// Attachments keep their registration order, which the compiler relies on for
/// deterministic transient placement.
#[derive(Debug, Default)]
pub struct FrameGraphAttachmentDatabase {
    attachments: Vec<FrameAttachment>,
    lookup: HashMap<AttachmentId, usize>,
}

impl FrameGraphAttachmentDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, attachment: FrameAttachment) -> RhiResult<()> {
        if self.lookup.contains_key(attachment.id()) {
            return Err(RhiError::invalid_argument(format!(
                "attachment '{}' is already registered this frame",
                attachment.id()
            )));
        }
        self.lookup
            .insert(attachment.id().clone(), self.attachments.len());
        self.attachments.push(attachment);
        Ok(())
    }

    /// Registers a caller-owned buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is already registered.
    pub fn import_buffer(&mut self, id: impl Into<AttachmentId>, buffer: Arc<Buffer>) -> RhiResult<()> {
        self.register(FrameAttachment::imported_buffer(id.into(), buffer))
    }

    /// Registers a caller-owned image.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is already registered.
    pub fn import_image(&mut self, id: impl Into<AttachmentId>, image: Arc<Image>) -> RhiResult<()> {
        self.register(FrameAttachment::imported_image(id.into(), image))
    }

    /// Registers a buffer the frame graph creates at compile time.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is already registered or the buffer is empty.
    pub fn create_transient_buffer(
        &mut self,
        id: impl Into<AttachmentId>,
        descriptor: BufferDescriptor,
    ) -> RhiResult<()> {
        let id = id.into();
        if descriptor.byte_count == 0 {
            return Err(RhiError::invalid_argument(format!(
                "transient buffer '{id}' has no bytes"
            )));
        }
        self.register(FrameAttachment::transient(
            id,
            AttachmentDescriptor::Buffer(descriptor),
        ))
    }

    /// Registers an image the frame graph creates at compile time.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is already registered or the descriptor is invalid.
    pub fn create_transient_image(
        &mut self,
        id: impl Into<AttachmentId>,
        descriptor: ImageDescriptor,
    ) -> RhiResult<()> {
        descriptor.validate()?;
        self.register(FrameAttachment::transient(
            id.into(),
            AttachmentDescriptor::Image(descriptor),
        ))
    }

    /// Checks if `id` is registered.
    pub fn is_attachment_valid(&self, id: &AttachmentId) -> bool {
        self.lookup.contains_key(id)
    }

    /// Looks up an attachment.
    pub fn find_attachment(&self, id: &AttachmentId) -> Option<&FrameAttachment> {
        self.lookup.get(id).map(|&index| &self.attachments[index])
    }

    pub(crate) fn find_attachment_mut(&mut self, id: &AttachmentId) -> Option<&mut FrameAttachment> {
        match self.lookup.get(id) {
            Some(&index) => self.attachments.get_mut(index),
            None => None,
        }
    }

    pub(crate) fn attachments_mut(&mut self) -> impl Iterator<Item = &mut FrameAttachment> {
        self.attachments.iter_mut()
    }

    /// Iterates attachments in registration order.
    pub fn attachments(&self) -> impl Iterator<Item = &FrameAttachment> {
        self.attachments.iter()
    }

    /// The number of registered attachments.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Forgets every attachment. Transient resources are released with them.
    pub fn clear(&mut self) {
        self.attachments.clear();
        self.lookup.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;
    use crate::frame_graph::AttachmentLifetime;
    use crate::resource::{BufferBindFlags, Format, ImageBindFlags};

    #[test]
    fn registration_and_lookup() {
        let mut database = FrameGraphAttachmentDatabase::new();
        let buffer = Buffer::new(
            "instances",
            BufferDescriptor::new(1024, BufferBindFlags::SHADER_READ),
        );
        database.import_buffer("instances", buffer.clone()).unwrap();
        database
            .create_transient_image(
                "hdr",
                ImageDescriptor::new_2d(64, 64, Format::R16G16B16A16Float, ImageBindFlags::COLOR),
            )
            .unwrap();

        let instances = AttachmentId::new("instances");
        let hdr = AttachmentId::new("hdr");
        assert!(database.is_attachment_valid(&instances));
        assert!(database.is_attachment_valid(&hdr));
        assert!(!database.is_attachment_valid(&AttachmentId::new("missing")));
        assert_eq!(
            database.find_attachment(&instances).unwrap().buffer().unwrap().id(),
            buffer.id()
        );
        let hdr = database.find_attachment(&hdr).unwrap();
        assert_eq!(hdr.lifetime(), AttachmentLifetime::Transient);
        assert!(hdr.image().is_none());

        let ids: Vec<&str> = database.attachments().map(|a| a.id().as_str()).collect();
        assert_eq!(ids, ["instances", "hdr"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut database = FrameGraphAttachmentDatabase::new();
        let descriptor = BufferDescriptor::new(64, BufferBindFlags::COPY_WRITE);
        database.create_transient_buffer("staging", descriptor).unwrap();
        let err = database
            .create_transient_buffer("staging", descriptor)
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
        assert_eq!(database.attachment_count(), 1);

        database.clear();
        assert_eq!(database.attachment_count(), 0);
        database.create_transient_buffer("staging", descriptor).unwrap();
    }
}
