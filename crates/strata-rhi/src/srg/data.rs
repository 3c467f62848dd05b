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

use super::layout::{ShaderInputAccess, ShaderResourceGroupLayout};
use crate::error::{RhiError, RhiResult};
use crate::resource::{BufferBindFlags, BufferView, ImageBindFlags, ImageView};
use std::sync::Arc;

/// The views and constants written into a shader resource group.
///
/// Every setter validates against the layout, so data that exists is always
/// compatible with it.
#[derive(Debug, Clone)]
pub struct ShaderResourceGroupData {
    layout: Arc<ShaderResourceGroupLayout>,
    buffer_views: Vec<Vec<Option<BufferView>>>,
    image_views: Vec<Vec<Option<ImageView>>>,
    constants: Vec<u8>,
}

impl ShaderResourceGroupData {
    /// Creates data with every input unbound and zeroed constants.
    pub fn new(layout: Arc<ShaderResourceGroupLayout>) -> Self {
        let buffer_views = layout
            .buffer_inputs()
            .iter()
            .map(|input| vec![None; input.count as usize])
            .collect();
        let image_views = layout
            .image_inputs()
            .iter()
            .map(|input| vec![None; input.count as usize])
            .collect();
        let constants = vec![0; layout.constant_byte_count() as usize];
        Self {
            layout,
            buffer_views,
            image_views,
            constants,
        }
    }

    /// Binds a buffer view to one element of a buffer input.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the input does not exist, the element is out of
    /// range, or the buffer lacks the bind flags the input's access needs.
    pub fn set_buffer_view(&mut self, input: &str, array_index: u32, view: BufferView) -> RhiResult<()> {
        let index = self.layout.find_buffer_input(input).ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "layout '{}' has no buffer input '{input}'",
                self.layout.name()
            ))
        })?;
        let required = match self.layout.buffer_inputs()[index].access {
            ShaderInputAccess::Read => BufferBindFlags::SHADER_READ,
            ShaderInputAccess::ReadWrite => BufferBindFlags::SHADER_READ_WRITE,
        };
        if !view.buffer().descriptor().bind_flags.contains(required) {
            return Err(RhiError::invalid_argument(format!(
                "buffer '{}' bound to '{input}' lacks bind flags {required:?}",
                view.buffer().name()
            )));
        }
        let slot = element(&mut self.buffer_views[index], input, array_index)?;
        *slot = Some(view);
        Ok(())
    }

    /// Binds an image view to one element of an image input.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the input does not exist, the element is out of
    /// range, or the image lacks the bind flags the input's access needs.
    pub fn set_image_view(&mut self, input: &str, array_index: u32, view: ImageView) -> RhiResult<()> {
        let index = self.layout.find_image_input(input).ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "layout '{}' has no image input '{input}'",
                self.layout.name()
            ))
        })?;
        let required = match self.layout.image_inputs()[index].access {
            ShaderInputAccess::Read => ImageBindFlags::SHADER_READ,
            ShaderInputAccess::ReadWrite => ImageBindFlags::SHADER_READ_WRITE,
        };
        if !view.image().descriptor().bind_flags.contains(required) {
            return Err(RhiError::invalid_argument(format!(
                "image '{}' bound to '{input}' lacks bind flags {required:?}",
                view.image().name()
            )));
        }
        let slot = element(&mut self.image_views[index], input, array_index)?;
        *slot = Some(view);
        Ok(())
    }

    /// Writes bytes into the constant block.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the bytes do not fit at `offset`.
    pub fn set_constants(&mut self, offset: usize, bytes: &[u8]) -> RhiResult<()> {
        let end = offset.checked_add(bytes.len()).filter(|&end| end <= self.constants.len());
        match end {
            Some(end) => {
                self.constants[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(RhiError::invalid_argument(format!(
                "{} constant byte(s) at offset {offset} overflow the {}-byte block of '{}'",
                bytes.len(),
                self.constants.len(),
                self.layout.name()
            ))),
        }
    }

    /// The layout the data conforms to.
    pub fn layout(&self) -> &Arc<ShaderResourceGroupLayout> {
        &self.layout
    }

    /// The view bound to an element of a buffer input.
    pub fn buffer_view(&self, input: &str, array_index: u32) -> Option<&BufferView> {
        let index = self.layout.find_buffer_input(input)?;
        self.buffer_views[index].get(array_index as usize)?.as_ref()
    }

    /// The view bound to an element of an image input.
    pub fn image_view(&self, input: &str, array_index: u32) -> Option<&ImageView> {
        let index = self.layout.find_image_input(input)?;
        self.image_views[index].get(array_index as usize)?.as_ref()
    }

    /// The constant block.
    pub fn constants(&self) -> &[u8] {
        &self.constants
    }

    /// Checks if every element of every input is bound.
    pub fn is_fully_bound(&self) -> bool {
        self.buffer_views.iter().flatten().all(Option::is_some)
            && self.image_views.iter().flatten().all(Option::is_some)
    }
}

fn element<'a, T>(elements: &'a mut [Option<T>], input: &str, array_index: u32) -> RhiResult<&'a mut Option<T>> {
    let count = elements.len();
    elements.get_mut(array_index as usize).ok_or_else(|| {
        RhiError::invalid_argument(format!(
            "index {array_index} is out of range for '{input}' ({count} element(s))"
        ))
    })
}
