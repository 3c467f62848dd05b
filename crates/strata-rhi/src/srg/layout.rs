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

//! Describes the inputs a shader resource group exposes to shaders.

/// How a shader accesses an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderInputAccess {
    /// Read-only.
    Read,
    /// Read and write.
    ReadWrite,
}

/// A buffer input, possibly an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderInputBufferDescriptor {
    /// The name shaders use for the input.
    pub name: String,
    /// The shader access.
    pub access: ShaderInputAccess,
    /// The number of array elements, at least 1.
    pub count: u32,
}

impl ShaderInputBufferDescriptor {
    /// A read-only buffer input of `count` elements.
    pub fn read(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            access: ShaderInputAccess::Read,
            count: count.max(1),
        }
    }

    /// A read-write buffer input of `count` elements.
    pub fn read_write(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            access: ShaderInputAccess::ReadWrite,
            count: count.max(1),
        }
    }
}

/// An image input, possibly an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderInputImageDescriptor {
    /// The name shaders use for the input.
    pub name: String,
    /// The shader access.
    pub access: ShaderInputAccess,
    /// The number of array elements, at least 1.
    pub count: u32,
}

impl ShaderInputImageDescriptor {
    /// A read-only image input of `count` elements.
    pub fn read(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            access: ShaderInputAccess::Read,
            count: count.max(1),
        }
    }

    /// A read-write image input of `count` elements.
    pub fn read_write(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            access: ShaderInputAccess::ReadWrite,
            count: count.max(1),
        }
    }
}

/// The layout of a shader resource group.
///
/// Layouts are compared and hashed by content, which is how a device's layout
/// arena deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResourceGroupLayout {
    name: String,
    binding_slot: u32,
    buffer_inputs: Vec<ShaderInputBufferDescriptor>,
    image_inputs: Vec<ShaderInputImageDescriptor>,
    constant_byte_count: u32,
}

impl ShaderResourceGroupLayout {
    /// Creates an empty layout bound at `binding_slot`.
    pub fn new(name: impl Into<String>, binding_slot: u32) -> Self {
        Self {
            name: name.into(),
            binding_slot,
            buffer_inputs: Vec::new(),
            image_inputs: Vec::new(),
            constant_byte_count: 0,
        }
    }

    /// Adds a buffer input.
    pub fn with_buffer_input(mut self, input: ShaderInputBufferDescriptor) -> Self {
        self.buffer_inputs.push(input);
        self
    }

    /// Adds an image input.
    pub fn with_image_input(mut self, input: ShaderInputImageDescriptor) -> Self {
        self.image_inputs.push(input);
        self
    }

    /// Sets the size of the inline constant block.
    pub fn with_constants(mut self, byte_count: u32) -> Self {
        self.constant_byte_count = byte_count;
        self
    }

    /// The layout's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot the group binds to.
    pub fn binding_slot(&self) -> u32 {
        self.binding_slot
    }

    /// The buffer inputs, in declaration order.
    pub fn buffer_inputs(&self) -> &[ShaderInputBufferDescriptor] {
        &self.buffer_inputs
    }

    /// The image inputs, in declaration order.
    pub fn image_inputs(&self) -> &[ShaderInputImageDescriptor] {
        &self.image_inputs
    }

    /// The size of the inline constant block.
    pub fn constant_byte_count(&self) -> u32 {
        self.constant_byte_count
    }

    /// Finds a buffer input by name.
    pub fn find_buffer_input(&self, name: &str) -> Option<usize> {
        self.buffer_inputs.iter().position(|input| input.name == name)
    }

    /// Finds an image input by name.
    pub fn find_image_input(&self, name: &str) -> Option<usize> {
        self.image_inputs.iter().position(|input| input.name == name)
    }
}
