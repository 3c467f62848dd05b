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

//! Buffers and buffer views.

use super::ResourceId;
use crate::error::{RhiError, RhiResult};
use std::sync::Arc;

/// Flags describing how a buffer may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferBindFlags {
    bits: u32,
}

impl BufferBindFlags {
    /// No binding.
    pub const NONE: Self = Self { bits: 0 };
    /// Vertex stream input.
    pub const INPUT_ASSEMBLY: Self = Self { bits: 1 << 0 };
    /// Index buffer.
    pub const INDEX: Self = Self { bits: 1 << 1 };
    /// Constant buffer.
    pub const CONSTANT: Self = Self { bits: 1 << 2 };
    /// Read from shaders.
    pub const SHADER_READ: Self = Self { bits: 1 << 3 };
    /// Written from shaders.
    pub const SHADER_WRITE: Self = Self { bits: 1 << 4 };
    /// Source of copies.
    pub const COPY_READ: Self = Self { bits: 1 << 5 };
    /// Destination of copies.
    pub const COPY_WRITE: Self = Self { bits: 1 << 6 };
    /// Indirect draw or dispatch arguments.
    pub const INDIRECT: Self = Self { bits: 1 << 7 };
    /// Read and written from shaders.
    pub const SHADER_READ_WRITE: Self = Self {
        bits: Self::SHADER_READ.bits | Self::SHADER_WRITE.bits,
    };

    /// Creates flags from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Checks if every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Checks if no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for BufferBindFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Describes a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// The size of the buffer.
    pub byte_count: u64,
    /// How the buffer may be bound.
    pub bind_flags: BufferBindFlags,
}

impl BufferDescriptor {
    /// Creates a buffer descriptor.
    pub fn new(byte_count: u64, bind_flags: BufferBindFlags) -> Self {
        Self {
            byte_count,
            bind_flags,
        }
    }
}

/// A linear GPU allocation.
#[derive(Debug)]
pub struct Buffer {
    id: ResourceId,
    name: String,
    descriptor: BufferDescriptor,
}

impl Buffer {
    /// Creates a buffer object.
    ///
    /// Pools and the transient attachment pool call this; it does not account the
    /// buffer against any budget.
    pub fn new(name: impl Into<String>, descriptor: BufferDescriptor) -> Arc<Self> {
        Arc::new(Self {
            id: ResourceId::next(),
            name: name.into(),
            descriptor,
        })
    }

    /// The process-unique identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor the buffer was created with.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// The size of the buffer.
    pub fn byte_count(&self) -> u64 {
        self.descriptor.byte_count
    }
}

/// Describes a range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferViewDescriptor {
    /// The first byte of the range.
    pub byte_offset: u64,
    /// The length of the range. `None` extends it to the end of the buffer.
    pub byte_count: Option<u64>,
}

impl BufferViewDescriptor {
    /// A view over the whole buffer.
    pub const fn whole() -> Self {
        Self {
            byte_offset: 0,
            byte_count: None,
        }
    }

    /// A view over `byte_count` bytes starting at `byte_offset`.
    pub const fn range(byte_offset: u64, byte_count: u64) -> Self {
        Self {
            byte_offset,
            byte_count: Some(byte_count),
        }
    }
}

/// A validated range of a buffer.
#[derive(Debug, Clone)]
pub struct BufferView {
    buffer: Arc<Buffer>,
    descriptor: BufferViewDescriptor,
    byte_offset: u64,
    byte_count: u64,
}

impl BufferView {
    /// Creates a view, checking the range against the buffer.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the range is empty or ends past the buffer.
    pub fn new(buffer: Arc<Buffer>, descriptor: BufferViewDescriptor) -> RhiResult<Self> {
        let size = buffer.byte_count();
        let byte_count = descriptor
            .byte_count
            .unwrap_or_else(|| size.saturating_sub(descriptor.byte_offset));
        let end = descriptor.byte_offset.checked_add(byte_count);
        if byte_count == 0 || end.map_or(true, |end| end > size) {
            return Err(RhiError::invalid_argument(format!(
                "buffer view [{}, +{byte_count}) is out of range for '{}' ({size} bytes)",
                descriptor.byte_offset,
                buffer.name()
            )));
        }
        Ok(Self {
            buffer,
            descriptor,
            byte_offset: descriptor.byte_offset,
            byte_count,
        })
    }

    /// The viewed buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// The descriptor the view was created from.
    pub fn descriptor(&self) -> &BufferViewDescriptor {
        &self.descriptor
    }

    /// The first byte of the view.
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    /// The resolved length of the view.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;

    fn buffer(size: u64) -> Arc<Buffer> {
        Buffer::new("test", BufferDescriptor::new(size, BufferBindFlags::SHADER_READ))
    }

    #[test]
    fn whole_view_covers_the_buffer() {
        let view = BufferView::new(buffer(256), BufferViewDescriptor::whole()).unwrap();
        assert_eq!(view.byte_offset(), 0);
        assert_eq!(view.byte_count(), 256);
    }

    #[test]
    fn open_ended_view_runs_to_the_end() {
        let descriptor = BufferViewDescriptor {
            byte_offset: 64,
            byte_count: None,
        };
        let view = BufferView::new(buffer(256), descriptor).unwrap();
        assert_eq!(view.byte_count(), 192);
    }

    #[test]
    fn out_of_range_views_are_rejected() {
        for descriptor in [
            BufferViewDescriptor::range(200, 100),
            BufferViewDescriptor::range(0, 0),
            BufferViewDescriptor::range(u64::MAX, 2),
            BufferViewDescriptor {
                byte_offset: 256,
                byte_count: None,
            },
        ] {
            let err = BufferView::new(buffer(256), descriptor).unwrap_err();
            assert_eq!(err.code(), ResultCode::InvalidArgument);
        }
    }

    #[test]
    fn bind_flags_contain_subsets() {
        let flags = BufferBindFlags::SHADER_READ_WRITE | BufferBindFlags::COPY_WRITE;
        assert!(flags.contains(BufferBindFlags::SHADER_WRITE));
        assert!(flags.contains(BufferBindFlags::SHADER_READ | BufferBindFlags::COPY_WRITE));
        assert!(!flags.contains(BufferBindFlags::INDEX));
    }
}
