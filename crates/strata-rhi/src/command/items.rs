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

//! The work items a scope submits to a command list.

use crate::backend::GraphicsBackend;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::PipelineState;
use crate::resource::{Buffer, BufferView, Extent3D, Image};
use crate::srg::ShaderResourceGroup;

/// The vertex and instance ranges of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawArguments {
    /// Vertices are pulled in order.
    Linear {
        /// The number of vertices.
        vertex_count: u32,
        /// The number of instances.
        instance_count: u32,
        /// The first vertex.
        vertex_offset: u32,
        /// The first instance.
        instance_offset: u32,
    },
    /// Vertices are pulled through the index buffer.
    Indexed {
        /// The number of indices.
        index_count: u32,
        /// The number of instances.
        instance_count: u32,
        /// The first index.
        index_offset: u32,
        /// Added to every index before fetching the vertex.
        vertex_offset: i32,
        /// The first instance.
        instance_offset: u32,
    },
}

impl DrawArguments {
    /// A single non-instanced linear draw.
    pub const fn linear(vertex_count: u32) -> Self {
        DrawArguments::Linear {
            vertex_count,
            instance_count: 1,
            vertex_offset: 0,
            instance_offset: 0,
        }
    }

    /// A single non-instanced indexed draw.
    pub const fn indexed(index_count: u32) -> Self {
        DrawArguments::Indexed {
            index_count,
            instance_count: 1,
            index_offset: 0,
            vertex_offset: 0,
            instance_offset: 0,
        }
    }

    /// Checks if the draw reads an index buffer.
    pub const fn is_indexed(&self) -> bool {
        matches!(self, DrawArguments::Indexed { .. })
    }
}

/// A draw call.
pub struct DrawItem<'a, B: GraphicsBackend> {
    /// The vertex and instance ranges.
    pub arguments: DrawArguments,
    /// The pipeline state, which must be a draw pipeline.
    pub pipeline_state: &'a PipelineState<B>,
    /// Shader resource groups bound for the draw.
    pub shader_resource_groups: &'a [&'a ShaderResourceGroup<B>],
    /// The index buffer, required for indexed draws.
    pub index_buffer_view: Option<&'a BufferView>,
    /// The vertex streams.
    pub stream_buffer_views: &'a [BufferView],
}

impl<'a, B: GraphicsBackend> DrawItem<'a, B> {
    /// Creates a draw item without bindings or streams.
    pub fn new(arguments: DrawArguments, pipeline_state: &'a PipelineState<B>) -> Self {
        Self {
            arguments,
            pipeline_state,
            shader_resource_groups: &[],
            index_buffer_view: None,
            stream_buffer_views: &[],
        }
    }
}

/// A compute dispatch.
pub struct DispatchItem<'a, B: GraphicsBackend> {
    /// The number of thread groups along each axis.
    pub thread_groups: [u32; 3],
    /// The pipeline state, which must be a dispatch pipeline.
    pub pipeline_state: &'a PipelineState<B>,
    /// Shader resource groups bound for the dispatch.
    pub shader_resource_groups: &'a [&'a ShaderResourceGroup<B>],
}

impl<'a, B: GraphicsBackend> DispatchItem<'a, B> {
    /// Creates a dispatch item without bindings.
    pub fn new(thread_groups: [u32; 3], pipeline_state: &'a PipelineState<B>) -> Self {
        Self {
            thread_groups,
            pipeline_state,
            shader_resource_groups: &[],
        }
    }
}

/// A ray dispatch.
pub struct DispatchRaysItem<'a, B: GraphicsBackend> {
    /// The launch size.
    pub extent: Extent3D,
    /// The pipeline state, which must be a ray-tracing pipeline.
    pub pipeline_state: &'a PipelineState<B>,
    /// Shader resource groups bound for the dispatch.
    pub shader_resource_groups: &'a [&'a ShaderResourceGroup<B>],
}

/// A copy between resources.
#[derive(Debug, Clone, Copy)]
pub enum CopyItem<'a> {
    /// Buffer to buffer.
    Buffer {
        /// The source buffer.
        source: &'a Buffer,
        /// The first source byte.
        source_offset: u64,
        /// The destination buffer.
        destination: &'a Buffer,
        /// The first destination byte.
        destination_offset: u64,
        /// The number of bytes copied.
        size: u64,
    },
    /// Buffer to one mip of an image.
    BufferToImage {
        /// The source buffer.
        source: &'a Buffer,
        /// The first source byte.
        source_offset: u64,
        /// The destination image.
        destination: &'a Image,
        /// The destination mip level.
        mip_level: u32,
    },
    /// One mip of an image to a buffer.
    ImageToBuffer {
        /// The source image.
        source: &'a Image,
        /// The source mip level.
        mip_level: u32,
        /// The destination buffer.
        destination: &'a Buffer,
        /// The first destination byte.
        destination_offset: u64,
    },
    /// One mip of an image to one mip of another.
    Image {
        /// The source image.
        source: &'a Image,
        /// The source mip level.
        source_mip_level: u32,
        /// The destination image.
        destination: &'a Image,
        /// The destination mip level.
        destination_mip_level: u32,
    },
}

impl CopyItem<'_> {
    /// Checks every range of the copy against its resources.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if a byte range or mip level is out of bounds, or if an
    /// image to image copy changes the texel size.
    pub fn validate(&self) -> RhiResult<()> {
        match *self {
            CopyItem::Buffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                check_buffer_range(source, source_offset, size)?;
                check_buffer_range(destination, destination_offset, size)
            }
            CopyItem::BufferToImage {
                source,
                source_offset,
                destination,
                mip_level,
            } => {
                let bytes = mip_bytes(destination, mip_level)?;
                check_buffer_range(source, source_offset, bytes)
            }
            CopyItem::ImageToBuffer {
                source,
                mip_level,
                destination,
                destination_offset,
            } => {
                let bytes = mip_bytes(source, mip_level)?;
                check_buffer_range(destination, destination_offset, bytes)
            }
            CopyItem::Image {
                source,
                source_mip_level,
                destination,
                destination_mip_level,
            } => {
                let source_bytes = mip_bytes(source, source_mip_level)?;
                let destination_bytes = mip_bytes(destination, destination_mip_level)?;
                if source_bytes != destination_bytes {
                    return Err(RhiError::invalid_argument(format!(
                        "image copy from '{}' mip {source_mip_level} ({source_bytes} bytes) to '{}' mip {destination_mip_level} ({destination_bytes} bytes) changes size",
                        source.name(),
                        destination.name()
                    )));
                }
                Ok(())
            }
        }
    }
}

fn check_buffer_range(buffer: &Buffer, offset: u64, size: u64) -> RhiResult<()> {
    match offset.checked_add(size) {
        Some(end) if size > 0 && end <= buffer.byte_count() => Ok(()),
        _ => Err(RhiError::invalid_argument(format!(
            "copy range [{offset}, +{size}) is out of bounds for '{}' ({} bytes)",
            buffer.name(),
            buffer.byte_count()
        ))),
    }
}

fn mip_bytes(image: &Image, mip_level: u32) -> RhiResult<u64> {
    let descriptor = image.descriptor();
    if mip_level >= descriptor.mip_levels {
        return Err(RhiError::invalid_argument(format!(
            "mip level {mip_level} is out of bounds for '{}' ({} mips)",
            image.name(),
            descriptor.mip_levels
        )));
    }
    Ok(descriptor.size.mip(mip_level).texel_count()
        * descriptor.array_size as u64
        * descriptor.format.bytes_per_texel() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;
    use crate::resource::{BufferBindFlags, BufferDescriptor, Format, ImageBindFlags, ImageDescriptor};
    use std::sync::Arc;

    fn buffer(size: u64) -> Arc<Buffer> {
        Buffer::new("staging", BufferDescriptor::new(size, BufferBindFlags::COPY_READ))
    }

    fn image(size: u32, mips: u32) -> Arc<Image> {
        Image::new(
            "texture",
            ImageDescriptor::new_2d(size, size, Format::R8G8B8A8Unorm, ImageBindFlags::COPY_WRITE)
                .with_mip_levels(mips),
        )
        .unwrap()
    }

    #[test]
    fn buffer_copy_bounds() {
        let (a, b) = (buffer(128), buffer(64));
        let ok = CopyItem::Buffer {
            source: &a,
            source_offset: 64,
            destination: &b,
            destination_offset: 0,
            size: 64,
        };
        assert!(ok.validate().is_ok());

        let overflow = CopyItem::Buffer {
            source: &a,
            source_offset: 0,
            destination: &b,
            destination_offset: 32,
            size: 64,
        };
        assert_eq!(overflow.validate().unwrap_err().code(), ResultCode::InvalidArgument);
    }

    #[test]
    fn buffer_to_image_checks_the_mip() {
        let texture = image(8, 2);
        // Mip 1 of an 8x8 RGBA8 image is 4x4x4 bytes.
        let staging = buffer(64);
        let ok = CopyItem::BufferToImage {
            source: &staging,
            source_offset: 0,
            destination: &texture,
            mip_level: 1,
        };
        assert!(ok.validate().is_ok());

        let too_small = CopyItem::BufferToImage {
            source: &staging,
            source_offset: 0,
            destination: &texture,
            mip_level: 0,
        };
        assert!(too_small.validate().is_err());

        let missing_mip = CopyItem::ImageToBuffer {
            source: &texture,
            mip_level: 2,
            destination: &staging,
            destination_offset: 0,
        };
        assert!(missing_mip.validate().is_err());
    }

    #[test]
    fn image_copy_requires_matching_sizes() {
        let (large, small) = (image(8, 2), image(4, 1));
        let matching = CopyItem::Image {
            source: &large,
            source_mip_level: 1,
            destination: &small,
            destination_mip_level: 0,
        };
        assert!(matching.validate().is_ok());

        let mismatched = CopyItem::Image {
            source: &large,
            source_mip_level: 0,
            destination: &small,
            destination_mip_level: 0,
        };
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn draw_arguments_helpers() {
        assert!(DrawArguments::indexed(3).is_indexed());
        assert!(!DrawArguments::linear(3).is_indexed());
    }
}
