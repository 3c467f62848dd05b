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

//! Images, their formats and image views.

use super::ResourceId;
use crate::error::{RhiError, RhiResult};
use std::sync::Arc;

/// A three-dimensional extent, representing width, height, and depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3D {
    /// The width component of the extent.
    pub width: u32,
    /// The height component of the extent.
    pub height: u32,
    /// The depth of a volume image. Array layers are counted separately.
    pub depth: u32,
}

impl Extent3D {
    /// Creates a two-dimensional extent with a depth of one.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// The extent of a mip level, never smaller than one texel per axis.
    pub fn mip(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }

    /// The number of texels covered.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

/// The dimensionality of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    /// A one-dimensional image.
    D1,
    /// A two-dimensional image.
    D2,
    /// A three-dimensional (volumetric) image.
    D3,
}

/// The texel format of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// One 8-bit normalized channel.
    R8Unorm,
    /// Four 8-bit normalized channels.
    R8G8B8A8Unorm,
    /// Four 8-bit normalized channels, blue first.
    B8G8R8A8Unorm,
    /// Four 16-bit float channels.
    R16G16B16A16Float,
    /// One 32-bit float channel.
    R32Float,
    /// Four 32-bit float channels.
    R32G32B32A32Float,
    /// 32-bit float depth.
    D32Float,
    /// 24-bit depth with 8-bit stencil.
    D24UnormS8Uint,
}

impl Format {
    /// The size of one texel.
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::R8G8B8A8Unorm
            | Format::B8G8R8A8Unorm
            | Format::R32Float
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::R16G16B16A16Float => 8,
            Format::R32G32B32A32Float => 16,
        }
    }

    /// Checks if the format holds depth or stencil.
    pub const fn is_depth_stencil(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }
}

/// Flags describing how an image may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageBindFlags {
    bits: u32,
}

impl ImageBindFlags {
    /// No binding.
    pub const NONE: Self = Self { bits: 0 };
    /// Color render target.
    pub const COLOR: Self = Self { bits: 1 << 0 };
    /// Depth/stencil target.
    pub const DEPTH_STENCIL: Self = Self { bits: 1 << 1 };
    /// Sampled or read from shaders.
    pub const SHADER_READ: Self = Self { bits: 1 << 2 };
    /// Written from shaders.
    pub const SHADER_WRITE: Self = Self { bits: 1 << 3 };
    /// Source of copies.
    pub const COPY_READ: Self = Self { bits: 1 << 4 };
    /// Destination of copies.
    pub const COPY_WRITE: Self = Self { bits: 1 << 5 };
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
}

impl std::ops::BitOr for ImageBindFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Describes an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    /// The dimensionality.
    pub dimension: ImageDimension,
    /// The size of mip level zero.
    pub size: Extent3D,
    /// The texel format.
    pub format: Format,
    /// The number of mip levels.
    pub mip_levels: u32,
    /// The number of array layers.
    pub array_size: u32,
    /// How the image may be bound.
    pub bind_flags: ImageBindFlags,
}

impl ImageDescriptor {
    /// Describes a 2D image with one mip level and one layer.
    pub fn new_2d(width: u32, height: u32, format: Format, bind_flags: ImageBindFlags) -> Self {
        Self {
            dimension: ImageDimension::D2,
            size: Extent3D::new_2d(width, height),
            format,
            mip_levels: 1,
            array_size: 1,
            bind_flags,
        }
    }

    /// Sets the number of mip levels.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// The bytes needed to hold every mip of every layer.
    pub fn byte_size(&self) -> u64 {
        let per_layer: u64 = (0..self.mip_levels.max(1))
            .map(|level| self.size.mip(level).texel_count())
            .sum();
        per_layer * self.array_size.max(1) as u64 * self.format.bytes_per_texel() as u64
    }

    /// Checks the descriptor for zero-sized axes or impossible mip counts.
    pub fn validate(&self) -> RhiResult<()> {
        if self.size.width == 0 || self.size.height == 0 || self.size.depth == 0 {
            return Err(RhiError::invalid_argument(format!(
                "image extent {:?} has a zero axis",
                self.size
            )));
        }
        let largest = self.size.width.max(self.size.height).max(self.size.depth);
        let max_mips = u32::BITS - largest.leading_zeros();
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(RhiError::invalid_argument(format!(
                "image with extent {:?} cannot have {} mip levels (max {max_mips})",
                self.size, self.mip_levels
            )));
        }
        if self.array_size == 0 {
            return Err(RhiError::invalid_argument("image array size is zero"));
        }
        Ok(())
    }
}

/// A texel allocation.
#[derive(Debug)]
pub struct Image {
    id: ResourceId,
    name: String,
    descriptor: ImageDescriptor,
}

impl Image {
    /// Creates an image object after validating its descriptor.
    pub fn new(name: impl Into<String>, descriptor: ImageDescriptor) -> RhiResult<Arc<Self>> {
        descriptor.validate()?;
        Ok(Arc::new(Self {
            id: ResourceId::next(),
            name: name.into(),
            descriptor,
        }))
    }

    /// The process-unique identifier.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor the image was created with.
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }
}

/// Describes the subresources an image view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageViewDescriptor {
    /// The format to reinterpret texels as. `None` keeps the image format.
    pub format: Option<Format>,
    /// The first mip level.
    pub base_mip_level: u32,
    /// The number of mip levels. `None` covers every remaining level.
    pub mip_level_count: Option<u32>,
    /// The first array layer.
    pub base_array_layer: u32,
    /// The number of array layers. `None` covers every remaining layer.
    pub array_layer_count: Option<u32>,
}

impl ImageViewDescriptor {
    /// A view of a single mip level.
    pub fn mip(level: u32) -> Self {
        Self {
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        }
    }
}

/// A validated subresource range of an image.
#[derive(Debug, Clone)]
pub struct ImageView {
    image: Arc<Image>,
    descriptor: ImageViewDescriptor,
    format: Format,
    mip_levels: std::ops::Range<u32>,
    array_layers: std::ops::Range<u32>,
}

impl ImageView {
    /// Creates a view, checking the subresource range against the image.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the range is empty or exceeds the image's mips or layers.
    pub fn new(image: Arc<Image>, descriptor: ImageViewDescriptor) -> RhiResult<Self> {
        let image_descriptor = *image.descriptor();
        let mip_levels = resolve_range(
            descriptor.base_mip_level,
            descriptor.mip_level_count,
            image_descriptor.mip_levels,
        )
        .ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "image view mips {}+{:?} are out of range for '{}' ({} mips)",
                descriptor.base_mip_level,
                descriptor.mip_level_count,
                image.name(),
                image_descriptor.mip_levels
            ))
        })?;
        let array_layers = resolve_range(
            descriptor.base_array_layer,
            descriptor.array_layer_count,
            image_descriptor.array_size,
        )
        .ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "image view layers {}+{:?} are out of range for '{}' ({} layers)",
                descriptor.base_array_layer,
                descriptor.array_layer_count,
                image.name(),
                image_descriptor.array_size
            ))
        })?;
        let format = descriptor.format.unwrap_or(image_descriptor.format);
        if format.bytes_per_texel() != image_descriptor.format.bytes_per_texel() {
            return Err(RhiError::invalid_argument(format!(
                "image view format {format:?} is not compatible with {:?}",
                image_descriptor.format
            )));
        }
        Ok(Self {
            image,
            descriptor,
            format,
            mip_levels,
            array_layers,
        })
    }

    /// The viewed image.
    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    /// The descriptor the view was created from.
    pub fn descriptor(&self) -> &ImageViewDescriptor {
        &self.descriptor
    }

    /// The resolved format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The mip levels covered.
    pub fn mip_levels(&self) -> std::ops::Range<u32> {
        self.mip_levels.clone()
    }

    /// The array layers covered.
    pub fn array_layers(&self) -> std::ops::Range<u32> {
        self.array_layers.clone()
    }
}

fn resolve_range(base: u32, count: Option<u32>, total: u32) -> Option<std::ops::Range<u32>> {
    let count = count.unwrap_or_else(|| total.saturating_sub(base));
    let end = base.checked_add(count)?;
    (count > 0 && end <= total).then_some(base..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;

    fn image() -> Arc<Image> {
        Image::new(
            "color",
            ImageDescriptor::new_2d(64, 32, Format::R8G8B8A8Unorm, ImageBindFlags::COLOR)
                .with_mip_levels(4),
        )
        .unwrap()
    }

    #[test]
    fn byte_size_sums_every_mip() {
        let descriptor = ImageDescriptor::new_2d(4, 4, Format::R32Float, ImageBindFlags::COLOR)
            .with_mip_levels(3);
        // 16 + 4 + 1 texels of 4 bytes.
        assert_eq!(descriptor.byte_size(), 84);
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        let zero = ImageDescriptor::new_2d(0, 4, Format::R8Unorm, ImageBindFlags::COLOR);
        assert!(Image::new("zero", zero).is_err());

        let too_many_mips = ImageDescriptor::new_2d(8, 8, Format::R8Unorm, ImageBindFlags::COLOR)
            .with_mip_levels(5);
        assert!(Image::new("mips", too_many_mips).is_err());

        let max_mips = ImageDescriptor::new_2d(8, 8, Format::R8Unorm, ImageBindFlags::COLOR)
            .with_mip_levels(4);
        assert!(Image::new("mips", max_mips).is_ok());
    }

    #[test]
    fn default_view_covers_every_subresource() {
        let view = ImageView::new(image(), ImageViewDescriptor::default()).unwrap();
        assert_eq!(view.mip_levels(), 0..4);
        assert_eq!(view.array_layers(), 0..1);
        assert_eq!(view.format(), Format::R8G8B8A8Unorm);
    }

    #[test]
    fn single_mip_view() {
        let view = ImageView::new(image(), ImageViewDescriptor::mip(2)).unwrap();
        assert_eq!(view.mip_levels(), 2..3);
    }

    #[test]
    fn out_of_range_views_are_rejected() {
        let err = ImageView::new(image(), ImageViewDescriptor::mip(4)).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);

        let layers = ImageViewDescriptor {
            base_array_layer: 1,
            ..Default::default()
        };
        assert!(ImageView::new(image(), layers).is_err());

        let incompatible = ImageViewDescriptor {
            format: Some(Format::R16G16B16A16Float),
            ..Default::default()
        };
        assert!(ImageView::new(image(), incompatible).is_err());
    }
}
