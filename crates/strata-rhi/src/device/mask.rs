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

//! Flags selecting which devices a multi-device object spans.

use super::DeviceIndex;
use std::fmt;

/// A set of device indices.
///
/// Bit `n` is set when the device with index `n` is part of the set. Up to
/// [`DeviceMask::MAX_DEVICES`] devices can be addressed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceMask {
    bits: u32,
}

impl DeviceMask {
    /// The number of device indices a mask can hold.
    pub const MAX_DEVICES: usize = 32;
    /// No devices.
    pub const NONE: Self = Self { bits: 0 };
    /// Every device. Intersect with the context's mask before iterating.
    pub const ALL: Self = Self { bits: u32::MAX };

    /// Creates a mask from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Creates a mask holding a single device.
    ///
    /// Indices past [`DeviceMask::MAX_DEVICES`] produce an empty mask.
    pub const fn single(index: DeviceIndex) -> Self {
        if index < Self::MAX_DEVICES {
            Self { bits: 1 << index }
        } else {
            Self::NONE
        }
    }

    /// Creates a mask holding the first `count` devices.
    pub const fn first(count: usize) -> Self {
        if count >= Self::MAX_DEVICES {
            Self::ALL
        } else {
            Self {
                bits: (1u32 << count) - 1,
            }
        }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Checks if the mask contains a device index.
    pub const fn contains(&self, index: DeviceIndex) -> bool {
        index < Self::MAX_DEVICES && (self.bits >> index) & 1 == 1
    }

    /// Checks if every device of `other` is also in this mask.
    pub const fn contains_all(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Combines two masks.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Keeps only the devices present in both masks.
    pub const fn intersection(self, other: Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    /// Checks if the mask is empty.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// The number of devices in the mask.
    pub const fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterates the device indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DeviceIndex> {
        let bits = self.bits;
        (0..Self::MAX_DEVICES).filter(move |index| (bits >> index) & 1 == 1)
    }
}

impl fmt::Debug for DeviceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceMask({:#b})", self.bits)
    }
}

impl std::ops::BitOr for DeviceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for DeviceMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl std::ops::BitAnd for DeviceMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(rhs)
    }
}

impl FromIterator<DeviceIndex> for DeviceMask {
    fn from_iter<I: IntoIterator<Item = DeviceIndex>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |mask, index| mask | Self::single(index))
    }
}
