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

//! Lifetime tracking shared by device-local and multi-device objects.

use super::{DeviceIndex, DeviceMask};
use crate::error::{RhiError, RhiResult};
use std::collections::BTreeMap;

/// The lifecycle of an RHI object.
///
/// Objects move forward only: `Uninitialized -> Initialized -> Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectState {
    /// Created but not yet bound to a device.
    #[default]
    Uninitialized,
    /// Bound and usable.
    Initialized,
    /// Released. The object cannot be initialized again.
    Shutdown,
}

impl ObjectState {
    /// Fails with `InvalidOperation` unless the object may be initialized.
    pub fn ensure_can_init(self, what: &str) -> RhiResult<()> {
        match self {
            ObjectState::Uninitialized => Ok(()),
            ObjectState::Initialized => Err(RhiError::invalid_operation(format!(
                "{what} is already initialized"
            ))),
            ObjectState::Shutdown => Err(RhiError::invalid_operation(format!(
                "{what} was shut down and cannot be initialized again"
            ))),
        }
    }

    /// Fails with `InvalidOperation` unless the object is initialized.
    pub fn ensure_initialized(self, what: &str) -> RhiResult<()> {
        if self == ObjectState::Initialized {
            Ok(())
        } else {
            Err(RhiError::invalid_operation(format!(
                "{what} is not initialized ({self:?})"
            )))
        }
    }
}

/// One device-local object per device of a [`DeviceMask`].
///
/// Initialization is all-or-nothing: if creating the object fails on any device,
/// every object already created is released and the mask is reset to
/// [`DeviceMask::NONE`].
#[derive(Debug)]
pub struct MultiDeviceObject<T> {
    mask: DeviceMask,
    state: ObjectState,
    device_objects: BTreeMap<DeviceIndex, T>,
}

impl<T> Default for MultiDeviceObject<T> {
    fn default() -> Self {
        Self {
            mask: DeviceMask::NONE,
            state: ObjectState::Uninitialized,
            device_objects: BTreeMap::new(),
        }
    }
}

impl<T> MultiDeviceObject<T> {
    /// Creates an uninitialized object spanning no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one device object per device of `mask`.
    ///
    /// Objects created before a failure are simply dropped. Use
    /// [`MultiDeviceObject::init_with_rollback`] when they need an explicit release.
    pub fn init_with<F>(&mut self, mask: DeviceMask, create: F) -> RhiResult<()>
    where
        F: FnMut(DeviceIndex) -> RhiResult<T>,
    {
        self.init_with_rollback(mask, create, |_, _| {})
    }

    /// Creates one device object per device of `mask`, handing already-created
    /// objects to `rollback` if any device fails.
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the object is not uninitialized.
    /// * `InvalidArgument` if `mask` is empty.
    /// * The first error returned by `create`.
    pub fn init_with_rollback<F, R>(
        &mut self,
        mask: DeviceMask,
        mut create: F,
        mut rollback: R,
    ) -> RhiResult<()>
    where
        F: FnMut(DeviceIndex) -> RhiResult<T>,
        R: FnMut(DeviceIndex, T),
    {
        self.state.ensure_can_init("multi-device object")?;
        if mask.is_empty() {
            return Err(RhiError::invalid_argument(
                "multi-device object initialized with an empty device mask",
            ));
        }

        let mut created = BTreeMap::new();
        for index in mask.iter() {
            match create(index) {
                Ok(object) => {
                    created.insert(index, object);
                }
                Err(err) => {
                    log::error!(
                        "Device {index} failed to initialize its object ({err}); rolling back {} device(s)",
                        created.len()
                    );
                    for (created_index, object) in created {
                        rollback(created_index, object);
                    }
                    self.mask = DeviceMask::NONE;
                    self.device_objects.clear();
                    return Err(err);
                }
            }
        }

        self.mask = mask;
        self.device_objects = created;
        self.state = ObjectState::Initialized;
        Ok(())
    }

    /// Releases every device object through `release` and marks the object shut down.
    ///
    /// Shutting down an object that is not initialized only updates its state.
    pub fn shutdown_with<R>(&mut self, mut release: R)
    where
        R: FnMut(DeviceIndex, T),
    {
        for (index, object) in std::mem::take(&mut self.device_objects) {
            release(index, object);
        }
        self.mask = DeviceMask::NONE;
        self.state = ObjectState::Shutdown;
    }

    /// The devices this object spans. Empty unless initialized.
    pub fn device_mask(&self) -> DeviceMask {
        self.mask
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Checks if the object is initialized.
    pub fn is_initialized(&self) -> bool {
        self.state == ObjectState::Initialized
    }

    /// Returns the object of one device.
    pub fn device_object(&self, index: DeviceIndex) -> Option<&T> {
        self.device_objects.get(&index)
    }

    /// Iterates the device objects in device order.
    pub fn device_objects(&self) -> impl Iterator<Item = (DeviceIndex, &T)> {
        self.device_objects.iter().map(|(index, object)| (*index, object))
    }

    /// The number of device objects held.
    pub fn device_object_count(&self) -> usize {
        self.device_objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;

    #[test]
    fn init_creates_one_object_per_device() {
        let mut object = MultiDeviceObject::new();
        object
            .init_with(DeviceMask::from_bits(0b101), |index| Ok(index * 10))
            .unwrap();

        assert!(object.is_initialized());
        assert_eq!(object.device_mask().bits(), 0b101);
        assert_eq!(object.device_object(0), Some(&0));
        assert_eq!(object.device_object(1), None);
        assert_eq!(object.device_object(2), Some(&20));
    }

    #[test]
    fn failure_rolls_back_every_created_object() {
        let mut object = MultiDeviceObject::new();
        let mut rolled_back = Vec::new();
        let result = object.init_with_rollback(
            DeviceMask::first(4),
            |index| {
                if index == 2 {
                    Err(RhiError::Fail("device lost".into()))
                } else {
                    Ok(index)
                }
            },
            |index, _| rolled_back.push(index),
        );

        assert_eq!(ResultCode::from_result(&result), ResultCode::Fail);
        assert_eq!(rolled_back, vec![0, 1]);
        assert_eq!(object.device_mask(), DeviceMask::NONE);
        assert_eq!(object.state(), ObjectState::Uninitialized);
        assert_eq!(object.device_object_count(), 0);
    }

    #[test]
    fn init_twice_is_invalid_operation() {
        let mut object = MultiDeviceObject::new();
        object.init_with(DeviceMask::single(0), |_| Ok(())).unwrap();
        let err = object.init_with(DeviceMask::single(0), |_| Ok(())).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidOperation);
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut object = MultiDeviceObject::new();
        object.init_with(DeviceMask::single(1), |_| Ok("lib")).unwrap();

        let mut released = 0;
        object.shutdown_with(|_, _| released += 1);
        assert_eq!(released, 1);
        assert_eq!(object.state(), ObjectState::Shutdown);

        let err = object.init_with(DeviceMask::single(1), |_| Ok("lib")).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidOperation);
    }

    #[test]
    fn empty_mask_is_invalid_argument() {
        let mut object: MultiDeviceObject<()> = MultiDeviceObject::new();
        let err = object.init_with(DeviceMask::NONE, |_| Ok(())).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
    }
}
