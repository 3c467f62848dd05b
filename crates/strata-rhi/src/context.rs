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

//! The root object of the RHI.
//!
//! The context owns the backend and every device. It is built once at startup
//! and handed explicitly to the APIs that span devices.

use crate::backend::GraphicsBackend;
use crate::config::RhiConfig;
use crate::device::{Device, DeviceIndex, DeviceMask, ObjectState};
use crate::error::{RhiError, RhiResult};
use crate::scheduler::FrameScheduler;
use crate::sync::lock;
use std::sync::{Arc, Mutex};

/// The backend plus the devices opened on it.
pub struct RhiContext<B: GraphicsBackend> {
    backend: Arc<B>,
    config: RhiConfig,
    devices: Vec<Arc<Device<B>>>,
    state: Mutex<ObjectState>,
}

impl<B: GraphicsBackend> RhiContext<B> {
    /// Opens up to `config.device_count` devices on `backend`, or every device
    /// when the count is zero.
    ///
    /// # Errors
    ///
    /// * `Fail` if the backend reports no physical device.
    /// * Any error raised while opening a device. Devices opened before the
    ///   failure are shut down.
    pub fn init(backend: B, config: RhiConfig) -> RhiResult<Self> {
        let config = config.validate();
        let backend = Arc::new(backend);
        let physical_devices = backend.enumerate_physical_devices()?;
        if physical_devices.is_empty() {
            return Err(RhiError::Fail(format!(
                "the {} backend reported no physical device",
                backend.name()
            )));
        }

        let mut wanted = match config.device_count {
            0 => physical_devices.len(),
            count => count as usize,
        };
        if wanted > DeviceMask::MAX_DEVICES {
            log::warn!(
                "{wanted} device(s) wanted, a device mask addresses at most {}",
                DeviceMask::MAX_DEVICES
            );
            wanted = DeviceMask::MAX_DEVICES;
        }
        if physical_devices.len() < wanted {
            log::warn!(
                "{} device(s) requested, the {} backend has {}",
                wanted,
                backend.name(),
                physical_devices.len()
            );
        }

        let mut devices = Vec::new();
        for (index, descriptor) in physical_devices.into_iter().take(wanted).enumerate() {
            match Device::init(index, backend.clone(), descriptor, &config) {
                Ok(device) => devices.push(Arc::new(device)),
                Err(err) => {
                    log::error!("Device {index} failed to initialize: {err}");
                    for device in &devices {
                        device.shutdown();
                    }
                    return Err(err);
                }
            }
        }

        log::info!(
            "RHI context initialized on the {} backend with {} device(s)",
            backend.name(),
            devices.len()
        );
        Ok(Self {
            backend,
            config,
            devices,
            state: Mutex::new(ObjectState::Initialized),
        })
    }

    /// A device by index.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the context has no such device.
    pub fn device(&self, index: DeviceIndex) -> RhiResult<&Arc<Device<B>>> {
        self.devices.get(index).ok_or_else(|| {
            RhiError::invalid_argument(format!(
                "device {index} does not exist ({} device(s))",
                self.devices.len()
            ))
        })
    }

    /// Iterates every device in index order.
    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device<B>>> {
        self.devices.iter()
    }

    /// The number of devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// A mask holding every device.
    pub fn all_devices_mask(&self) -> DeviceMask {
        DeviceMask::first(self.devices.len())
    }

    /// Checks that `mask` is not empty and only names existing devices.
    pub fn validate_mask(&self, mask: DeviceMask) -> RhiResult<()> {
        if mask.is_empty() {
            return Err(RhiError::invalid_argument("device mask is empty"));
        }
        if !self.all_devices_mask().contains_all(mask) {
            return Err(RhiError::invalid_argument(format!(
                "device mask {mask:?} names devices outside {:?}",
                self.all_devices_mask()
            )));
        }
        Ok(())
    }

    /// The validated configuration.
    pub fn config(&self) -> &RhiConfig {
        &self.config
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The lifecycle state.
    pub fn state(&self) -> ObjectState {
        *lock(&self.state)
    }

    /// Creates the frame scheduler of one device.
    pub fn create_frame_scheduler(&self, index: DeviceIndex) -> RhiResult<FrameScheduler<B>> {
        self.state().ensure_initialized("RHI context")?;
        Ok(FrameScheduler::new(self.device(index)?.clone(), &self.config))
    }

    /// Shuts down every device. Idempotent.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        if *state != ObjectState::Initialized {
            return;
        }
        for device in &self.devices {
            device.shutdown();
        }
        *state = ObjectState::Shutdown;
        log::info!("RHI context shut down");
    }
}

impl<B: GraphicsBackend> Drop for RhiContext<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
