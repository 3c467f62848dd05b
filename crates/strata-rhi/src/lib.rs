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

//! # Strata RHI
//!
//! Backend-agnostic render hardware interface: the contracts a graphics backend
//! implements, plus the frame-graph and command-queue execution core that
//! schedules a frame's GPU work across hardware queues and devices.
//!
//! This crate defines the 'what'. Concrete backends (see `strata-infra`)
//! implement [`GraphicsBackend`] and never leak their types past it.

#![warn(missing_docs)]

pub mod backend;
pub mod command;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod frame_graph;
pub mod graph;
pub mod pipeline;
pub mod queue;
pub mod resource;
pub mod scheduler;
pub mod srg;
mod sync;

pub use backend::{
    GraphicsBackend, NativeCommandList, NativeFence, NativePipelineLibrary, NativeQueue,
    PhysicalDeviceDescriptor,
};
pub use config::{PlatformLimits, RhiConfig};
pub use context::RhiContext;
pub use device::{Device, DeviceIndex, DeviceMask, ObjectState};
pub use error::{ResultCode, RhiError, RhiResult};
pub use queue::{HardwareQueueClass, QueueFenceValues};
pub use scheduler::{FramePhase, FrameScheduler, FrameStatistics};
