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

use crate::backend::{GraphicsBackend, NativeFence};
use crate::error::{RhiError, RhiResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The timeline fence of one hardware queue.
///
/// Signal values are reserved on the CPU with [`Fence::next_value`] and reached on
/// the GPU once the submission carrying them completes. Values only grow.
pub struct Fence<B: GraphicsBackend> {
    native: B::Fence,
    pending_value: AtomicU64,
    wait_timeout: Duration,
}

impl<B: GraphicsBackend> Fence<B> {
    /// Wraps a native fence whose current value is `initial_value`.
    pub fn new(native: B::Fence, initial_value: u64, wait_timeout: Duration) -> Self {
        Self {
            native,
            pending_value: AtomicU64::new(initial_value),
            wait_timeout,
        }
    }

    /// Reserves and returns the next signal value.
    pub fn next_value(&self) -> u64 {
        self.pending_value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// The last reserved signal value.
    pub fn pending_value(&self) -> u64 {
        self.pending_value.load(Ordering::Acquire)
    }

    /// The last value the fence reached.
    pub fn completed_value(&self) -> u64 {
        self.native.completed_value()
    }

    /// Checks if the fence reached `value`.
    pub fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Raises the fence to `value` from the CPU.
    pub fn signal_on_cpu(&self, value: u64) {
        self.pending_value.fetch_max(value, Ordering::AcqRel);
        self.native.signal_on_cpu(value);
    }

    /// Blocks until the fence reaches `value`.
    ///
    /// # Errors
    ///
    /// `NotReady` if the configured wait timeout expires first.
    pub fn wait_on_cpu(&self, value: u64) -> RhiResult<()> {
        if self.is_complete(value) {
            return Ok(());
        }
        if self.native.wait_on_cpu(value, self.wait_timeout) {
            Ok(())
        } else {
            let msg = format!(
                "fence wait for value {value} timed out after {:?} (completed {})",
                self.wait_timeout,
                self.completed_value()
            );
            log::error!("{msg}");
            Err(RhiError::NotReady(msg))
        }
    }

    /// The native fence.
    pub fn native(&self) -> &B::Fence {
        &self.native
    }
}
