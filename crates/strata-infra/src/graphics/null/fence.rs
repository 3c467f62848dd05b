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

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use strata_rhi::NativeFence;

/// A timeline fence backed by a mutex and a condition variable.
#[derive(Debug, Clone, Default)]
pub struct NullFence {
    inner: Arc<(Mutex<u64>, Condvar)>,
}

impl NullFence {
    /// Creates a fence at `initial_value`.
    pub fn new(initial_value: u64) -> Self {
        Self {
            inner: Arc::new((Mutex::new(initial_value), Condvar::new())),
        }
    }

    fn value(&self) -> MutexGuard<'_, u64> {
        self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks if two handles name the same fence.
    pub fn same_fence(&self, other: &NullFence) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl NativeFence for NullFence {
    fn completed_value(&self) -> u64 {
        *self.value()
    }

    fn signal_on_cpu(&self, value: u64) {
        let mut current = self.value();
        if value > *current {
            *current = value;
            self.inner.1.notify_all();
        }
    }

    fn wait_on_cpu(&self, value: u64, timeout: Duration) -> bool {
        let current = self.value();
        let (current, _) = self
            .inner
            .1
            .wait_timeout_while(current, timeout, |current| *current < value)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current >= value
    }
}
