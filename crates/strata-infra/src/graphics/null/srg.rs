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

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A shader resource group. It keeps no data, only how often it was written.
#[derive(Debug)]
pub struct NullShaderResourceGroup {
    layout_name: String,
    constant_byte_count: AtomicUsize,
    compiles: AtomicU64,
}

impl NullShaderResourceGroup {
    pub(crate) fn new(layout_name: impl Into<String>) -> Self {
        Self {
            layout_name: layout_name.into(),
            constant_byte_count: AtomicUsize::new(0),
            compiles: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_compile(&self, constant_byte_count: usize) {
        self.constant_byte_count
            .store(constant_byte_count, Ordering::Relaxed);
        self.compiles.fetch_add(1, Ordering::Relaxed);
    }

    /// The name of the layout the group was created for.
    pub fn layout_name(&self) -> &str {
        &self.layout_name
    }

    /// How many times data was compiled into the group.
    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::Relaxed)
    }

    /// The size of the constant data written by the last compile.
    pub fn constant_byte_count(&self) -> usize {
        self.constant_byte_count.load(Ordering::Relaxed)
    }
}
