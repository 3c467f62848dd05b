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

//! A thread-safe cache of compiled pipeline states.
//!
//! Lookups hit a read-mostly global cache first. Misses go through a pending
//! cache so that concurrent requests for the same descriptor compile it once;
//! the losers block until the winner publishes its result. Compiles record into
//! a library owned by the compiling thread, so recording threads never contend
//! on a shared library. [`PipelineStateCache::compact`] later folds the pending
//! cache into the global one and merges the thread libraries into the owning
//! library, which is what gets serialized.

use super::library::{MultiDevicePipelineLibrary, PipelineLibraryDescriptor};
use super::state::{MultiDevicePipelineState, PipelineStateDescriptor};
use crate::backend::GraphicsBackend;
use crate::context::RhiContext;
use crate::device::{DeviceIndex, DeviceMask};
use crate::error::{RhiError, RhiResult};
use crate::sync::{lock, read, write};
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::ThreadId;

new_key_type! {
    /// A handle to a library registered in a [`PipelineStateCache`].
    pub struct PipelineLibraryHandle;
}

struct PendingCompile<T> {
    result: Mutex<Option<Result<T, String>>>,
    ready: Condvar,
}

impl<T: Clone> PendingCompile<T> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<T, String>) {
        *lock(&self.result) = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> RhiResult<T> {
        let mut result = lock(&self.result);
        loop {
            if let Some(published) = result.as_ref() {
                return published.clone().map_err(RhiError::Fail);
            }
            result = self
                .ready
                .wait(result)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn is_published(&self) -> bool {
        lock(&self.result).is_some()
    }
}

/// Held by the compiling thread. Waiters are released with a failure if the
/// compile unwinds before publishing.
struct PublishGuard<T: Clone> {
    pending: Arc<PendingCompile<T>>,
}

impl<T: Clone> PublishGuard<T> {
    fn publish(self, result: Result<T, String>) {
        self.pending.publish(result);
    }
}

impl<T: Clone> Drop for PublishGuard<T> {
    fn drop(&mut self) {
        let mut result = lock(&self.pending.result);
        if result.is_none() {
            *result = Some(Err("pipeline compile panicked".to_string()));
            self.pending.ready.notify_all();
        }
    }
}

type PendingState<B> = Arc<PendingCompile<Arc<MultiDevicePipelineState<B>>>>;

struct LibraryEntry<B: GraphicsBackend> {
    mask: DeviceMask,
    library: MultiDevicePipelineLibrary<B>,
    global: RwLock<HashMap<PipelineStateDescriptor, Arc<MultiDevicePipelineState<B>>>>,
    pending: Mutex<HashMap<PipelineStateDescriptor, PendingState<B>>>,
    thread_libraries: Mutex<HashMap<ThreadId, Arc<MultiDevicePipelineLibrary<B>>>>,
}

/// Caches pipeline states per library, across threads and devices.
pub struct PipelineStateCache<B: GraphicsBackend> {
    context: Arc<RhiContext<B>>,
    libraries: RwLock<SlotMap<PipelineLibraryHandle, Arc<LibraryEntry<B>>>>,
}

impl<B: GraphicsBackend> PipelineStateCache<B> {
    /// Creates an empty cache over every device of `context`.
    pub fn new(context: Arc<RhiContext<B>>) -> Self {
        Self {
            context,
            libraries: RwLock::new(SlotMap::with_key()),
        }
    }

    /// Registers a library spanning every device, seeded with `descriptor`.
    pub fn create_library(
        &self,
        descriptor: &PipelineLibraryDescriptor,
    ) -> RhiResult<PipelineLibraryHandle> {
        let mask = self.context.all_devices_mask();
        let mut library = MultiDevicePipelineLibrary::new();
        library.init(&self.context, mask, descriptor)?;
        let entry = Arc::new(LibraryEntry {
            mask,
            library,
            global: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            thread_libraries: Mutex::new(HashMap::new()),
        });
        Ok(write(&self.libraries).insert(entry))
    }

    /// Unregisters a library. Pipeline states already handed out stay valid.
    pub fn release_library(&self, handle: PipelineLibraryHandle) -> RhiResult<()> {
        write(&self.libraries)
            .remove(handle)
            .map(|_| ())
            .ok_or(RhiError::StaleHandle("pipeline library"))
    }

    fn entry(&self, handle: PipelineLibraryHandle) -> RhiResult<Arc<LibraryEntry<B>>> {
        read(&self.libraries)
            .get(handle)
            .cloned()
            .ok_or(RhiError::StaleHandle("pipeline library"))
    }

    /// Returns the pipeline state for `descriptor`, compiling it on first use.
    ///
    /// Concurrent calls with equal descriptors compile once and share the result.
    ///
    /// # Errors
    ///
    /// * `StaleHandle` if the library was released.
    /// * The compile error, reported to every caller that waited on it.
    pub fn acquire_pipeline_state(
        &self,
        handle: PipelineLibraryHandle,
        descriptor: &PipelineStateDescriptor,
    ) -> RhiResult<Arc<MultiDevicePipelineState<B>>> {
        let entry = self.entry(handle)?;
        if let Some(state) = read(&entry.global).get(descriptor) {
            return Ok(state.clone());
        }

        let (pending, is_compiler) = {
            let mut pending = lock(&entry.pending);
            // Compaction may have promoted the state since the first lookup.
            if let Some(state) = read(&entry.global).get(descriptor) {
                return Ok(state.clone());
            }
            match pending.get(descriptor) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let created = Arc::new(PendingCompile::new());
                    pending.insert(descriptor.clone(), created.clone());
                    (created, true)
                }
            }
        };
        if !is_compiler {
            return pending.wait();
        }

        let guard = PublishGuard { pending };
        let result = self.compile(&entry, descriptor);
        guard.publish(match &result {
            Ok(state) => Ok(state.clone()),
            Err(err) => Err(err.to_string()),
        });
        result
    }

    fn compile(
        &self,
        entry: &LibraryEntry<B>,
        descriptor: &PipelineStateDescriptor,
    ) -> RhiResult<Arc<MultiDevicePipelineState<B>>> {
        let thread_library = self.thread_library(entry)?;
        let state = MultiDevicePipelineState::init(
            &self.context,
            entry.mask,
            descriptor.clone(),
            Some(&thread_library),
        )?;
        Ok(Arc::new(state))
    }

    fn thread_library(&self, entry: &LibraryEntry<B>) -> RhiResult<Arc<MultiDevicePipelineLibrary<B>>> {
        let thread = std::thread::current().id();
        if let Some(library) = lock(&entry.thread_libraries).get(&thread) {
            return Ok(library.clone());
        }
        let mut library = MultiDevicePipelineLibrary::new();
        library.init(&self.context, entry.mask, &PipelineLibraryDescriptor::default())?;
        let library = Arc::new(library);
        lock(&entry.thread_libraries).insert(thread, library.clone());
        Ok(library)
    }

    /// Promotes compiled states to the global cache and merges thread libraries
    /// into their owning library.
    ///
    /// Failed compiles are dropped so that a later acquire retries them. Call it
    /// while no thread is compiling, typically between frames.
    pub fn compact(&self) -> RhiResult<()> {
        let entries: Vec<Arc<LibraryEntry<B>>> = read(&self.libraries).values().cloned().collect();
        for entry in entries {
            {
                let mut pending = lock(&entry.pending);
                let mut global = write(&entry.global);
                pending.retain(|descriptor, compile| {
                    if !compile.is_published() {
                        return true;
                    }
                    if let Some(Ok(state)) = lock(&compile.result).as_ref() {
                        global.insert(descriptor.clone(), state.clone());
                    }
                    false
                });
            }

            let thread_libraries: Vec<Arc<MultiDevicePipelineLibrary<B>>> =
                lock(&entry.thread_libraries).drain().map(|(_, library)| library).collect();
            if !thread_libraries.is_empty() {
                let sources: Vec<&MultiDevicePipelineLibrary<B>> =
                    thread_libraries.iter().map(Arc::as_ref).collect();
                entry.library.merge_into(&sources)?;
                log::debug!("Merged {} thread pipeline libraries", sources.len());
            }
        }
        Ok(())
    }

    /// Serializes the owning library of `handle` on one device.
    pub fn serialized_data(
        &self,
        handle: PipelineLibraryHandle,
        device: DeviceIndex,
    ) -> RhiResult<Vec<u8>> {
        let entry = self.entry(handle)?;
        let library = entry.library.device_library(device).ok_or_else(|| {
            RhiError::invalid_argument(format!("pipeline library does not span device {device}"))
        })?;
        library.serialized_data()
    }

    /// Checks if the owning library of `handle` holds unserialized state.
    pub fn is_merge_required(&self, handle: PipelineLibraryHandle) -> RhiResult<bool> {
        Ok(self.entry(handle)?.library.is_merge_required())
    }

    /// The number of states in the global cache of `handle`.
    pub fn global_state_count(&self, handle: PipelineLibraryHandle) -> RhiResult<usize> {
        Ok(read(&self.entry(handle)?.global).len())
    }

    /// The number of states compiled or compiling since the last compaction.
    pub fn pending_state_count(&self, handle: PipelineLibraryHandle) -> RhiResult<usize> {
        Ok(lock(&self.entry(handle)?.pending).len())
    }

    /// The number of registered libraries.
    pub fn library_count(&self) -> usize {
        read(&self.libraries).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiters_see_the_published_result() {
        let pending = Arc::new(PendingCompile::<u32>::new());
        assert!(!pending.is_published());

        let waiter = {
            let pending = pending.clone();
            std::thread::spawn(move || pending.wait())
        };
        PublishGuard {
            pending: pending.clone(),
        }
        .publish(Ok(7));

        assert_eq!(waiter.join().unwrap().unwrap(), 7);
        assert_eq!(pending.wait().unwrap(), 7);
    }

    #[test]
    fn test_panicking_compile_releases_waiters_with_a_failure() {
        let pending = Arc::new(PendingCompile::<u32>::new());
        let waiter = {
            let pending = pending.clone();
            std::thread::spawn(move || pending.wait())
        };

        let compiler = {
            let pending = pending.clone();
            std::thread::spawn(move || {
                let _guard = PublishGuard { pending };
                panic!("backend compiler crashed");
            })
        };
        assert!(compiler.join().is_err());

        assert!(pending.is_published());
        assert!(matches!(waiter.join().unwrap(), Err(RhiError::Fail(_))));
    }
}
