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

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use strata_rhi::pipeline::PipelineStateType;
use strata_rhi::{NativePipelineLibrary, RhiError, RhiResult};

/// The on-disk form of a [`NullPipelineLibrary`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct SerializedLibrary {
    version: u32,
    pipeline_hashes: Vec<u64>,
}

const LIBRARY_VERSION: u32 = 1;

/// A pipeline library that remembers the content hash of every state compiled
/// through it.
#[derive(Debug, Default)]
pub struct NullPipelineLibrary {
    entries: Mutex<BTreeSet<u64>>,
    dirty: AtomicBool,
}

impl NullPipelineLibrary {
    /// Creates a library, seeded with data from [`NativePipelineLibrary::serialized_data`].
    ///
    /// Unreadable seeds are dropped with a warning and the library starts empty.
    pub fn new(seed: Option<&[u8]>) -> Self {
        let library = Self::default();
        let Some(bytes) = seed else {
            return library;
        };
        match bincode::serde::decode_from_slice::<SerializedLibrary, _>(
            bytes,
            bincode::config::standard(),
        ) {
            Ok((serialized, _)) if serialized.version == LIBRARY_VERSION => {
                library.entries().extend(serialized.pipeline_hashes);
            }
            Ok((serialized, _)) => log::warn!(
                "Ignoring pipeline library seed of version {} (expected {LIBRARY_VERSION})",
                serialized.version
            ),
            Err(err) => log::warn!("Ignoring unreadable pipeline library seed: {err}"),
        }
        library
    }

    fn entries(&self) -> MutexGuard<'_, BTreeSet<u64>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a compiled state. Returns `true` if the library did not hold it yet.
    pub fn insert(&self, hash: u64) -> bool {
        let inserted = self.entries().insert(hash);
        if inserted {
            self.dirty.store(true, Ordering::Release);
        }
        inserted
    }

    /// Checks if a state with this content hash was compiled through the library.
    pub fn contains(&self, hash: u64) -> bool {
        self.entries().contains(&hash)
    }

    /// The number of distinct states held.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Checks if the library holds no state.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl NativePipelineLibrary for NullPipelineLibrary {
    fn merge_from(&self, libraries: &[&Self]) -> RhiResult<()> {
        // Sources are copied out first so merging a library into itself cannot deadlock.
        let mut incoming = Vec::new();
        for library in libraries {
            if std::ptr::eq(*library, self) {
                continue;
            }
            incoming.extend(library.entries().iter().copied());
        }
        let mut entries = self.entries();
        let before = entries.len();
        entries.extend(incoming);
        if entries.len() != before {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn is_merge_required(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn serialized_data(&self) -> RhiResult<Vec<u8>> {
        let serialized = SerializedLibrary {
            version: LIBRARY_VERSION,
            pipeline_hashes: self.entries().iter().copied().collect(),
        };
        let bytes = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())
            .map_err(|err| RhiError::Fail(format!("pipeline library serialization failed: {err}")))?;
        self.dirty.store(false, Ordering::Release);
        Ok(bytes)
    }
}

/// A compiled pipeline state. Compiling is free; the state only remembers what it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullPipelineState {
    hash: u64,
    pipeline_type: PipelineStateType,
}

impl NullPipelineState {
    pub(crate) fn new(hash: u64, pipeline_type: PipelineStateType) -> Self {
        Self {
            hash,
            pipeline_type,
        }
    }

    /// The content hash of the descriptor the state was compiled from.
    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// The kind of work the state runs.
    pub fn pipeline_type(&self) -> PipelineStateType {
        self.pipeline_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_data_seeds_a_new_library() {
        let library = NullPipelineLibrary::new(None);
        assert!(library.insert(7));
        assert!(!library.insert(7));
        library.insert(11);
        assert!(library.is_merge_required());

        let bytes = library.serialized_data().unwrap();
        assert!(!library.is_merge_required());

        let seeded = NullPipelineLibrary::new(Some(&bytes));
        assert_eq!(seeded.len(), 2);
        assert!(seeded.contains(7) && seeded.contains(11));
        assert!(!seeded.is_merge_required());
    }

    #[test]
    fn garbage_seed_starts_empty() {
        let library = NullPipelineLibrary::new(Some(&[0xff, 0xff, 0xff]));
        assert!(library.is_empty());
    }

    #[test]
    fn merge_collects_sources_and_skips_self() {
        let target = NullPipelineLibrary::new(None);
        let a = NullPipelineLibrary::new(None);
        let b = NullPipelineLibrary::new(None);
        a.insert(1);
        b.insert(2);
        b.insert(1);

        target.merge_from(&[&a, &b, &target]).unwrap();
        assert_eq!(target.len(), 2);
        assert!(target.is_merge_required());
    }
}
