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

//! Per-device arena of layout objects.
//!
//! Pipeline layouts and shader resource group layouts are shared by many pools
//! and pipeline states. Instead of reference-counted pointers between them, each
//! device interns layouts here and hands out generational handles. A handle that
//! outlives its layout fails with [`RhiError::StaleHandle`] instead of dangling.

use crate::error::{RhiError, RhiResult};
use crate::pipeline::PipelineLayoutDescriptor;
use crate::srg::ShaderResourceGroupLayout;
use crate::sync::lock;
use slotmap::{new_key_type, Key, SlotMap};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

new_key_type! {
    /// A handle to an interned [`ShaderResourceGroupLayout`].
    pub struct SrgLayoutHandle;
    /// A handle to an interned [`PipelineLayoutDescriptor`].
    pub struct PipelineLayoutHandle;
}

struct Entry<V> {
    value: Arc<V>,
    hash: u64,
    ref_count: u32,
}

struct InternTable<K: Key, V> {
    slots: SlotMap<K, Entry<V>>,
    by_hash: HashMap<u64, K>,
}

impl<K: Key, V: Hash + Eq> InternTable<K, V> {
    fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            by_hash: HashMap::new(),
        }
    }

    fn intern(&mut self, value: Arc<V>) -> K {
        let hash = content_hash(&*value);
        if let Some(&key) = self.by_hash.get(&hash) {
            if let Some(entry) = self.slots.get_mut(key) {
                if *entry.value == *value {
                    entry.ref_count += 1;
                    return key;
                }
            }
        }
        let key = self.slots.insert(Entry {
            value,
            hash,
            ref_count: 1,
        });
        self.by_hash.entry(hash).or_insert(key);
        key
    }

    fn get(&self, key: K, kind: &'static str) -> RhiResult<Arc<V>> {
        self.slots
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or(RhiError::StaleHandle(kind))
    }

    fn release(&mut self, key: K, kind: &'static str) -> RhiResult<()> {
        let entry = self.slots.get_mut(key).ok_or(RhiError::StaleHandle(kind))?;
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            let hash = entry.hash;
            self.slots.remove(key);
            if self.by_hash.get(&hash) == Some(&key) {
                self.by_hash.remove(&hash);
            }
        }
        Ok(())
    }
}

fn content_hash<V: Hash>(value: &V) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Interns the layout objects of one device.
pub struct LayoutArena {
    srg_layouts: Mutex<InternTable<SrgLayoutHandle, ShaderResourceGroupLayout>>,
    pipeline_layouts: Mutex<InternTable<PipelineLayoutHandle, PipelineLayoutDescriptor>>,
}

impl Default for LayoutArena {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            srg_layouts: Mutex::new(InternTable::new()),
            pipeline_layouts: Mutex::new(InternTable::new()),
        }
    }

    /// Interns a shader resource group layout.
    ///
    /// Interning a layout equal to one already present returns the existing handle
    /// and adds a reference to it.
    pub fn intern_srg_layout(&self, layout: Arc<ShaderResourceGroupLayout>) -> SrgLayoutHandle {
        lock(&self.srg_layouts).intern(layout)
    }

    /// Resolves a shader resource group layout handle.
    pub fn srg_layout(&self, handle: SrgLayoutHandle) -> RhiResult<Arc<ShaderResourceGroupLayout>> {
        lock(&self.srg_layouts).get(handle, "shader resource group layout")
    }

    /// Drops one reference to a shader resource group layout.
    pub fn release_srg_layout(&self, handle: SrgLayoutHandle) -> RhiResult<()> {
        lock(&self.srg_layouts).release(handle, "shader resource group layout")
    }

    /// Interns a pipeline layout.
    pub fn intern_pipeline_layout(
        &self,
        layout: Arc<PipelineLayoutDescriptor>,
    ) -> PipelineLayoutHandle {
        lock(&self.pipeline_layouts).intern(layout)
    }

    /// Resolves a pipeline layout handle.
    pub fn pipeline_layout(
        &self,
        handle: PipelineLayoutHandle,
    ) -> RhiResult<Arc<PipelineLayoutDescriptor>> {
        lock(&self.pipeline_layouts).get(handle, "pipeline layout")
    }

    /// Drops one reference to a pipeline layout.
    pub fn release_pipeline_layout(&self, handle: PipelineLayoutHandle) -> RhiResult<()> {
        lock(&self.pipeline_layouts).release(handle, "pipeline layout")
    }

    /// The number of distinct shader resource group layouts alive.
    pub fn srg_layout_count(&self) -> usize {
        lock(&self.srg_layouts).slots.len()
    }

    /// The number of distinct pipeline layouts alive.
    pub fn pipeline_layout_count(&self) -> usize {
        lock(&self.pipeline_layouts).slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srg::ShaderInputBufferDescriptor;

    fn layout(name: &str) -> Arc<ShaderResourceGroupLayout> {
        Arc::new(
            ShaderResourceGroupLayout::new(name, 1)
                .with_buffer_input(ShaderInputBufferDescriptor::read("lights", 1)),
        )
    }

    #[test]
    fn equal_layouts_share_a_handle() {
        let arena = LayoutArena::new();
        let a = arena.intern_srg_layout(layout("view"));
        let b = arena.intern_srg_layout(layout("view"));
        let c = arena.intern_srg_layout(layout("material"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.srg_layout_count(), 2);
    }

    #[test]
    fn released_handle_becomes_stale() {
        let arena = LayoutArena::new();
        let a = arena.intern_srg_layout(layout("view"));
        let b = arena.intern_srg_layout(layout("view"));

        arena.release_srg_layout(a).unwrap();
        assert_eq!(arena.srg_layout(b).unwrap().name(), "view");

        arena.release_srg_layout(b).unwrap();
        assert!(matches!(
            arena.srg_layout(a),
            Err(RhiError::StaleHandle(_))
        ));
        assert!(matches!(
            arena.release_srg_layout(a),
            Err(RhiError::StaleHandle(_))
        ));
        assert_eq!(arena.srg_layout_count(), 0);
    }

    #[test]
    fn slot_reuse_does_not_revive_old_handles() {
        let arena = LayoutArena::new();
        let old = arena.intern_srg_layout(layout("view"));
        arena.release_srg_layout(old).unwrap();

        let new = arena.intern_srg_layout(layout("shadow"));
        assert_ne!(old, new);
        assert!(arena.srg_layout(old).is_err());
        assert_eq!(arena.srg_layout(new).unwrap().name(), "shadow");
    }

    #[test]
    fn pipeline_layouts_are_interned() {
        let arena = LayoutArena::new();
        let descriptor = Arc::new(PipelineLayoutDescriptor::new("forward").with_srg_layout(
            ShaderResourceGroupLayout::new("view", 0),
        ));
        let a = arena.intern_pipeline_layout(descriptor.clone());
        let b = arena.intern_pipeline_layout(descriptor);
        assert_eq!(a, b);
        assert_eq!(arena.pipeline_layout_count(), 1);
        arena.release_pipeline_layout(a).unwrap();
        assert_eq!(arena.pipeline_layout_count(), 1);
        arena.release_pipeline_layout(b).unwrap();
        assert_eq!(arena.pipeline_layout_count(), 0);
    }
}
