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

//! The per-device registry of live resource pools.

use super::{ResourcePool, ResourcePoolResolver, ResourcePoolType};
use crate::sync::{read, write};
use std::sync::{Arc, RwLock};

/// Identity of a pool: the address of its data, independent of the trait object
/// it is viewed through.
fn pool_key(pool: &dyn ResourcePool) -> usize {
    std::ptr::from_ref(pool).cast::<()>() as usize
}

fn arc_key(pool: &Arc<dyn ResourcePool>) -> usize {
    Arc::as_ptr(pool).cast::<()>() as usize
}

#[derive(Default)]
struct Registry {
    pools: Vec<Arc<dyn ResourcePool>>,
    buffer_pools: Vec<Arc<dyn ResourcePool>>,
    image_pools: Vec<Arc<dyn ResourcePool>>,
    srg_pools: Vec<Arc<dyn ResourcePool>>,
    resolvers: Vec<(usize, Arc<dyn ResourcePoolResolver>)>,
}

impl Registry {
    fn typed_list(&mut self, pool_type: ResourcePoolType) -> &mut Vec<Arc<dyn ResourcePool>> {
        match pool_type {
            ResourcePoolType::Buffer => &mut self.buffer_pools,
            ResourcePoolType::Image => &mut self.image_pools,
            ResourcePoolType::ShaderResourceGroup => &mut self.srg_pools,
        }
    }
}

fn remove_by_key(list: &mut Vec<Arc<dyn ResourcePool>>, key: usize) -> bool {
    match list.iter().position(|pool| arc_key(pool) == key) {
        Some(position) => {
            list.remove(position);
            true
        }
        None => false,
    }
}

/// Indexes every live pool of a device, by pool type.
///
/// Attaching and detaching take the write lock; enumeration takes the read lock,
/// so callbacks passed to the `for_each_*` methods must not attach or detach pools.
/// Pools must all be detached before the database is dropped.
#[derive(Default)]
pub struct ResourcePoolDatabase {
    registry: RwLock<Registry>,
}

impl ResourcePoolDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool, and its resolver when it has one.
    pub fn attach_pool(
        &self,
        pool: Arc<dyn ResourcePool>,
        resolver: Option<Arc<dyn ResourcePoolResolver>>,
    ) {
        let key = arc_key(&pool);
        let mut registry = write(&self.registry);
        if registry.pools.iter().any(|existing| arc_key(existing) == key) {
            log::warn!("Pool '{}' is already attached", pool.name());
            return;
        }
        log::trace!("Attaching {:?} pool '{}'", pool.pool_type(), pool.name());
        registry.typed_list(pool.pool_type()).push(pool.clone());
        registry.pools.push(pool);
        if let Some(resolver) = resolver {
            registry.resolvers.push((key, resolver));
        }
    }

    /// Unregisters a pool and its resolver.
    ///
    /// # Returns
    ///
    /// `false` if the pool was not attached.
    pub fn detach_pool(&self, pool: &dyn ResourcePool) -> bool {
        let key = pool_key(pool);
        let mut registry = write(&self.registry);
        if !remove_by_key(&mut registry.pools, key) {
            return false;
        }
        remove_by_key(registry.typed_list(pool.pool_type()), key);
        registry.resolvers.retain(|(owner, _)| *owner != key);
        log::trace!("Detached {:?} pool '{}'", pool.pool_type(), pool.name());
        true
    }

    /// Checks if a pool is attached.
    pub fn contains_pool(&self, pool: &dyn ResourcePool) -> bool {
        let key = pool_key(pool);
        read(&self.registry)
            .pools
            .iter()
            .any(|existing| arc_key(existing) == key)
    }

    /// The number of attached pools of every type.
    pub fn pool_count(&self) -> usize {
        read(&self.registry).pools.len()
    }

    /// The number of attached buffer pools.
    pub fn buffer_pool_count(&self) -> usize {
        read(&self.registry).buffer_pools.len()
    }

    /// The number of attached image pools.
    pub fn image_pool_count(&self) -> usize {
        read(&self.registry).image_pools.len()
    }

    /// The number of attached shader resource group pools.
    pub fn srg_pool_count(&self) -> usize {
        read(&self.registry).srg_pools.len()
    }

    /// The number of attached resolvers.
    pub fn resolver_count(&self) -> usize {
        read(&self.registry).resolvers.len()
    }

    /// Checks if no pool or resolver is attached.
    pub fn is_empty(&self) -> bool {
        let registry = read(&self.registry);
        registry.pools.is_empty() && registry.resolvers.is_empty()
    }

    /// Visits every pool, in attach order.
    pub fn for_each_pool(&self, mut f: impl FnMut(&dyn ResourcePool)) {
        for pool in &read(&self.registry).pools {
            f(pool.as_ref());
        }
    }

    /// Visits every buffer pool, in attach order.
    pub fn for_each_buffer_pool(&self, mut f: impl FnMut(&dyn ResourcePool)) {
        for pool in &read(&self.registry).buffer_pools {
            f(pool.as_ref());
        }
    }

    /// Visits every image pool, in attach order.
    pub fn for_each_image_pool(&self, mut f: impl FnMut(&dyn ResourcePool)) {
        for pool in &read(&self.registry).image_pools {
            f(pool.as_ref());
        }
    }

    /// Visits every shader resource group pool, in attach order.
    pub fn for_each_srg_pool(&self, mut f: impl FnMut(&dyn ResourcePool)) {
        for pool in &read(&self.registry).srg_pools {
            f(pool.as_ref());
        }
    }

    /// Visits every resolver, in attach order.
    pub fn for_each_resolver(&self, mut f: impl FnMut(&dyn ResourcePoolResolver)) {
        for (_, resolver) in &read(&self.registry).resolvers {
            f(resolver.as_ref());
        }
    }

    /// A snapshot of the attached resolvers.
    ///
    /// Resolvers run without the database lock held, so they may attach pools.
    pub fn resolvers(&self) -> Vec<Arc<dyn ResourcePoolResolver>> {
        read(&self.registry)
            .resolvers
            .iter()
            .map(|(_, resolver)| resolver.clone())
            .collect()
    }

    /// Asks every pool to release unused memory.
    pub fn compact_pools(&self) {
        self.for_each_pool(|pool| pool.compact());
    }

    /// Detaches everything without notifying the pools.
    pub fn clear(&self) {
        *write(&self.registry) = Registry::default();
    }
}

impl Drop for ResourcePoolDatabase {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if registry.pools.is_empty() && registry.resolvers.is_empty() {
            return;
        }
        log::error!(
            "ResourcePoolDatabase dropped with {} pool(s) and {} resolver(s) still attached",
            registry.pools.len(),
            registry.resolvers.len()
        );
        if !std::thread::panicking() {
            debug_assert!(false, "every pool must be detached before its database is dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::PoolMemoryUsage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestPool {
        name: &'static str,
        pool_type: ResourcePoolType,
        compacted: AtomicUsize,
    }

    impl TestPool {
        fn new(name: &'static str, pool_type: ResourcePoolType) -> Arc<Self> {
            Arc::new(Self {
                name,
                pool_type,
                compacted: AtomicUsize::new(0),
            })
        }
    }

    impl ResourcePool for TestPool {
        fn name(&self) -> &str {
            self.name
        }
        fn pool_type(&self) -> ResourcePoolType {
            self.pool_type
        }
        fn resource_count(&self) -> usize {
            0
        }
        fn memory_usage(&self) -> PoolMemoryUsage {
            PoolMemoryUsage::default()
        }
        fn compact(&self) {
            self.compacted.fetch_add(1, Ordering::Relaxed);
        }
    }

    impl ResourcePoolResolver for TestPool {
        fn compile(&self) -> crate::RhiResult<()> {
            Ok(())
        }
    }

    fn names(database: &ResourcePoolDatabase) -> Vec<String> {
        let mut names = Vec::new();
        database.for_each_pool(|pool| names.push(pool.name().to_string()));
        names
    }

    #[test]
    fn detaching_one_buffer_pool_updates_every_list() {
        let database = ResourcePoolDatabase::new();
        let buffers: Vec<_> = ["b0", "b1", "b2"]
            .into_iter()
            .map(|name| TestPool::new(name, ResourcePoolType::Buffer))
            .collect();
        let images: Vec<_> = ["i0", "i1"]
            .into_iter()
            .map(|name| TestPool::new(name, ResourcePoolType::Image))
            .collect();
        for pool in buffers.iter().chain(&images) {
            database.attach_pool(pool.clone(), None);
        }
        assert_eq!(database.buffer_pool_count(), 3);
        assert_eq!(database.image_pool_count(), 2);

        assert!(database.detach_pool(buffers[1].as_ref()));
        assert_eq!(database.buffer_pool_count(), 2);
        assert_eq!(database.pool_count(), 4);
        assert!(!database.contains_pool(buffers[1].as_ref()));
        assert_eq!(names(&database), vec!["b0", "b2", "i0", "i1"]);

        let mut buffer_names = Vec::new();
        database.for_each_buffer_pool(|pool| buffer_names.push(pool.name().to_string()));
        assert_eq!(buffer_names, vec!["b0", "b2"]);

        database.clear();
    }

    #[test]
    fn attach_then_detach_restores_the_database() {
        let database = ResourcePoolDatabase::new();
        let existing = TestPool::new("existing", ResourcePoolType::Image);
        database.attach_pool(existing.clone(), None);
        let before = (
            database.pool_count(),
            database.buffer_pool_count(),
            database.image_pool_count(),
            database.srg_pool_count(),
            database.resolver_count(),
            names(&database),
        );

        let srg_pool = TestPool::new("srg", ResourcePoolType::ShaderResourceGroup);
        database.attach_pool(srg_pool.clone(), Some(srg_pool.clone()));
        assert_eq!(database.srg_pool_count(), 1);
        assert_eq!(database.resolver_count(), 1);
        assert!(database.detach_pool(srg_pool.as_ref()));

        let after = (
            database.pool_count(),
            database.buffer_pool_count(),
            database.image_pool_count(),
            database.srg_pool_count(),
            database.resolver_count(),
            names(&database),
        );
        assert_eq!(before, after);

        assert!(database.detach_pool(existing.as_ref()));
        assert!(database.is_empty());
    }

    #[test]
    fn detaching_an_unknown_pool_is_reported() {
        let database = ResourcePoolDatabase::new();
        let pool = TestPool::new("stray", ResourcePoolType::Buffer);
        assert!(!database.detach_pool(pool.as_ref()));
    }

    #[test]
    fn attaching_twice_is_ignored() {
        let database = ResourcePoolDatabase::new();
        let pool = TestPool::new("twice", ResourcePoolType::Buffer);
        database.attach_pool(pool.clone(), None);
        database.attach_pool(pool.clone(), None);
        assert_eq!(database.pool_count(), 1);
        database.detach_pool(pool.as_ref());
    }

    #[test]
    fn compact_visits_every_pool() {
        let database = ResourcePoolDatabase::new();
        let a = TestPool::new("a", ResourcePoolType::Buffer);
        let b = TestPool::new("b", ResourcePoolType::Image);
        database.attach_pool(a.clone(), None);
        database.attach_pool(b.clone(), None);
        database.compact_pools();
        assert_eq!(a.compacted.load(Ordering::Relaxed), 1);
        assert_eq!(b.compacted.load(Ordering::Relaxed), 1);
        database.clear();
    }
}
