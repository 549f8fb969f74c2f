//! Result caching for dynamically expanding computation graphs.
//!
//! The execution engine binds a cache to each evaluation pass, looks up or
//! stores per-node outputs, and cleans the cache when the pass ends. Two
//! caches are provided behind the [`ExecutionCache`] trait:
//!
//! - [`HierarchicalCache`]: a tree of scopes mirroring sub-graph expansion,
//!   cleaned by exact reachability.
//! - [`GenerationalCache`]: a capacity-bounded cache evicting by generation.
//!
//! Both derive keys through a [`CacheKeySet`] with the configured
//! [`KeyStrategy`].

#![warn(missing_docs)]

pub mod basic;
pub mod binding;
pub mod dump;
pub mod error;
pub mod generational;
pub mod hierarchical;
pub mod keys;

use std::collections::BTreeSet;

use kiln_config::{CacheMode, CacheSettings, KeyKind};
use kiln_graph::NodeId;

pub use basic::BasicCache;
pub use binding::{AllIdempotent, Binding, ChangedOracle, NoChanges, NodeRegistry};
pub use dump::DumpEntry;
pub use error::{CacheError, CacheResult};
pub use generational::GenerationalCache;
pub use hierarchical::HierarchicalCache;
pub use keys::{CacheKey, CacheKeySet, KeyStrategy};

/// The cache surface the execution engine drives.
pub trait ExecutionCache<V> {
    /// Binds the cache to the top-level node ids of a new pass.
    fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()>;

    /// Looks up a node's cached output; `Ok(None)` on any miss.
    fn get(&mut self, binding: &Binding<'_>, node_id: &str) -> CacheResult<Option<&V>>;

    /// Stores a node's output.
    fn set(&mut self, binding: &Binding<'_>, node_id: &str, value: V) -> CacheResult<()>;

    /// Creates or rebinds the scope for the children `node_id` expanded into.
    fn ensure_subcache_for(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<()>;

    /// Reclaims space once a pass has finished.
    fn clean_unused(&mut self) -> CacheResult<()>;

    /// Every node id the cache currently has keys for.
    fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>>;

    /// Lists every entry and nested scope.
    fn debug_dump(&self) -> Vec<DumpEntry<'_, V>>;

    /// Number of cached outputs.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> ExecutionCache<V> for HierarchicalCache<V> {
    fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        HierarchicalCache::set_prompt(self, binding, node_ids)
    }

    fn get(&mut self, binding: &Binding<'_>, node_id: &str) -> CacheResult<Option<&V>> {
        HierarchicalCache::get(self, binding, node_id)
    }

    fn set(&mut self, binding: &Binding<'_>, node_id: &str, value: V) -> CacheResult<()> {
        HierarchicalCache::set(self, binding, node_id, value)
    }

    fn ensure_subcache_for(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<()> {
        HierarchicalCache::ensure_subcache_for(self, binding, node_id, child_ids).map(|_| ())
    }

    fn clean_unused(&mut self) -> CacheResult<()> {
        HierarchicalCache::clean_unused(self)
    }

    fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>> {
        HierarchicalCache::all_node_ids(self)
    }

    fn debug_dump(&self) -> Vec<DumpEntry<'_, V>> {
        HierarchicalCache::debug_dump(self)
    }

    fn len(&self) -> usize {
        HierarchicalCache::len(self)
    }
}

impl<V> ExecutionCache<V> for GenerationalCache<V> {
    fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        GenerationalCache::set_prompt(self, binding, node_ids)
    }

    fn get(&mut self, _binding: &Binding<'_>, node_id: &str) -> CacheResult<Option<&V>> {
        GenerationalCache::get(self, node_id)
    }

    fn set(&mut self, _binding: &Binding<'_>, node_id: &str, value: V) -> CacheResult<()> {
        GenerationalCache::set(self, node_id, value)
    }

    fn ensure_subcache_for(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<()> {
        GenerationalCache::ensure_subcache_for(self, binding, node_id, child_ids)
    }

    fn clean_unused(&mut self) -> CacheResult<()> {
        GenerationalCache::clean_unused(self)
    }

    fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>> {
        GenerationalCache::all_node_ids(self)
    }

    fn debug_dump(&self) -> Vec<DumpEntry<'_, V>> {
        GenerationalCache::debug_dump(self)
    }

    fn len(&self) -> usize {
        GenerationalCache::len(self)
    }
}

impl From<&CacheSettings> for KeyStrategy {
    fn from(settings: &CacheSettings) -> Self {
        match settings.key {
            KeyKind::Identity => KeyStrategy::Identity,
            KeyKind::InputSignature => KeyStrategy::InputSignature {
                include_node_id: settings.include_node_id,
            },
        }
    }
}

/// Builds the cache selected by `settings`.
pub fn build_cache<V: 'static>(settings: &CacheSettings) -> Box<dyn ExecutionCache<V>> {
    let strategy = KeyStrategy::from(settings);
    match settings.mode {
        CacheMode::Hierarchical => Box::new(HierarchicalCache::new(strategy)),
        CacheMode::Lru => Box::new(GenerationalCache::new(strategy, settings.lru_capacity)),
    }
}
