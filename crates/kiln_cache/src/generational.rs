//! Capacity-bounded cache with generation-based eviction.
//!
//! Each binding pass opens a new generation. Entries remember the last
//! generation they were touched in, and cleaning evicts whole generations,
//! oldest first, until the entry count fits the capacity. This approximates
//! LRU: a pass that touches more entries than the capacity keeps all of them
//! until a later generation makes them old.

use std::collections::{BTreeSet, HashMap, HashSet};

use kiln_graph::NodeId;

use crate::basic::BasicCache;
use crate::binding::Binding;
use crate::dump::DumpEntry;
use crate::error::{CacheError, CacheResult};
use crate::keys::{CacheKey, KeyStrategy};

/// A single-scope cache that evicts by generation.
///
/// Nested scopes are kept only to track which expanded children are live;
/// every value is stored in the root scope, keyed by its data key.
#[derive(Debug)]
pub struct GenerationalCache<V> {
    root: BasicCache<V>,
    capacity: usize,
    generation: u64,
    min_generation: u64,
    used_generation: HashMap<CacheKey, u64>,
    children: HashMap<CacheKey, Vec<CacheKey>>,
}

impl<V> GenerationalCache<V> {
    /// Creates an empty, unbound cache holding about `capacity` entries.
    pub fn new(strategy: KeyStrategy, capacity: usize) -> Self {
        Self {
            root: BasicCache::new(strategy),
            capacity,
            generation: 0,
            min_generation: 0,
            used_generation: HashMap::new(),
            children: HashMap::new(),
        }
    }

    /// The configured entry capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The oldest generation still retained.
    pub fn min_generation(&self) -> u64 {
        self.min_generation
    }

    /// Binds a new pass, opening a generation in which every given node is used.
    pub fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        self.root.set_prompt(binding, node_ids)?;
        self.generation += 1;
        tracing::debug!(generation = self.generation, nodes = node_ids.len(), "opened generation");
        for node_id in node_ids {
            self.mark_used(node_id)?;
        }
        Ok(())
    }

    // Unrepresentable keys never match again, so tracking them would only leak.
    fn mark_used(&mut self, node_id: &str) -> CacheResult<()> {
        if let Some(key) = self.root.key_set()?.get_data_key(node_id) {
            if key.is_representable() {
                self.used_generation.insert(key.clone(), self.generation);
            }
        }
        Ok(())
    }

    /// Looks up a node's cached output, marking it used.
    pub fn get(&mut self, node_id: &str) -> CacheResult<Option<&V>> {
        self.mark_used(node_id)?;
        self.root.get(node_id)
    }

    /// Stores a node's output, marking it used.
    pub fn set(&mut self, node_id: &str, value: V) -> CacheResult<()> {
        self.mark_used(node_id)?;
        self.root.set(node_id, value)
    }

    /// Records that `node_id` expanded into `child_ids`.
    ///
    /// The children's keys join the root key set so their outputs are cached
    /// alongside everything else, and the parent and children are all marked
    /// used in the current generation.
    pub fn ensure_subcache_for(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<()> {
        self.root.ensure_subcache(binding, node_id, child_ids)?;
        self.root.key_set_mut()?.add_keys(binding, child_ids)?;
        self.mark_used(node_id)?;

        let key_set = self.root.key_set()?;
        let parent_key = key_set
            .get_data_key(node_id)
            .cloned()
            .ok_or_else(|| CacheError::UnboundNode {
                node_id: node_id.to_string(),
            })?;
        if parent_key.is_representable() {
            let child_keys = child_ids
                .iter()
                .filter_map(|child_id| key_set.get_data_key(child_id).cloned())
                .collect();
            self.children.insert(parent_key, child_keys);
        }
        for child_id in child_ids {
            self.mark_used(child_id)?;
        }
        Ok(())
    }

    /// The data keys of the children `node_id` last expanded into.
    pub fn child_keys(&self, node_id: &str) -> CacheResult<Option<&[CacheKey]>> {
        Ok(self
            .root
            .key_set()?
            .get_data_key(node_id)
            .and_then(|key| self.children.get(key))
            .map(Vec::as_slice))
    }

    /// Evicts whole generations, oldest first, while the cache is over capacity.
    ///
    /// Outputs stored under unrepresentable keys are dropped on every call, as
    /// is bookkeeping for keys with neither a cached output nor a current node.
    pub fn clean_unused(&mut self) -> CacheResult<()> {
        let dropped = self.root.retain_entries(CacheKey::is_representable);
        if dropped > 0 {
            tracing::trace!(dropped, "dropped unrepresentable entries");
        }
        self.prune_tracking()?;
        while self.root.len() > self.capacity && self.min_generation < self.generation {
            self.min_generation += 1;
            let min_generation = self.min_generation;
            self.used_generation
                .retain(|_, generation| *generation >= min_generation);
            let used = &self.used_generation;
            let evicted = self.root.retain_entries(|key| used.contains_key(key));
            self.children.retain(|key, _| used.contains_key(key));
            tracing::debug!(min_generation, evicted, "evicted generation");
        }
        self.root.clean_subcaches()?;
        if self.root.len() > self.capacity {
            tracing::debug!(
                entries = self.root.len(),
                capacity = self.capacity,
                "generation exceeds capacity"
            );
        }
        Ok(())
    }

    fn prune_tracking(&mut self) -> CacheResult<()> {
        let current: HashSet<&CacheKey> = self.root.key_set()?.get_used_keys().collect();
        let root = &self.root;
        self.used_generation
            .retain(|key, _| root.contains_key(key) || current.contains(key));
        let used = &self.used_generation;
        self.children.retain(|key, _| used.contains_key(key));
        Ok(())
    }

    /// Every node id known to any scope.
    pub fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>> {
        self.root.all_node_ids()
    }

    /// Number of cached outputs.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Lists every entry and tracking scope.
    pub fn debug_dump(&self) -> Vec<DumpEntry<'_, V>> {
        self.root.debug_dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::Value;
    use kiln_graph::{inputs, DynamicPrompt, NodeRecord, Prompt};

    fn ids(list: &[&str]) -> Vec<NodeId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn constants(names: &[&str]) -> Prompt {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.to_string(),
                    NodeRecord::new("Constant", inputs([("value", Value::from(i))])),
                )
            })
            .collect()
    }

    fn values(cache: &GenerationalCache<&'static str>) -> BTreeSet<&'static str> {
        cache
            .debug_dump()
            .into_iter()
            .filter_map(|entry| match entry {
                DumpEntry::Value { value, .. } => Some(*value),
                DumpEntry::Subcache { .. } => None,
            })
            .collect()
    }

    #[test]
    fn evicts_oldest_generation_first() {
        let p = constants(&["A", "B", "C"]);
        let binding = Binding::new(&p);
        let mut cache = GenerationalCache::new(KeyStrategy::input_signature(), 2);
        for (id, value) in [("A", "a"), ("B", "b"), ("C", "c")] {
            cache.set_prompt(&binding, &ids(&[id])).unwrap();
            cache.set(id, value).unwrap();
            cache.clean_unused().unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(values(&cache), ["b", "c"].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(cache.generation(), 3);
        assert_eq!(cache.min_generation(), 2);

        cache.set_prompt(&binding, &ids(&["A", "C"])).unwrap();
        assert_eq!(cache.get("A").unwrap(), None);
        assert_eq!(cache.get("C").unwrap(), Some(&"c"));
    }

    #[test]
    fn touching_an_entry_keeps_it_young() {
        let p = constants(&["A", "B", "C"]);
        let binding = Binding::new(&p);
        let mut cache = GenerationalCache::new(KeyStrategy::Identity, 2);
        cache.set_prompt(&binding, &ids(&["A"])).unwrap();
        cache.set("A", "a").unwrap();
        cache.set_prompt(&binding, &ids(&["B"])).unwrap();
        cache.set("B", "b").unwrap();
        cache.set_prompt(&binding, &ids(&["A", "C"])).unwrap();
        cache.set("C", "c").unwrap();
        cache.clean_unused().unwrap();
        assert_eq!(values(&cache), ["a", "c"].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn single_generation_may_exceed_capacity() {
        let p = constants(&["A", "B", "C"]);
        let binding = Binding::new(&p);
        let mut cache = GenerationalCache::new(KeyStrategy::input_signature(), 2);
        cache.set_prompt(&binding, &ids(&["A", "B", "C"])).unwrap();
        for (id, value) in [("A", "a"), ("B", "b"), ("C", "c")] {
            cache.set(id, value).unwrap();
        }
        cache.clean_unused().unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.min_generation(), cache.generation());
    }

    #[test]
    fn under_capacity_nothing_is_evicted() {
        let p = constants(&["A", "B"]);
        let binding = Binding::new(&p);
        let mut cache = GenerationalCache::new(KeyStrategy::input_signature(), 10);
        cache.set_prompt(&binding, &ids(&["A"])).unwrap();
        cache.set("A", "a").unwrap();
        cache.set_prompt(&binding, &ids(&["B"])).unwrap();
        cache.clean_unused().unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.min_generation(), 0);
    }

    #[test]
    fn unbound_cache_is_an_error() {
        let mut cache: GenerationalCache<i32> = GenerationalCache::new(KeyStrategy::Identity, 1);
        assert_eq!(cache.get("A").unwrap_err(), CacheError::Unbound);
        assert_eq!(cache.set("A", 1).unwrap_err(), CacheError::Unbound);
        assert_eq!(cache.clean_unused().unwrap_err(), CacheError::Unbound);
    }

    #[test]
    fn expanded_children_are_cached_at_root() {
        let mut dynprompt = DynamicPrompt::new(constants(&["P"]));
        let child = NodeRecord::new("Constant", inputs([("value", Value::Int(5))]));
        dynprompt.add_ephemeral_node("X", child, "P", "P").unwrap();
        let binding = Binding::new(&dynprompt);
        let mut cache = GenerationalCache::new(KeyStrategy::input_signature(), 10);
        cache.set_prompt(&binding, &ids(&["P"])).unwrap();
        cache.ensure_subcache_for(&binding, "P", &ids(&["X"])).unwrap();
        cache.set("X", "x").unwrap();
        cache.set("P", "p").unwrap();

        assert_eq!(cache.get("X").unwrap(), Some(&"x"));
        assert_eq!(cache.child_keys("P").unwrap().map(<[_]>::len), Some(1));
        assert_eq!(cache.child_keys("X").unwrap(), None);
        assert_eq!(
            cache.all_node_ids().unwrap(),
            ["P", "X"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn opaque_inputs_leave_no_bookkeeping_behind() {
        let mut p = constants(&["B"]);
        let image = Value::opaque(vec![0u8; 3]);
        p.insert(
            "A".into(),
            NodeRecord::new("Preview", inputs([("image", image)])),
        );
        let binding = Binding::new(&p);
        let mut cache = GenerationalCache::new(KeyStrategy::input_signature(), 100);
        for _ in 0..50 {
            cache.set_prompt(&binding, &ids(&["A", "B"])).unwrap();
            assert_eq!(cache.get("A").unwrap(), None);
            cache.set("A", "a").unwrap();
            cache.set("B", "b").unwrap();
            cache.clean_unused().unwrap();
        }
        assert_eq!(values(&cache), ["b"].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(cache.used_generation.len(), 1);
    }

    #[test]
    fn tracking_of_uncached_nodes_ends_with_their_prompt() {
        let p = constants(&["A", "B"]);
        let binding = Binding::new(&p);
        let mut cache: GenerationalCache<&str> =
            GenerationalCache::new(KeyStrategy::Identity, 100);
        cache.set_prompt(&binding, &ids(&["A"])).unwrap();
        cache.clean_unused().unwrap();
        assert_eq!(cache.used_generation.len(), 1);

        cache.set_prompt(&binding, &ids(&["B"])).unwrap();
        cache.set("B", "b").unwrap();
        cache.clean_unused().unwrap();
        assert_eq!(cache.used_generation.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn child_record_is_dropped_with_its_parent() {
        let mut dynprompt = DynamicPrompt::new(constants(&["P", "Q", "R"]));
        let child = NodeRecord::new("Constant", inputs([("value", Value::Int(5))]));
        dynprompt.add_ephemeral_node("X", child, "P", "P").unwrap();
        let binding = Binding::new(&dynprompt);
        let mut cache = GenerationalCache::new(KeyStrategy::Identity, 1);
        cache.set_prompt(&binding, &ids(&["P"])).unwrap();
        cache.ensure_subcache_for(&binding, "P", &ids(&["X"])).unwrap();
        cache.set("P", "p").unwrap();
        cache.set("X", "x").unwrap();

        cache.set_prompt(&binding, &ids(&["Q"])).unwrap();
        cache.set("Q", "q").unwrap();
        cache.clean_unused().unwrap();
        assert_eq!(values(&cache), ["q"].into_iter().collect::<BTreeSet<_>>());

        cache.set_prompt(&binding, &ids(&["P", "Q"])).unwrap();
        assert_eq!(cache.child_keys("P").unwrap(), None);
    }
}
