//! One scope of the cache tree.
//!
//! A [`BasicCache`] maps data keys to cached outputs and subcache keys to
//! child scopes. Each scope exclusively owns its children and holds no
//! reference back to its parent; the tree's shape mirrors how nodes expanded
//! into sub-graphs.

use std::collections::{BTreeSet, HashMap, HashSet};

use kiln_graph::NodeId;

use crate::binding::Binding;
use crate::dump::DumpEntry;
use crate::error::{CacheError, CacheResult};
use crate::keys::{CacheKey, CacheKeySet, KeyStrategy};

/// A cache scope: cached outputs plus nested scopes, bound to a key set.
#[derive(Debug)]
pub struct BasicCache<V> {
    strategy: KeyStrategy,
    key_set: Option<CacheKeySet>,
    cache: HashMap<CacheKey, V>,
    subcaches: HashMap<CacheKey, BasicCache<V>>,
}

impl<V> BasicCache<V> {
    /// Creates an unbound, empty scope.
    pub fn new(strategy: KeyStrategy) -> Self {
        Self {
            strategy,
            key_set: None,
            cache: HashMap::new(),
            subcaches: HashMap::new(),
        }
    }

    /// The key strategy this scope and its children use.
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Returns `true` once `set_prompt` has succeeded at least once.
    pub fn is_bound(&self) -> bool {
        self.key_set.is_some()
    }

    /// Binds this scope to `node_ids` with a fresh key set.
    ///
    /// Cached entries are kept; whether they are still reachable is decided
    /// by the new keys at the next [`clean_unused`](Self::clean_unused).
    pub fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        let key_set = CacheKeySet::new(self.strategy, binding, node_ids)?;
        tracing::debug!(nodes = node_ids.len(), entries = self.cache.len(), "bound cache scope");
        self.key_set = Some(key_set);
        Ok(())
    }

    /// The bound key set.
    pub fn key_set(&self) -> CacheResult<&CacheKeySet> {
        self.key_set.as_ref().ok_or(CacheError::Unbound)
    }

    pub(crate) fn key_set_mut(&mut self) -> CacheResult<&mut CacheKeySet> {
        self.key_set.as_mut().ok_or(CacheError::Unbound)
    }

    /// Every node id known to this scope or any scope nested under it.
    pub fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>> {
        let mut ids = self.key_set()?.all_node_ids();
        for subcache in self.subcaches.values() {
            ids.extend(subcache.all_node_ids()?);
        }
        Ok(ids)
    }

    /// Drops every entry and nested scope the bound key set no longer uses.
    ///
    /// Surviving nested scopes are cleaned the same way against their own
    /// most recent binding.
    pub fn clean_unused(&mut self) -> CacheResult<()> {
        let entries = self.clean_cache()?;
        let scopes = self.clean_subcaches()?;
        if entries > 0 || scopes > 0 {
            tracing::debug!(entries, scopes, "evicted unreachable cache state");
        }
        for subcache in self.subcaches.values_mut() {
            subcache.clean_unused()?;
        }
        Ok(())
    }

    fn clean_cache(&mut self) -> CacheResult<usize> {
        let key_set = self.key_set.as_ref().ok_or(CacheError::Unbound)?;
        let preserve: HashSet<&CacheKey> = key_set.get_used_keys().collect();
        let before = self.cache.len();
        self.cache.retain(|key, _| preserve.contains(key));
        Ok(before - self.cache.len())
    }

    pub(crate) fn clean_subcaches(&mut self) -> CacheResult<usize> {
        let key_set = self.key_set.as_ref().ok_or(CacheError::Unbound)?;
        let preserve: HashSet<&CacheKey> = key_set.get_used_subcache_keys().collect();
        let before = self.subcaches.len();
        self.subcaches.retain(|key, _| preserve.contains(key));
        Ok(before - self.subcaches.len())
    }

    /// Looks up the cached output of a node in this scope.
    pub fn get(&self, node_id: &str) -> CacheResult<Option<&V>> {
        let value = self
            .key_set()?
            .get_data_key(node_id)
            .and_then(|key| self.cache.get(key));
        tracing::trace!(node = node_id, hit = value.is_some(), "cache lookup");
        Ok(value)
    }

    /// Stores the output of a node in this scope.
    pub fn set(&mut self, node_id: &str, value: V) -> CacheResult<()> {
        let key = self
            .key_set
            .as_ref()
            .ok_or(CacheError::Unbound)?
            .get_data_key(node_id)
            .ok_or_else(|| CacheError::UnboundNode {
                node_id: node_id.to_string(),
            })?;
        self.cache.insert(key.clone(), value);
        Ok(())
    }

    /// Returns the nested scope for `node_id`'s children, creating it if
    /// needed, and rebinds it to `child_ids`.
    ///
    /// The same scope object is returned for the same node on every pass, so
    /// its contents survive as long as the node stays reachable.
    pub fn ensure_subcache(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<&mut BasicCache<V>> {
        let subcache_key = self
            .key_set()?
            .get_subcache_key(node_id)
            .ok_or_else(|| CacheError::UnboundNode {
                node_id: node_id.to_string(),
            })?
            .clone();
        let key_set = CacheKeySet::new(self.strategy, binding, child_ids)?;
        let strategy = self.strategy;
        let subcache = self
            .subcaches
            .entry(subcache_key)
            .or_insert_with(|| BasicCache::new(strategy));
        tracing::debug!(node = node_id, children = child_ids.len(), "bound nested scope");
        subcache.key_set = Some(key_set);
        Ok(subcache)
    }

    /// Returns the nested scope for `node_id`'s children, if it exists.
    pub fn get_subcache(&self, node_id: &str) -> CacheResult<Option<&BasicCache<V>>> {
        Ok(self
            .key_set()?
            .get_subcache_key(node_id)
            .and_then(|key| self.subcaches.get(key)))
    }

    /// Mutable variant of [`get_subcache`](Self::get_subcache).
    pub fn get_subcache_mut(&mut self, node_id: &str) -> CacheResult<Option<&mut BasicCache<V>>> {
        let key_set = self.key_set.as_ref().ok_or(CacheError::Unbound)?;
        Ok(match key_set.get_subcache_key(node_id) {
            Some(key) => self.subcaches.get_mut(key),
            None => None,
        })
    }

    /// Number of cached outputs directly in this scope.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if this scope holds no cached outputs.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of cached outputs in this scope and every nested scope.
    pub fn total_len(&self) -> usize {
        self.cache.len() + self.subcaches.values().map(BasicCache::total_len).sum::<usize>()
    }

    /// Number of direct nested scopes.
    pub fn subcache_count(&self) -> usize {
        self.subcaches.len()
    }

    pub(crate) fn contains_key(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    pub(crate) fn retain_entries(&mut self, mut keep: impl FnMut(&CacheKey) -> bool) -> usize {
        let before = self.cache.len();
        self.cache.retain(|key, _| keep(key));
        before - self.cache.len()
    }

    /// Lists every entry and nested scope, recursively.
    pub fn debug_dump(&self) -> Vec<DumpEntry<'_, V>> {
        let mut records: Vec<DumpEntry<'_, V>> = self
            .cache
            .iter()
            .map(|(key, value)| DumpEntry::Value { key, value })
            .collect();
        records.extend(
            self.subcaches
                .iter()
                .map(|(key, subcache)| DumpEntry::Subcache {
                    subcache_key: key,
                    subcache: subcache.debug_dump(),
                }),
        );
        records
    }
}
