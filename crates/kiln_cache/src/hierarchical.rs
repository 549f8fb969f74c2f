//! Exact-reachability cache for dynamically nested graphs.
//!
//! Nodes created by expanding another node live in a nested scope under their
//! parent's scope. The cache never stores a path to that scope; every call
//! walks the prompt's parent chain and re-descends the tree from the root.

use std::collections::{BTreeSet, HashSet};

use kiln_graph::{NodeId, PromptGraph};

use crate::basic::BasicCache;
use crate::binding::Binding;
use crate::dump::DumpEntry;
use crate::error::{CacheError, CacheResult};
use crate::keys::KeyStrategy;

/// A tree of [`BasicCache`] scopes addressed through the prompt's parent chain.
#[derive(Debug)]
pub struct HierarchicalCache<V> {
    root: BasicCache<V>,
}

impl<V> HierarchicalCache<V> {
    /// Creates an empty, unbound cache.
    pub fn new(strategy: KeyStrategy) -> Self {
        Self {
            root: BasicCache::new(strategy),
        }
    }

    /// The root scope.
    pub fn root(&self) -> &BasicCache<V> {
        &self.root
    }

    /// Binds the root scope to the top-level node ids of a pass.
    pub fn set_prompt(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        self.root.set_prompt(binding, node_ids)
    }

    /// Resolves the scope that owns `node_id`, or `None` if some scope on the
    /// way down was never created.
    pub fn cache_for(
        &self,
        binding: &Binding<'_>,
        node_id: &str,
    ) -> CacheResult<Option<&BasicCache<V>>> {
        let mut scope = &self.root;
        for parent_id in hierarchy(binding.prompt, node_id)?.iter().rev() {
            match scope.get_subcache(parent_id)? {
                Some(subcache) => scope = subcache,
                None => {
                    tracing::trace!(node = node_id, missing = *parent_id, "scope path broken");
                    return Ok(None);
                }
            }
        }
        Ok(Some(scope))
    }

    /// Mutable variant of [`cache_for`](Self::cache_for).
    pub fn cache_for_mut(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
    ) -> CacheResult<Option<&mut BasicCache<V>>> {
        let mut scope = &mut self.root;
        for parent_id in hierarchy(binding.prompt, node_id)?.iter().rev() {
            match scope.get_subcache_mut(parent_id)? {
                Some(subcache) => scope = subcache,
                None => {
                    tracing::trace!(node = node_id, missing = *parent_id, "scope path broken");
                    return Ok(None);
                }
            }
        }
        Ok(Some(scope))
    }

    /// Looks up a node's cached output. A broken scope path is a miss.
    pub fn get(&self, binding: &Binding<'_>, node_id: &str) -> CacheResult<Option<&V>> {
        match self.cache_for(binding, node_id)? {
            Some(scope) => scope.get(node_id),
            None => Ok(None),
        }
    }

    /// Stores a node's output in the scope that owns it.
    pub fn set(&mut self, binding: &Binding<'_>, node_id: &str, value: V) -> CacheResult<()> {
        self.owning_scope(binding, node_id)?.set(node_id, value)
    }

    /// Creates or rebinds the nested scope for `node_id`'s expanded children.
    pub fn ensure_subcache_for(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
        child_ids: &[NodeId],
    ) -> CacheResult<&mut BasicCache<V>> {
        self.owning_scope(binding, node_id)?
            .ensure_subcache(binding, node_id, child_ids)
    }

    fn owning_scope(
        &mut self,
        binding: &Binding<'_>,
        node_id: &str,
    ) -> CacheResult<&mut BasicCache<V>> {
        self.cache_for_mut(binding, node_id)?
            .ok_or_else(|| CacheError::ScopeNotFound {
                node_id: node_id.to_string(),
            })
    }

    /// Drops every entry and scope no longer reachable from the current pass.
    pub fn clean_unused(&mut self) -> CacheResult<()> {
        self.root.clean_unused()
    }

    /// Every node id known to any scope.
    pub fn all_node_ids(&self) -> CacheResult<BTreeSet<NodeId>> {
        self.root.all_node_ids()
    }

    /// Number of cached outputs across all scopes.
    pub fn len(&self) -> usize {
        self.root.total_len()
    }

    /// Returns `true` if no scope holds a cached output.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists every entry and nested scope, recursively.
    pub fn debug_dump(&self) -> Vec<DumpEntry<'_, V>> {
        self.root.debug_dump()
    }
}

/// The ancestors of `node_id`, nearest first.
fn hierarchy<'g>(prompt: &'g dyn PromptGraph, node_id: &str) -> CacheResult<Vec<&'g str>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = prompt.get_parent_node_id(node_id);
    while let Some(parent_id) = current {
        if parent_id == node_id || !seen.insert(parent_id) {
            return Err(CacheError::ParentCycle {
                node_id: node_id.to_string(),
            });
        }
        chain.push(parent_id);
        current = prompt.get_parent_node_id(parent_id);
    }
    Ok(chain)
}
