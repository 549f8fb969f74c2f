//! Cache key derivation.
//!
//! A [`CacheKeySet`] derives, for each node id in one cache scope, a data key
//! (which cached output belongs to the node) and a subcache key (which nested
//! scope holds the node's expanded children). The [`KeyStrategy`] chosen when
//! the cache is built decides what makes two executions "the same".

use std::collections::{BTreeSet, HashMap};

use kiln_common::{to_hashable, Hashable, Value};
use kiln_graph::{link_parts, NodeId, NodeRecord, PromptGraph};

use crate::binding::Binding;
use crate::error::{CacheError, CacheResult};

/// An opaque cache key.
pub type CacheKey = Hashable;

/// Marker tagging a link inside an immediate signature.
const ANCESTOR_TAG: &str = "ANCESTOR";

/// How data keys are derived.
///
/// Subcache keys are always `(node id, class)`; nested scopes are addressed
/// by identity under both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Data key is `(node id, class)`: only the literally same node matches.
    Identity,
    /// Data key is a structural signature of the node and its ancestry, so
    /// isomorphic sub-graphs match regardless of their node ids.
    InputSignature {
        /// Fold every node's id into its immediate signature.
        include_node_id: bool,
    },
}

impl KeyStrategy {
    /// The input-signature strategy without node ids.
    pub const fn input_signature() -> Self {
        KeyStrategy::InputSignature {
            include_node_id: false,
        }
    }
}

impl Default for KeyStrategy {
    fn default() -> Self {
        Self::input_signature()
    }
}

/// Keys for every node id bound into one cache scope.
///
/// Keys are added incrementally and never removed; a fresh set is built each
/// time the scope is rebound.
#[derive(Debug, Clone)]
pub struct CacheKeySet {
    strategy: KeyStrategy,
    keys: HashMap<NodeId, CacheKey>,
    subcache_keys: HashMap<NodeId, CacheKey>,
}

impl CacheKeySet {
    /// Builds a key set for `node_ids`.
    pub fn new(
        strategy: KeyStrategy,
        binding: &Binding<'_>,
        node_ids: &[NodeId],
    ) -> CacheResult<Self> {
        let mut set = Self {
            strategy,
            keys: HashMap::with_capacity(node_ids.len()),
            subcache_keys: HashMap::with_capacity(node_ids.len()),
        };
        set.add_keys(binding, node_ids)?;
        Ok(set)
    }

    /// The strategy keys are derived with.
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Derives keys for any of `node_ids` not already known.
    pub fn add_keys(&mut self, binding: &Binding<'_>, node_ids: &[NodeId]) -> CacheResult<()> {
        for node_id in node_ids {
            if self.keys.contains_key(node_id) {
                continue;
            }
            let node = lookup(binding.prompt, node_id)?;
            let identity = identity_key(node_id, node);
            let data_key = match self.strategy {
                KeyStrategy::Identity => identity.clone(),
                KeyStrategy::InputSignature { include_node_id } => {
                    node_signature(binding, node_id, include_node_id)?
                }
            };
            self.keys.insert(node_id.clone(), data_key);
            self.subcache_keys.insert(node_id.clone(), identity);
        }
        Ok(())
    }

    /// Every node id with keys.
    pub fn all_node_ids(&self) -> BTreeSet<NodeId> {
        self.keys.keys().cloned().collect()
    }

    /// The data keys currently in use.
    pub fn get_used_keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.keys.values()
    }

    /// The subcache keys currently in use.
    pub fn get_used_subcache_keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.subcache_keys.values()
    }

    /// The data key of a node, if known.
    pub fn get_data_key(&self, node_id: &str) -> Option<&CacheKey> {
        self.keys.get(node_id)
    }

    /// The subcache key of a node, if known.
    pub fn get_subcache_key(&self, node_id: &str) -> Option<&CacheKey> {
        self.subcache_keys.get(node_id)
    }

    /// Number of nodes with keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no node has keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn lookup<'g>(prompt: &'g dyn PromptGraph, node_id: &str) -> CacheResult<&'g NodeRecord> {
    prompt
        .get_node(node_id)
        .ok_or_else(|| CacheError::NodeNotFound {
            node_id: node_id.to_string(),
        })
}

fn identity_key(node_id: &str, node: &NodeRecord) -> CacheKey {
    to_hashable(&Value::List(vec![
        Value::from(node_id),
        Value::from(node.class_type.as_str()),
    ]))
}

/// The node's own immediate signature followed by each ancestor's, projected.
fn node_signature(
    binding: &Binding<'_>,
    node_id: &str,
    include_node_id: bool,
) -> CacheResult<CacheKey> {
    let (ancestors, order) = ordered_ancestry(binding.prompt, node_id)?;
    let mut signature = Vec::with_capacity(ancestors.len() + 1);
    signature.push(immediate_signature(binding, node_id, &order, include_node_id)?);
    for ancestor_id in &ancestors {
        signature.push(immediate_signature(
            binding,
            ancestor_id,
            &order,
            include_node_id,
        )?);
    }
    Ok(to_hashable(&Value::List(signature)))
}

/// `[class, changed marker, (node id,) (input, literal | ANCESTOR link)...]`.
fn immediate_signature(
    binding: &Binding<'_>,
    node_id: &str,
    order: &HashMap<&str, usize>,
    include_node_id: bool,
) -> CacheResult<Value> {
    let node = lookup(binding.prompt, node_id)?;
    let mut signature = vec![
        Value::from(node.class_type.as_str()),
        binding.changed.changed_marker(node_id),
    ];
    if include_node_id || binding.registry.is_not_idempotent(&node.class_type) {
        signature.push(Value::from(node_id));
    }
    // Inputs iterate in name order.
    for (name, value) in &node.inputs {
        let entry = match link_parts(value) {
            Some((source, output)) => {
                let index = order.get(source).copied().ok_or_else(|| {
                    CacheError::NodeNotFound {
                        node_id: source.to_string(),
                    }
                })?;
                Value::List(vec![
                    Value::from(ANCESTOR_TAG),
                    Value::from(index),
                    Value::Int(output),
                ])
            }
            None => value.clone(),
        };
        signature.push(Value::List(vec![Value::from(name.as_str()), entry]));
    }
    Ok(Value::List(signature))
}

/// Depth-first discovery of every ancestor of `node_id`.
///
/// Inputs are followed in name order, and each newly discovered ancestor gets
/// the next index before its own inputs are explored. The numbering therefore
/// depends only on graph shape, never on the ancestors' actual ids.
fn ordered_ancestry<'g>(
    prompt: &'g dyn PromptGraph,
    node_id: &str,
) -> CacheResult<(Vec<&'g str>, HashMap<&'g str, usize>)> {
    let mut ancestors: Vec<&'g str> = Vec::new();
    let mut order: HashMap<&'g str, usize> = HashMap::new();
    let mut stack = vec![link_sources(lookup(prompt, node_id)?).into_iter()];

    while let Some(frame) = stack.last_mut() {
        match frame.next() {
            Some(source) => {
                if !order.contains_key(source) {
                    order.insert(source, ancestors.len());
                    ancestors.push(source);
                    stack.push(link_sources(lookup(prompt, source)?).into_iter());
                }
            }
            None => {
                stack.pop();
            }
        }
    }
    Ok((ancestors, order))
}

fn link_sources(node: &NodeRecord) -> Vec<&str> {
    node.inputs
        .values()
        .filter_map(|value| link_parts(value).map(|(source, _)| source))
        .collect()
}
