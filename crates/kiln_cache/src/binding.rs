//! The external collaborators a cache consults while deriving keys.
//!
//! A [`Binding`] is passed into every operation that needs the graph rather
//! than stored in the cache, so the engine stays free to grow its
//! [`DynamicPrompt`](kiln_graph::DynamicPrompt) between calls.

use std::collections::{BTreeSet, HashMap, HashSet};

use kiln_common::Value;
use kiln_graph::PromptGraph;

/// Supplies the per-node "changed" marker folded into input signatures.
///
/// Nodes whose result depends on the outside world (files, clocks, random
/// sources) report a marker that differs whenever they must re-run.
pub trait ChangedOracle {
    /// Returns the marker for `node_id`; `Value::Null` when nothing is known.
    fn changed_marker(&self, node_id: &str) -> Value;
}

impl ChangedOracle for HashMap<String, Value> {
    fn changed_marker(&self, node_id: &str) -> Value {
        self.get(node_id).cloned().unwrap_or(Value::Null)
    }
}

/// An oracle that reports no changes for any node.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChanges;

impl ChangedOracle for NoChanges {
    fn changed_marker(&self, _node_id: &str) -> Value {
        Value::Null
    }
}

/// Node-registry facts that affect key derivation.
pub trait NodeRegistry {
    /// Returns `true` if repeated runs of this class may produce different
    /// results, so its signature must include the node id.
    fn is_not_idempotent(&self, class_type: &str) -> bool;
}

/// A registry in which every class is idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllIdempotent;

impl NodeRegistry for AllIdempotent {
    fn is_not_idempotent(&self, _class_type: &str) -> bool {
        false
    }
}

/// A set of class names that are not idempotent.
impl NodeRegistry for HashSet<String> {
    fn is_not_idempotent(&self, class_type: &str) -> bool {
        self.contains(class_type)
    }
}

impl NodeRegistry for BTreeSet<String> {
    fn is_not_idempotent(&self, class_type: &str) -> bool {
        self.contains(class_type)
    }
}

/// The graph, changed oracle, and registry used for one cache operation.
#[derive(Clone, Copy)]
pub struct Binding<'a> {
    /// The current (possibly expanded) prompt.
    pub prompt: &'a dyn PromptGraph,
    /// Per-node changed markers.
    pub changed: &'a dyn ChangedOracle,
    /// Class facts.
    pub registry: &'a dyn NodeRegistry,
}

impl<'a> Binding<'a> {
    /// Binds a prompt with no changed markers and an all-idempotent registry.
    pub fn new(prompt: &'a dyn PromptGraph) -> Self {
        Self {
            prompt,
            changed: &NoChanges,
            registry: &AllIdempotent,
        }
    }

    /// Replaces the changed oracle.
    pub fn with_changed(mut self, changed: &'a dyn ChangedOracle) -> Self {
        self.changed = changed;
        self
    }

    /// Replaces the node registry.
    pub fn with_registry(mut self, registry: &'a dyn NodeRegistry) -> Self {
        self.registry = registry;
        self
    }
}
