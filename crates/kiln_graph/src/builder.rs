//! Namespaced construction of sub-graphs produced by node expansion.
//!
//! Every id a [`GraphBuilder`] hands out is its prefix followed by either a
//! caller-chosen id or the next value of an internal counter. Prefixes come
//! from a [`PrefixAllocator`] owned by the execution engine, so two expansions
//! in one run never collide.

use std::collections::BTreeMap;

use kiln_common::Value;

use crate::error::GraphError;
use crate::link::{link_parts, Link};
use crate::prompt::{Inputs, NodeId, NodeRecord, Prompt};

/// Hands out unique builder prefixes of the form `"{root}.{call}.{graph}."`.
///
/// The engine creates one allocator per expanding node call (root = the
/// expanding node's id, call index = how many times it has expanded) and
/// passes it to every builder that call creates. The graph index advances on
/// each allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixAllocator {
    root: String,
    call_index: u64,
    graph_index: u64,
}

impl PrefixAllocator {
    /// Creates an allocator whose first prefix has graph index 0.
    pub fn new(root: impl Into<String>, call_index: u64) -> Self {
        Self {
            root: root.into(),
            call_index,
            graph_index: 0,
        }
    }

    /// Starts allocation at a specific graph index.
    pub fn with_graph_index(mut self, graph_index: u64) -> Self {
        self.graph_index = graph_index;
        self
    }

    /// Returns the next unique prefix and advances the graph index.
    pub fn alloc(&mut self) -> String {
        let prefix = format!("{}.{}.{}.", self.root, self.call_index, self.graph_index);
        self.graph_index += 1;
        prefix
    }

    /// The prefix root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The call index.
    pub fn call_index(&self) -> u64 {
        self.call_index
    }

    /// The graph index the next allocation will use.
    pub fn graph_index(&self) -> u64 {
        self.graph_index
    }
}

/// A node under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderNode {
    id: NodeId,
    class_type: String,
    inputs: Inputs,
    override_display_id: Option<String>,
}

impl BuilderNode {
    fn new(id: NodeId, class_type: &str, inputs: Inputs) -> Self {
        Self {
            id,
            class_type: class_type.to_string(),
            inputs,
            override_display_id: None,
        }
    }

    /// The full, prefixed id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's class/type tag.
    pub fn class_type(&self) -> &str {
        &self.class_type
    }

    /// The node's inputs.
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Returns a link value to this node's output slot `index`.
    pub fn out(&self, index: i64) -> Value {
        Link::new(self.id.clone(), index).to_value()
    }

    /// Sets an input, or removes it when `value` is `None`.
    pub fn set_input(&mut self, name: &str, value: Option<Value>) -> &mut Self {
        match value {
            Some(value) => {
                self.inputs.insert(name.to_string(), value);
            }
            None => {
                self.inputs.remove(name);
            }
        }
        self
    }

    /// Returns an input by name.
    pub fn get_input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Shows this node under another id.
    pub fn set_override_display_id(&mut self, display_id: impl Into<String>) -> &mut Self {
        self.override_display_id = Some(display_id.into());
        self
    }

    /// The display override, if set.
    pub fn override_display_id(&self) -> Option<&str> {
        self.override_display_id.as_deref()
    }

    /// Converts to the wire record.
    pub fn serialize(&self) -> NodeRecord {
        NodeRecord {
            class_type: self.class_type.clone(),
            inputs: self.inputs.clone(),
            override_display_id: self.override_display_id.clone(),
        }
    }
}

/// A namespaced workspace for building one sub-graph.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    prefix: String,
    nodes: BTreeMap<NodeId, BuilderNode>,
    id_gen: u64,
}

impl GraphBuilder {
    /// Creates a builder with an explicit prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            nodes: BTreeMap::new(),
            id_gen: 1,
        }
    }

    /// Creates a builder with the next prefix from `allocator`.
    pub fn from_allocator(allocator: &mut PrefixAllocator) -> Self {
        Self::new(allocator.alloc())
    }

    /// The prefix applied to every id.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of nodes built so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no nodes have been built.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node with this id, creating it with no inputs if absent.
    ///
    /// See [`node_with_inputs`](Self::node_with_inputs).
    pub fn node(&mut self, class_type: &str, id: Option<&str>) -> &mut BuilderNode {
        self.node_with_inputs(class_type, id, Inputs::new())
    }

    /// Returns the node with this id, creating it if absent.
    ///
    /// Without an explicit `id` the next counter value is used. The final id
    /// is always the prefix followed by that id. If a node with the final id
    /// already exists it is returned unchanged: `class_type` and `inputs` are
    /// ignored in that case.
    pub fn node_with_inputs(
        &mut self,
        class_type: &str,
        id: Option<&str>,
        inputs: Inputs,
    ) -> &mut BuilderNode {
        let local = match id {
            Some(id) => id.to_string(),
            None => {
                let generated = self.id_gen.to_string();
                self.id_gen += 1;
                generated
            }
        };
        let full_id = format!("{}{}", self.prefix, local);
        self.nodes
            .entry(full_id.clone())
            .or_insert_with(|| BuilderNode::new(full_id, class_type, inputs))
    }

    /// Looks up a node by its unprefixed id.
    pub fn lookup_node(&self, id: &str) -> Option<&BuilderNode> {
        self.nodes.get(&self.full_id(id))
    }

    /// Looks up a node by its unprefixed id for modification.
    pub fn lookup_node_mut(&mut self, id: &str) -> Option<&mut BuilderNode> {
        let full_id = self.full_id(id);
        self.nodes.get_mut(&full_id)
    }

    /// Serializes every node into the wire format.
    pub fn finalize(&self) -> Prompt {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.serialize()))
            .collect()
    }

    /// Serializes every node into wire-format JSON.
    pub fn finalize_json(&self) -> Result<String, GraphError> {
        serde_json::to_string(&self.finalize()).map_err(|e| GraphError::Serialize(e.to_string()))
    }

    /// Rewrites every input linked to output `index` of node `node_id`.
    ///
    /// With `None` the linked inputs are removed; otherwise they are replaced
    /// by the literal `new_value`.
    pub fn replace_node_output(&mut self, node_id: &str, index: i64, new_value: Option<Value>) {
        let target = self.full_id(node_id);
        let points_at_target =
            |value: &Value| link_parts(value) == Some((target.as_str(), index));
        for node in self.nodes.values_mut() {
            match &new_value {
                None => node.inputs.retain(|_, value| !points_at_target(&*value)),
                Some(replacement) => {
                    for value in node.inputs.values_mut() {
                        if points_at_target(&*value) {
                            *value = replacement.clone();
                        }
                    }
                }
            }
        }
    }

    /// Deletes a node by its unprefixed id. Links to it are left in place.
    pub fn remove_node(&mut self, id: &str) -> Option<BuilderNode> {
        let full_id = self.full_id(id);
        self.nodes.remove(&full_id)
    }

    fn full_id(&self, id: &str) -> NodeId {
        format!("{}{}", self.prefix, id)
    }
}
