//! A prompt that grows as nodes expand into sub-graphs at runtime.
//!
//! The original prompt is immutable. Nodes created by an expansion are added
//! as ephemeral nodes together with the id of the node that expanded into
//! them; those parent pointers are what the hierarchical cache follows to find
//! a node's scope.

use std::collections::{BTreeSet, HashMap};

use crate::error::GraphError;
use crate::prompt::{NodeId, NodeRecord, Prompt, PromptGraph};

/// The original prompt plus every node added by expansions so far.
#[derive(Debug, Clone, Default)]
pub struct DynamicPrompt {
    original: Prompt,
    ephemeral: Prompt,
    ephemeral_parents: HashMap<NodeId, NodeId>,
    ephemeral_display: HashMap<NodeId, NodeId>,
}

impl DynamicPrompt {
    /// Wraps an original prompt.
    pub fn new(original: Prompt) -> Self {
        Self {
            original,
            ..Self::default()
        }
    }

    /// Returns the prompt as originally submitted.
    pub fn original_prompt(&self) -> &Prompt {
        &self.original
    }

    /// Returns `true` if the node exists, original or ephemeral.
    pub fn has_node(&self, node_id: &str) -> bool {
        self.original.contains_key(node_id) || self.ephemeral.contains_key(node_id)
    }

    /// Adds a node created by expanding `parent_id`.
    ///
    /// `display_id` is the id shown in place of this node; it usually names
    /// the parent or an explicit override.
    pub fn add_ephemeral_node(
        &mut self,
        node_id: impl Into<NodeId>,
        record: NodeRecord,
        parent_id: impl Into<NodeId>,
        display_id: impl Into<NodeId>,
    ) -> Result<(), GraphError> {
        let node_id = node_id.into();
        let parent_id = parent_id.into();
        if self.has_node(&node_id) {
            return Err(GraphError::DuplicateNode(node_id));
        }
        if !self.has_node(&parent_id) {
            return Err(GraphError::UnknownParent(parent_id));
        }
        self.ephemeral_display.insert(node_id.clone(), display_id.into());
        self.ephemeral_parents.insert(node_id.clone(), parent_id);
        self.ephemeral.insert(node_id, record);
        Ok(())
    }

    /// Grafts a finalized sub-graph produced by expanding `parent_id`.
    ///
    /// Each node is displayed as its `override_display_id` when set, otherwise
    /// as the parent. Returns the ids added, in graph order. Nothing is added
    /// if any id collides.
    pub fn expand(&mut self, parent_id: &str, graph: Prompt) -> Result<Vec<NodeId>, GraphError> {
        if !self.has_node(parent_id) {
            return Err(GraphError::UnknownParent(parent_id.to_string()));
        }
        if let Some(dup) = graph.keys().find(|id| self.has_node(id)) {
            return Err(GraphError::DuplicateNode(dup.clone()));
        }
        let mut added = Vec::with_capacity(graph.len());
        for (node_id, record) in graph {
            let display = record
                .override_display_id
                .clone()
                .unwrap_or_else(|| parent_id.to_string());
            self.add_ephemeral_node(node_id.clone(), record, parent_id, display)?;
            added.push(node_id);
        }
        tracing::debug!(parent = parent_id, nodes = added.len(), "expanded node");
        Ok(added)
    }

    /// Follows parent pointers up to the original node this one descends from.
    pub fn get_real_node_id<'a>(&'a self, node_id: &'a str) -> &'a str {
        let mut current = node_id;
        while let Some(parent) = self.ephemeral_parents.get(current) {
            current = parent.as_str();
        }
        current
    }

    /// Follows display overrides to the id that should be shown for a node.
    pub fn get_display_node_id<'a>(&'a self, node_id: &'a str) -> &'a str {
        let mut current = node_id;
        // Bounded so that a self-referencing override cannot loop forever.
        for _ in 0..=self.ephemeral_display.len() {
            match self.ephemeral_display.get(current) {
                Some(next) if next != current => current = next.as_str(),
                _ => break,
            }
        }
        current
    }

    /// Returns every node id, original and ephemeral.
    pub fn all_node_ids(&self) -> BTreeSet<NodeId> {
        self.original
            .keys()
            .chain(self.ephemeral.keys())
            .cloned()
            .collect()
    }
}

impl PromptGraph for DynamicPrompt {
    fn get_node(&self, node_id: &str) -> Option<&NodeRecord> {
        self.ephemeral
            .get(node_id)
            .or_else(|| self.original.get(node_id))
    }

    fn get_parent_node_id(&self, node_id: &str) -> Option<&str> {
        self.ephemeral_parents.get(node_id).map(String::as_str)
    }
}
