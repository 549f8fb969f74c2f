//! The prompt wire format and the graph view consumed by the caches.
//!
//! On the wire a prompt is a JSON object mapping node ids to
//! `{class_type, inputs, override_display_id?}`.

use std::collections::BTreeMap;

use kiln_common::Value;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// A node identifier. Ids produced by expansion carry a builder prefix.
pub type NodeId = String;

/// A node's named inputs: literals or links.
pub type Inputs = BTreeMap<String, Value>;

/// A whole graph keyed by node id.
pub type Prompt = BTreeMap<NodeId, NodeRecord>;

/// One node as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The node's class/type tag.
    pub class_type: String,
    /// Named inputs, each a literal value or a link.
    #[serde(default)]
    pub inputs: Inputs,
    /// The id to show in place of this node's own id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_display_id: Option<String>,
}

impl NodeRecord {
    /// Creates a record with the given class and inputs.
    pub fn new(class_type: impl Into<String>, inputs: Inputs) -> Self {
        Self {
            class_type: class_type.into(),
            inputs,
            override_display_id: None,
        }
    }
}

/// Builds an [`Inputs`] map from `(name, value)` pairs.
pub fn inputs<K, I>(entries: I) -> Inputs
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Parses a prompt from its JSON wire form.
pub fn parse_prompt(json: &str) -> Result<Prompt, GraphError> {
    serde_json::from_str(json).map_err(|e| GraphError::Parse(e.to_string()))
}

/// Read access to a graph whose nodes may be nested under expanding parents.
///
/// This is the view the caches need: node contents for key derivation and
/// the parent chain for locating a node's cache scope.
pub trait PromptGraph {
    /// Returns the node with this id, if present.
    fn get_node(&self, node_id: &str) -> Option<&NodeRecord>;

    /// Returns the id of the node whose expansion produced this node, or
    /// `None` for top-level nodes.
    fn get_parent_node_id(&self, node_id: &str) -> Option<&str>;
}

impl PromptGraph for Prompt {
    fn get_node(&self, node_id: &str) -> Option<&NodeRecord> {
        self.get(node_id)
    }

    fn get_parent_node_id(&self, _node_id: &str) -> Option<&str> {
        None
    }
}
