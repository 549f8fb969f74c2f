//! Graph construction and rewriting for dynamically expanding prompts.
//!
//! A prompt is a map from node id to [`NodeRecord`]. Nodes reference each
//! other's outputs through links embedded in their inputs. This crate provides
//! the link predicate, the [`PromptGraph`] view consumed by the caches, a
//! [`DynamicPrompt`] that grows as nodes expand into sub-graphs, and the
//! [`GraphBuilder`] used to assemble those sub-graphs with collision-free ids.

#![warn(missing_docs)]

pub mod builder;
pub mod dynamic;
pub mod error;
pub mod link;
pub mod prefix;
pub mod prompt;

pub use builder::{BuilderNode, GraphBuilder, PrefixAllocator};
pub use dynamic::DynamicPrompt;
pub use error::GraphError;
pub use link::{is_link, link_parts, Link};
pub use prefix::add_graph_prefix;
pub use prompt::{inputs, parse_prompt, Inputs, NodeId, NodeRecord, Prompt, PromptGraph};
