//! Error types for cache operations.

/// Errors that can occur during cache operations.
///
/// Every variant is a precondition violation: the caller drove the cache in
/// an order it does not support. Ordinary misses are never errors; lookups
/// return `Ok(None)` so the engine can always fall back to recomputing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    /// An operation ran on a scope that was never bound with `set_prompt`.
    #[error("cache scope used before set_prompt")]
    Unbound,

    /// Key derivation needed a node that the prompt does not contain.
    #[error("node '{node_id}' not found in prompt")]
    NodeNotFound {
        /// The missing node.
        node_id: String,
    },

    /// A value or scope was requested for a node the bound key set does not know.
    #[error("node '{node_id}' has no key in the bound scope")]
    UnboundNode {
        /// The node without a key.
        node_id: String,
    },

    /// The scope owning a node does not exist although it must.
    #[error("no cache scope for node '{node_id}'")]
    ScopeNotFound {
        /// The node whose scope was not found.
        node_id: String,
    },

    /// Following parent pointers from a node revisits a node.
    #[error("parent chain of node '{node_id}' contains a cycle")]
    ParentCycle {
        /// The node whose chain loops.
        node_id: String,
    },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
