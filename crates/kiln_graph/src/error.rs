//! Error types for prompt parsing and graph expansion.

/// Errors that can occur while loading or growing a prompt graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The prompt JSON could not be parsed.
    #[error("failed to parse prompt: {0}")]
    Parse(String),

    /// A graph could not be serialized to JSON (e.g. it holds an opaque value).
    #[error("failed to serialize graph: {0}")]
    Serialize(String),

    /// A node with this id is already present in the prompt.
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    /// An expansion named a parent node that is not in the prompt.
    #[error("unknown parent node '{0}'")]
    UnknownParent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse() {
        let err = GraphError::Parse("expected value at line 1".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse prompt: expected value at line 1"
        );
    }

    #[test]
    fn display_serialize() {
        let err = GraphError::Serialize("opaque".to_string());
        assert!(err.to_string().starts_with("failed to serialize graph"));
    }

    #[test]
    fn display_duplicate_node() {
        let err = GraphError::DuplicateNode("5".to_string());
        assert_eq!(format!("{err}"), "node '5' already exists");
    }

    #[test]
    fn display_unknown_parent() {
        let err = GraphError::UnknownParent("12".to_string());
        assert_eq!(format!("{err}"), "unknown parent node '12'");
    }
}
