//! Structural detection of links between nodes.
//!
//! A link is not tagged: any two-element list whose first element is a string
//! and whose second is a number is a reference `[source_id, output_index]`.
//! [`link_parts`] is the single predicate every caller uses.

use kiln_common::Value;

use crate::prompt::NodeId;

/// A reference from a node input to another node's output slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    /// Id of the node producing the value.
    pub source: NodeId,
    /// Output slot on the source node.
    pub output: i64,
}

impl Link {
    /// Creates a link to `source`'s output slot `output`.
    pub fn new(source: impl Into<NodeId>, output: i64) -> Self {
        Self {
            source: source.into(),
            output,
        }
    }

    /// Parses a link out of an input value, or `None` for literals.
    pub fn from_value(value: &Value) -> Option<Self> {
        link_parts(value).map(|(source, output)| Self::new(source, output))
    }

    /// Encodes this link as its wire value `[source, output]`.
    pub fn to_value(&self) -> Value {
        Value::List(vec![
            Value::String(self.source.clone()),
            Value::Int(self.output),
        ])
    }
}

impl From<Link> for Value {
    fn from(link: Link) -> Self {
        link.to_value()
    }
}

/// Borrows the `(source, output)` pair if `value` is a link.
///
/// Integral float output indices are accepted; a fractional one makes the
/// list a literal.
pub fn link_parts(value: &Value) -> Option<(&str, i64)> {
    let [source, output] = value.as_list()? else {
        return None;
    };
    let source = source.as_str()?;
    let output = match output {
        Value::Int(i) => *i,
        Value::Float(f) if f.fract() == 0.0 => *f as i64,
        _ => return None,
    };
    Some((source, output))
}

/// Returns `true` if `value` is a link.
pub fn is_link(value: &Value) -> bool {
    link_parts(value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_links() {
        let v = Value::List(vec!["4".into(), Value::Int(1)]);
        assert!(is_link(&v));
        assert_eq!(link_parts(&v), Some(("4", 1)));
        assert_eq!(Link::from_value(&v), Some(Link::new("4", 1)));
    }

    #[test]
    fn float_output_index_is_a_link() {
        let v = Value::List(vec!["4".into(), Value::Float(2.0)]);
        assert_eq!(link_parts(&v), Some(("4", 2)));
    }

    #[test]
    fn fractional_output_index_is_a_literal() {
        assert!(!is_link(&Value::List(vec!["4".into(), Value::Float(0.5)])));
        assert!(!is_link(&Value::List(vec!["4".into(), Value::Float(f64::NAN)])));
    }

    #[test]
    fn rejects_literals() {
        assert!(!is_link(&Value::Int(3)));
        assert!(!is_link(&Value::from("4")));
        assert!(!is_link(&Value::List(vec!["4".into()])));
        assert!(!is_link(&Value::List(vec![
            "4".into(),
            Value::Int(0),
            Value::Int(0)
        ])));
        assert!(!is_link(&Value::List(vec![Value::Int(4), Value::Int(0)])));
        assert!(!is_link(&Value::List(vec!["4".into(), "0".into()])));
    }

    #[test]
    fn value_roundtrip() {
        let link = Link::new("sub.1", 0);
        assert_eq!(Link::from_value(&link.to_value()), Some(link.clone()));
        assert_eq!(Value::from(link.clone()), link.to_value());
    }
}
