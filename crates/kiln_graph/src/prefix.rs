//! Renaming a graph into a fresh id namespace before grafting it.

use kiln_common::Value;

use crate::link::{link_parts, Link};
use crate::prompt::{NodeRecord, Prompt};

/// Prepends `prefix` to every node id in `graph` and to every link source.
///
/// Links found among node inputs and among the declared `outputs` are
/// rewritten; literal outputs pass through unchanged. Each rewritten node
/// keeps only its class and inputs.
pub fn add_graph_prefix(graph: &Prompt, outputs: &[Value], prefix: &str) -> (Prompt, Vec<Value>) {
    let new_graph = graph
        .iter()
        .map(|(node_id, record)| {
            let inputs = record
                .inputs
                .iter()
                .map(|(name, value)| (name.clone(), prefix_link(value, prefix)))
                .collect();
            (
                format!("{prefix}{node_id}"),
                NodeRecord::new(record.class_type.clone(), inputs),
            )
        })
        .collect();

    let new_outputs = outputs
        .iter()
        .map(|output| prefix_link(output, prefix))
        .collect();

    (new_graph, new_outputs)
}

fn prefix_link(value: &Value, prefix: &str) -> Value {
    match link_parts(value) {
        Some((source, output)) => Link::new(format!("{prefix}{source}"), output).to_value(),
        None => value.clone(),
    }
}
