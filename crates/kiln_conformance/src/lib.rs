//! Conformance test helpers for the Kiln execution caches.
//!
//! Provides a miniature execution engine that drives an [`ExecutionCache`] the
//! way a real engine does: bind a pass, resolve each node from the cache or
//! execute it, expand nodes into sub-graphs, and clean up at the end. Each
//! run records which nodes actually executed so integration tests can assert
//! on cache reuse.
//!
//! Node classes:
//!
//! | Class | Inputs | Output 0 |
//! |---|---|---|
//! | `Constant` | `value` | `value` |
//! | `Add` | `a`, `b` | `a + b` |
//! | `Multiply` | `a`, `b` | `a * b` |
//! | `Random` | none | a fresh draw; not idempotent |
//! | `Repeat` | `value`, `times` | `value * times`, by expanding into a chain of `Add` nodes |
//!
//! `Repeat` ignores any other input, which lets tests change its signature
//! without changing the sub-graph it expands into.

#![warn(missing_docs)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use kiln_cache::{build_cache, Binding, CacheError, ExecutionCache};
use kiln_common::Value;
use kiln_config::{CacheSettings, LoggingConfig};
use kiln_graph::{
    link_parts, DynamicPrompt, GraphBuilder, GraphError, NodeId, Prompt, PromptGraph,
    PrefixAllocator,
};

/// Errors produced while running a prompt.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The cache rejected an operation.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Expanding a node produced an invalid graph.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// A node or link source is not in the prompt.
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// No such node class.
    #[error("node '{node_id}' has unknown class '{class_type}'")]
    UnknownClass {
        /// The node.
        node_id: String,
        /// Its class.
        class_type: String,
    },

    /// A required input is missing or has the wrong type.
    #[error("node '{node_id}' has a missing or invalid input '{input}'")]
    BadInput {
        /// The node.
        node_id: String,
        /// The input name.
        input: String,
    },

    /// A link names an output slot the source node does not have.
    #[error("node '{node_id}' has no output {index}")]
    BadOutput {
        /// The source node.
        node_id: String,
        /// The requested slot.
        index: i64,
    },
}

/// A miniature execution engine backed by an [`ExecutionCache`].
pub struct Engine {
    cache: Box<dyn ExecutionCache<Value>>,
    registry: BTreeSet<String>,
    changed: HashMap<String, Value>,
    draws: i64,
    executed: Vec<NodeId>,
}

impl Engine {
    /// Creates an engine around an existing cache.
    pub fn new(cache: Box<dyn ExecutionCache<Value>>) -> Self {
        Self {
            cache,
            registry: ["Random".to_string()].into_iter().collect(),
            changed: HashMap::new(),
            draws: 0,
            executed: Vec::new(),
        }
    }

    /// Creates an engine with the cache selected by `settings`.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(build_cache(settings))
    }

    /// Sets the changed marker reported for `node_id` on later runs.
    pub fn mark_changed(&mut self, node_id: impl Into<String>, marker: impl Into<Value>) {
        self.changed.insert(node_id.into(), marker.into());
    }

    /// Nodes executed during the most recent run, in execution order.
    pub fn executed(&self) -> &[NodeId] {
        &self.executed
    }

    /// Returns `true` if `node_id` executed during the most recent run.
    pub fn did_execute(&self, node_id: &str) -> bool {
        self.executed.iter().any(|id| id == node_id)
    }

    /// The backing cache.
    pub fn cache(&self) -> &dyn ExecutionCache<Value> {
        self.cache.as_ref()
    }

    /// Evaluates `outputs` in `prompt` and returns each node's output list.
    pub fn run(
        &mut self,
        prompt: &Prompt,
        outputs: &[&str],
    ) -> Result<BTreeMap<NodeId, Vec<Value>>, EngineError> {
        let node_ids: Vec<NodeId> = prompt.keys().cloned().collect();
        let mut pass = Pass {
            cache: &mut self.cache,
            registry: &self.registry,
            changed: &self.changed,
            dynprompt: DynamicPrompt::new(prompt.clone()),
            results: HashMap::new(),
            executed: Vec::new(),
            draws: &mut self.draws,
        };
        pass.cache.set_prompt(
            &bind(&pass.dynprompt, pass.changed, pass.registry),
            &node_ids,
        )?;

        let mut results = BTreeMap::new();
        for &output in outputs {
            results.insert(output.to_string(), pass.evaluate(output)?);
        }
        pass.cache.clean_unused()?;
        self.executed = pass.executed;
        Ok(results)
    }
}

fn bind<'b>(
    dynprompt: &'b DynamicPrompt,
    changed: &'b HashMap<String, Value>,
    registry: &'b BTreeSet<String>,
) -> Binding<'b> {
    Binding::new(dynprompt)
        .with_changed(changed)
        .with_registry(registry)
}

/// State of one run.
struct Pass<'e> {
    cache: &'e mut Box<dyn ExecutionCache<Value>>,
    registry: &'e BTreeSet<String>,
    changed: &'e HashMap<String, Value>,
    dynprompt: DynamicPrompt,
    results: HashMap<NodeId, Vec<Value>>,
    executed: Vec<NodeId>,
    draws: &'e mut i64,
}

impl Pass<'_> {
    fn evaluate(&mut self, node_id: &str) -> Result<Vec<Value>, EngineError> {
        if let Some(outputs) = self.results.get(node_id) {
            return Ok(outputs.clone());
        }
        let binding = bind(&self.dynprompt, self.changed, self.registry);
        if let Some(cached) = self.cache.get(&binding, node_id)? {
            let outputs = cached.as_list().map(<[Value]>::to_vec).unwrap_or_default();
            self.results.insert(node_id.to_string(), outputs.clone());
            return Ok(outputs);
        }

        let record = self
            .dynprompt
            .get_node(node_id)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
        let mut inputs = BTreeMap::new();
        for (name, value) in &record.inputs {
            let resolved = match link_parts(value) {
                Some((source, index)) => {
                    let source = source.to_string();
                    let outputs = self.evaluate(&source)?;
                    usize::try_from(index)
                        .ok()
                        .and_then(|i| outputs.get(i).cloned())
                        .ok_or(EngineError::BadOutput {
                            node_id: source,
                            index,
                        })?
                }
                None => value.clone(),
            };
            inputs.insert(name.clone(), resolved);
        }

        tracing::debug!(
            node = node_id,
            real = self.dynprompt.get_real_node_id(node_id),
            display = self.dynprompt.get_display_node_id(node_id),
            class = record.class_type.as_str(),
            "executing node"
        );
        self.executed.push(node_id.to_string());
        let outputs = match record.class_type.as_str() {
            "Constant" => vec![input(node_id, &inputs, "value")?.clone()],
            "Add" => vec![arithmetic(node_id, &inputs, |a, b| a + b, |a, b| a + b)?],
            "Multiply" => vec![arithmetic(node_id, &inputs, |a, b| a * b, |a, b| a * b)?],
            "Random" => {
                *self.draws += 1;
                vec![Value::Int(*self.draws)]
            }
            "Repeat" => vec![self.expand_repeat(node_id, &inputs)?],
            other => {
                return Err(EngineError::UnknownClass {
                    node_id: node_id.to_string(),
                    class_type: other.to_string(),
                })
            }
        };

        let binding = bind(&self.dynprompt, self.changed, self.registry);
        self.cache
            .set(&binding, node_id, Value::List(outputs.clone()))?;
        self.results.insert(node_id.to_string(), outputs.clone());
        Ok(outputs)
    }

    /// Builds `value + value + ...` as a sub-graph, grafts it under `node_id`,
    /// and evaluates its last node.
    fn expand_repeat(
        &mut self,
        node_id: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<Value, EngineError> {
        let value = input(node_id, inputs, "value")?.clone();
        let times = input(node_id, inputs, "times")?
            .as_i64()
            .filter(|times| *times >= 1)
            .ok_or_else(|| EngineError::BadInput {
                node_id: node_id.to_string(),
                input: "times".to_string(),
            })?;

        let mut allocator = PrefixAllocator::new(node_id, 0);
        let mut builder = GraphBuilder::from_allocator(&mut allocator);
        let constant = builder
            .node("Constant", Some("value"))
            .set_input("value", Some(value))
            .out(0);
        let mut total = constant.clone();
        for step in 1..times {
            let id = format!("add{step}");
            total = builder
                .node("Add", Some(id.as_str()))
                .set_input("a", Some(total))
                .set_input("b", Some(constant.clone()))
                .out(0);
        }
        let (result_id, result_index) = link_parts(&total)
            .map(|(source, index)| (source.to_string(), index))
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;

        let child_ids = self.dynprompt.expand(node_id, builder.finalize())?;
        let binding = bind(&self.dynprompt, self.changed, self.registry);
        self.cache.ensure_subcache_for(&binding, node_id, &child_ids)?;

        let outputs = self.evaluate(&result_id)?;
        usize::try_from(result_index)
            .ok()
            .and_then(|i| outputs.get(i).cloned())
            .ok_or(EngineError::BadOutput {
                node_id: result_id,
                index: result_index,
            })
    }
}

fn input<'v>(
    node_id: &str,
    inputs: &'v BTreeMap<String, Value>,
    name: &str,
) -> Result<&'v Value, EngineError> {
    inputs.get(name).ok_or_else(|| EngineError::BadInput {
        node_id: node_id.to_string(),
        input: name.to_string(),
    })
}

fn arithmetic(
    node_id: &str,
    inputs: &BTreeMap<String, Value>,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EngineError> {
    let a = input(node_id, inputs, "a")?;
    let b = input(node_id, inputs, "b")?;
    let bad = |name: &str| EngineError::BadInput {
        node_id: node_id.to_string(),
        input: name.to_string(),
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return Ok(Value::Int(int_op(a, b)));
    }
    let a = a.as_f64().ok_or_else(|| bad("a"))?;
    let b = b.as_f64().ok_or_else(|| bad("b"))?;
    Ok(Value::Float(float_op(a, b)))
}

/// Installs a test log subscriber filtered by `config`, defaulting to `warn`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_logging(config: &LoggingConfig) {
    let filter = config.filter.as_deref().unwrap_or("warn");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Parses a prompt from its JSON wire format.
pub fn prompt_from_json(json: &str) -> Prompt {
    kiln_graph::parse_prompt(json).expect("conformance prompt must be valid JSON")
}

/// The first output of `node_id` in a run's results.
pub fn first_output(results: &BTreeMap<NodeId, Vec<Value>>, node_id: &str) -> Option<Value> {
    results.get(node_id).and_then(|outputs| outputs.first()).cloned()
}
