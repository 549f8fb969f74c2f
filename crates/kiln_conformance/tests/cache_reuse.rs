//! Tests for reuse of cached outputs across runs of edited prompts.

use kiln_cache::{HierarchicalCache, KeyStrategy};
use kiln_common::Value;
use kiln_conformance::{first_output, prompt_from_json, Engine};
use kiln_config::CacheSettings;

const ARITHMETIC: &str = r#"{
    "1": {"class_type": "Constant", "inputs": {"value": 2}},
    "2": {"class_type": "Constant", "inputs": {"value": 3}},
    "3": {"class_type": "Add", "inputs": {"a": ["1", 0], "b": ["2", 0]}},
    "4": {"class_type": "Multiply", "inputs": {"a": ["3", 0], "b": ["1", 0]}}
}"#;

const RENUMBERED: &str = r#"{
    "10": {"class_type": "Constant", "inputs": {"value": 2}},
    "20": {"class_type": "Constant", "inputs": {"value": 3}},
    "30": {"class_type": "Add", "inputs": {"a": ["10", 0], "b": ["20", 0]}},
    "40": {"class_type": "Multiply", "inputs": {"a": ["30", 0], "b": ["10", 0]}}
}"#;

fn signature_engine() -> Engine {
    Engine::new(Box::new(HierarchicalCache::new(KeyStrategy::input_signature())))
}

#[test]
fn first_run_executes_everything() {
    let mut engine = signature_engine();
    let results = engine.run(&prompt_from_json(ARITHMETIC), &["4"]).unwrap();
    assert_eq!(first_output(&results, "4"), Some(Value::Int(10)));
    assert_eq!(engine.executed(), ["1", "2", "3", "4"].map(String::from));
    assert_eq!(engine.cache().len(), 4);
}

#[test]
fn identical_rerun_executes_nothing() {
    let mut engine = signature_engine();
    let prompt = prompt_from_json(ARITHMETIC);
    engine.run(&prompt, &["4"]).unwrap();
    let results = engine.run(&prompt, &["4"]).unwrap();
    assert_eq!(first_output(&results, "4"), Some(Value::Int(10)));
    assert!(engine.executed().is_empty(), "ran {:?}", engine.executed());
}

#[test]
fn edit_reruns_only_downstream_nodes() {
    let mut engine = signature_engine();
    engine.run(&prompt_from_json(ARITHMETIC), &["4"]).unwrap();

    let edited = ARITHMETIC.replace(r#""value": 3"#, r#""value": 4"#);
    let results = engine.run(&prompt_from_json(&edited), &["4"]).unwrap();
    assert_eq!(first_output(&results, "4"), Some(Value::Int(12)));
    assert!(!engine.did_execute("1"));
    assert!(engine.did_execute("2"));
    assert!(engine.did_execute("3"));
    assert!(engine.did_execute("4"));
}

#[test]
fn renumbered_graph_hits_under_signature_keys() {
    let mut engine = signature_engine();
    engine.run(&prompt_from_json(ARITHMETIC), &["4"]).unwrap();
    let results = engine.run(&prompt_from_json(RENUMBERED), &["40"]).unwrap();
    assert_eq!(first_output(&results, "40"), Some(Value::Int(10)));
    assert!(engine.executed().is_empty(), "ran {:?}", engine.executed());
}

#[test]
fn renumbered_graph_misses_under_identity_keys() {
    let mut engine = Engine::new(Box::new(HierarchicalCache::new(KeyStrategy::Identity)));
    engine.run(&prompt_from_json(ARITHMETIC), &["4"]).unwrap();
    engine.run(&prompt_from_json(RENUMBERED), &["40"]).unwrap();
    assert_eq!(engine.executed().len(), 4);
}

#[test]
fn include_node_id_distinguishes_renumbered_graphs() {
    let settings = CacheSettings {
        include_node_id: true,
        ..CacheSettings::default()
    };
    let mut engine = Engine::from_settings(&settings);
    let prompt = prompt_from_json(ARITHMETIC);
    engine.run(&prompt, &["4"]).unwrap();
    engine.run(&prompt, &["4"]).unwrap();
    assert!(engine.executed().is_empty());
    engine.run(&prompt_from_json(RENUMBERED), &["40"]).unwrap();
    assert_eq!(engine.executed().len(), 4);
}

#[test]
fn unreachable_results_are_collected() {
    let mut engine = signature_engine();
    let prompt = prompt_from_json(ARITHMETIC);
    engine.run(&prompt, &["4"]).unwrap();

    let other = prompt_from_json(r#"{"1": {"class_type": "Constant", "inputs": {"value": 7}}}"#);
    engine.run(&other, &["1"]).unwrap();
    assert_eq!(engine.cache().len(), 1);

    engine.run(&prompt, &["4"]).unwrap();
    assert_eq!(engine.executed().len(), 4);
}

const RANDOM: &str = r#"{
    "1": {"class_type": "Random", "inputs": {}},
    "2": {"class_type": "Add", "inputs": {"a": ["1", 0], "b": 10}}
}"#;

#[test]
fn not_idempotent_nodes_are_keyed_by_id() {
    let mut engine = signature_engine();
    let results = engine.run(&prompt_from_json(RANDOM), &["2"]).unwrap();
    assert_eq!(first_output(&results, "2"), Some(Value::Int(11)));

    let results = engine.run(&prompt_from_json(RANDOM), &["2"]).unwrap();
    assert_eq!(first_output(&results, "2"), Some(Value::Int(11)));
    assert!(engine.executed().is_empty());

    let renumbered = RANDOM.replace(r#""1""#, r#""5""#);
    let results = engine.run(&prompt_from_json(&renumbered), &["2"]).unwrap();
    assert_eq!(first_output(&results, "2"), Some(Value::Int(12)));
    assert!(engine.did_execute("5"));
}

#[test]
fn changed_marker_forces_rerun() {
    let mut engine = signature_engine();
    let prompt = prompt_from_json(RANDOM);
    engine.run(&prompt, &["2"]).unwrap();

    engine.mark_changed("1", 1712.5);
    let results = engine.run(&prompt, &["2"]).unwrap();
    assert_eq!(first_output(&results, "2"), Some(Value::Int(12)));
    assert!(engine.did_execute("1"));
    assert!(engine.did_execute("2"));

    engine.run(&prompt, &["2"]).unwrap();
    assert!(engine.executed().is_empty());
}

#[test]
fn link_to_missing_output_slot_is_an_error() {
    let mut engine = signature_engine();
    let prompt = prompt_from_json(
        r#"{
            "1": {"class_type": "Constant", "inputs": {"value": 2}},
            "2": {"class_type": "Add", "inputs": {"a": ["1", 3], "b": 1}}
        }"#,
    );
    let err = engine.run(&prompt, &["2"]).unwrap_err();
    assert_eq!(err.to_string(), "node '1' has no output 3");
}
