//! Document and bundle parsing, plus prepared-graph stability.

mod common;

use serde_json::json;

use common::*;
use loomflow::document::{ValueSource, WorkflowBundle, WorkflowDocument, WorkflowKind};
use loomflow::graph::PreparedGraph;

#[test]
fn documents_parse_from_their_wire_shape() {
    let raw = json!({
        "nodes": [
            { "id": "start_1", "type": "start", "data": {}, "meta": { "position": { "x": 0 } } },
            { "id": "cond_1", "type": "condition", "data": { "conditions": [] } },
            { "id": "end_1", "type": "end" },
        ],
        "edges": [
            { "sourceNodeID": "start_1", "targetNodeID": "cond_1" },
            { "sourceNodeID": "cond_1", "targetNodeID": "end_1", "sourcePortID": "if_a" },
        ],
    });
    let document: WorkflowDocument = serde_json::from_value(raw).expect("parse document");
    assert_eq!(document.nodes.len(), 3);
    assert_eq!(document.nodes[0].kind, "start");
    assert_eq!(document.edges[1].source_port_id.as_deref(), Some("if_a"));
}

#[test]
fn bundles_parse_with_workflow_kinds_and_names() {
    let raw = json!({
        "wf_main": { "type": "main", "name": "Main", "nodes": [], "edges": [] },
        "wf_sub": { "type": "sub", "name": "SubA", "nodes": [], "edges": [] },
    });
    let bundle: WorkflowBundle = serde_json::from_value(raw).expect("parse bundle");
    assert_eq!(bundle["wf_main"].kind, WorkflowKind::Main);
    assert_eq!(bundle["wf_sub"].kind, WorkflowKind::Sub);
    assert_eq!(bundle["wf_sub"].name, "SubA");
}

#[test]
fn value_descriptors_round_trip_through_serde() {
    let constant: ValueSource =
        serde_json::from_value(json!({ "kind": "constant", "content": [1, 2] }))
            .expect("parse constant");
    assert_eq!(constant, ValueSource::constant(json!([1, 2])));

    let reference: ValueSource =
        serde_json::from_value(json!({ "kind": "ref", "content": ["start_1", "msg"] }))
            .expect("parse ref");
    assert_eq!(reference, ValueSource::reference("start_1", "msg"));

    let encoded = serde_json::to_value(&reference).expect("serialize");
    assert_eq!(encoded, json!({ "kind": "ref", "content": ["start_1", "msg"] }));
}

#[test]
fn re_preparing_the_same_document_yields_the_same_graph() {
    let document = linear_print_document();
    let first = PreparedGraph::from_document(&document).expect("prepare");
    let second = PreparedGraph::from_document(&document).expect("prepare again");
    assert_eq!(first, second);
}

#[test]
fn prepared_graphs_survive_a_serialization_round_trip() {
    let document = linear_print_document();
    let graph = PreparedGraph::from_document(&document).expect("prepare");
    let encoded = serde_json::to_string(&graph).expect("serialize");
    let decoded: PreparedGraph = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(graph, decoded);
}
