#![allow(dead_code)]

//! Shared builders for integration tests: document fragments, bundles,
//! and event-sequence helpers.

use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::time::Duration;

use loomflow::document::{
    Edge, NodeRecord, WorkflowBundle, WorkflowDocument, WorkflowEntry, WorkflowKind,
};
use loomflow::event_bus::{NodeStatus, RuntimeEvent};

pub fn constant(value: impl Into<Value>) -> Value {
    json!({ "kind": "constant", "content": value.into() })
}

pub fn reference(node: &str, slot: &str) -> Value {
    json!({ "kind": "ref", "content": [node, slot] })
}

pub fn start_node(id: &str) -> NodeRecord {
    NodeRecord::new(id, "start", json!({}))
}

/// A start node with declared output slots, e.g.
/// `{"msg": {"type": "string", "default": "Hi"}}`.
pub fn start_node_with_outputs(id: &str, properties: Value) -> NodeRecord {
    NodeRecord::new(id, "start", json!({ "outputs": { "properties": properties } }))
}

pub fn end_node(id: &str) -> NodeRecord {
    NodeRecord::new(id, "end", json!({}))
}

pub fn print_node(id: &str, input: Value) -> NodeRecord {
    NodeRecord::new(id, "print", json!({ "inputsValues": { "input": input } }))
}

/// The scenario workhorse: start → print("hello") → end.
pub fn linear_print_document() -> WorkflowDocument {
    WorkflowDocument {
        nodes: vec![
            start_node("start_1"),
            print_node("print_1", constant("hello")),
            end_node("end_1"),
        ],
        edges: vec![Edge::new("start_1", "print_1"), Edge::new("print_1", "end_1")],
    }
}

pub fn main_entry(document: WorkflowDocument) -> WorkflowEntry {
    WorkflowEntry {
        kind: WorkflowKind::Main,
        name: "Main".to_string(),
        nodes: document.nodes,
        edges: document.edges,
    }
}

pub fn sub_entry(name: &str, document: WorkflowDocument) -> WorkflowEntry {
    WorkflowEntry {
        kind: WorkflowKind::Sub,
        name: name.to_string(),
        nodes: document.nodes,
        edges: document.edges,
    }
}

pub fn bundle(entries: Vec<(&str, WorkflowEntry)>) -> WorkflowBundle {
    let mut bundle: WorkflowBundle = FxHashMap::default();
    for (id, entry) in entries {
        bundle.insert(id.to_string(), entry);
    }
    bundle
}

/// The `(node id, status)` projection of a captured event sequence.
pub fn status_sequence(events: &[RuntimeEvent]) -> Vec<(String, NodeStatus)> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::NodeStatusChange {
                node_id, status, ..
            } => Some((node_id.clone(), *status)),
            _ => None,
        })
        .collect()
}

/// All `nodes_output` messages in emission order.
pub fn output_messages(events: &[RuntimeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RuntimeEvent::NodesOutput { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Index of the first event matching the predicate.
pub fn position(
    events: &[RuntimeEvent],
    predicate: impl Fn(&RuntimeEvent) -> bool,
) -> Option<usize> {
    events.iter().position(predicate)
}

pub fn is_status(event: &RuntimeEvent, node: &str, status: NodeStatus) -> bool {
    matches!(
        event,
        RuntimeEvent::NodeStatusChange { node_id, status: s, .. }
            if node_id == node && *s == status
    )
}

/// Await the next event matching the predicate on a live channel, with a
/// generous timeout so a wedged engine fails the test instead of hanging
/// the suite.
pub async fn wait_for(
    rx: &flume::Receiver<RuntimeEvent>,
    what: &str,
    predicate: impl Fn(&RuntimeEvent) -> bool,
) -> RuntimeEvent {
    let deadline = Duration::from_secs(5);
    let fut = async {
        loop {
            let event = rx.recv_async().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(deadline, fut)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}
