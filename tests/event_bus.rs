//! Event bus integration tests: sink fan-out, JSON export, and
//! serialization round-trips.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Value, json};

use common::*;
use loomflow::event_bus::{
    ChannelSink, EventBus, JsonLinesSink, MemorySink, MessageLevel, NodeStatus, OverStatus,
    RuntimeEvent,
};

#[test]
fn channel_sink_forwards_events_in_order() {
    let (tx, rx) = flume::unbounded();
    let bus = EventBus::with_sink(ChannelSink::new(tx));

    bus.emit(&RuntimeEvent::processing("wf", "n1"));
    bus.emit(&RuntimeEvent::succeeded("wf", "n1", json!("done")));

    let first = rx.try_recv().expect("first event");
    assert!(is_status(&first, "n1", NodeStatus::Processing));
    let second = rx.try_recv().expect("second event");
    assert!(is_status(&second, "n1", NodeStatus::Succeeded));
    assert!(rx.try_recv().is_err());
}

#[test]
fn dropped_receiver_does_not_poison_other_sinks() {
    let (tx, rx) = flume::unbounded();
    drop(rx);
    let witness = MemorySink::new();
    let bus = EventBus::with_sinks(vec![
        Box::new(ChannelSink::new(tx)),
        Box::new(witness.clone()),
    ]);

    bus.emit(&RuntimeEvent::processing("wf", "n"));
    assert_eq!(witness.snapshot().len(), 1);
}

#[test]
fn json_export_carries_the_event_tag_and_timestamp() {
    let event = RuntimeEvent::failed("wf", "print_1", "MissingInput", "ghost.slot");
    let value = event.to_json_value();
    assert_eq!(value["event"], json!("node_status_change"));
    assert_eq!(value["node_id"], json!("print_1"));
    assert_eq!(value["status"], json!("FAILED"));
    assert_eq!(value["payload"]["kind"], json!("MissingInput"));
    assert!(value["timestamp"].is_string());

    let over = RuntimeEvent::Over {
        status: OverStatus::Success,
        message: "done".to_string(),
    };
    assert_eq!(over.to_json_value()["event"], json!("over"));
}

#[test]
fn json_lines_sink_writes_one_object_per_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.jsonl");
    {
        let bus = EventBus::with_sink(JsonLinesSink::to_file(&path).expect("open sink"));
        bus.emit(&RuntimeEvent::processing("wf", "a"));
        bus.emit(&RuntimeEvent::NodesOutput {
            workflow_id: Some("wf".to_string()),
            node_id: "a".to_string(),
            message: "hello".to_string(),
        });
    }

    let contents = std::fs::read_to_string(&path).expect("read artifact");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: Value = serde_json::from_str(lines[0]).expect("line 1 parses");
    assert_eq!(first["event"], json!("node_status_change"));
    let second: Value = serde_json::from_str(lines[1]).expect("line 2 parses");
    assert_eq!(second["message"], json!("hello"));
}

fn text_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 _.-]{0,24}").unwrap()
}

fn payload_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        text_strategy().prop_map(|s| Some(Value::String(s))),
        any::<bool>().prop_map(|b| Some(Value::Bool(b))),
        any::<i32>().prop_map(|n| Some(json!(n))),
    ]
}

fn status_strategy() -> impl Strategy<Value = NodeStatus> {
    prop_oneof![
        Just(NodeStatus::Processing),
        Just(NodeStatus::Succeeded),
        Just(NodeStatus::Failed),
    ]
}

fn level_strategy() -> impl Strategy<Value = MessageLevel> {
    prop_oneof![
        Just(MessageLevel::Info),
        Just(MessageLevel::Warning),
        Just(MessageLevel::Error),
    ]
}

fn event_strategy() -> impl Strategy<Value = RuntimeEvent> {
    prop_oneof![
        (
            prop::option::of(text_strategy()),
            text_strategy(),
            status_strategy(),
            payload_strategy(),
        )
            .prop_map(|(workflow_id, node_id, status, payload)| {
                RuntimeEvent::NodeStatusChange {
                    workflow_id,
                    node_id,
                    status,
                    payload,
                }
            }),
        (prop::option::of(text_strategy()), text_strategy(), text_strategy()).prop_map(
            |(workflow_id, node_id, message)| RuntimeEvent::NodesOutput {
                workflow_id,
                node_id,
                message,
            }
        ),
        (level_strategy(), text_strategy(), text_strategy()).prop_map(
            |(level, node_id, text)| RuntimeEvent::Message {
                level,
                node_id,
                text,
            }
        ),
        (text_strategy(), text_strategy()).prop_map(|(node_id, reason)| {
            RuntimeEvent::ExecutionPaused { node_id, reason }
        }),
        (prop::option::of(text_strategy()), text_strategy()).prop_map(|(node_id, reason)| {
            RuntimeEvent::ExecutionTerminated { node_id, reason }
        }),
        (text_strategy(), text_strategy()).prop_map(|(workflow_id, message)| {
            RuntimeEvent::WorkflowCompleted {
                workflow_id,
                message,
            }
        }),
        (any::<bool>(), text_strategy()).prop_map(|(ok, message)| RuntimeEvent::Over {
            status: if ok {
                OverStatus::Success
            } else {
                OverStatus::Error
            },
            message,
        }),
    ]
}

proptest! {
    #[test]
    fn event_serialization_round_trips(event in event_strategy()) {
        let encoded = serde_json::to_string(&event).expect("serialize");
        let decoded: RuntimeEvent = serde_json::from_str(&encoded).expect("deserialize");
        prop_assert_eq!(decoded, event);
    }
}
