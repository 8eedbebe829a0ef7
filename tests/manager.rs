//! Workflow manager integration tests: bundle registration, sub-workflow
//! call/return, event nesting, and memory reclamation.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use loomflow::document::{Edge, NodeRecord, WorkflowDocument};
use loomflow::error::ManagerError;
use loomflow::event_bus::{EventBus, MemorySink, NodeStatus, OverStatus, RuntimeEvent};
use loomflow::manager::{WorkflowManager, WorkflowStatus};

fn call_node(id: &str, target: &str) -> NodeRecord {
    NodeRecord::new(
        id,
        "call",
        json!({ "inputsValues": { "target_workflow": constant(target) } }),
    )
}

fn call_main_document() -> WorkflowDocument {
    WorkflowDocument {
        nodes: vec![
            start_node("start_m"),
            call_node("call_1", "SubA"),
            end_node("end_m"),
        ],
        edges: vec![Edge::new("start_m", "call_1"), Edge::new("call_1", "end_m")],
    }
}

fn sub_print_document(message: &str) -> WorkflowDocument {
    WorkflowDocument {
        nodes: vec![
            start_node("start_s"),
            print_node("print_sub", constant(message)),
            end_node("end_s"),
        ],
        edges: vec![
            Edge::new("start_s", "print_sub"),
            Edge::new("print_sub", "end_s"),
        ],
    }
}

fn manager_with_sink(entries: Vec<(&str, loomflow::document::WorkflowEntry)>) -> (WorkflowManager, MemorySink) {
    let sink = MemorySink::new();
    let bus = Arc::new(EventBus::with_sink(sink.clone()));
    let manager = WorkflowManager::new(bus);
    manager.register(bundle(entries)).expect("register bundle");
    (manager, sink)
}

#[tokio::test]
async fn sub_workflow_events_nest_inside_the_call_node_window() {
    let (manager, sink) = manager_with_sink(vec![
        ("main", main_entry(call_main_document())),
        ("sub_a", sub_entry("SubA", sub_print_document("from-sub"))),
    ]);

    let message = manager.run().await.expect("run succeeds");
    assert_eq!(message, "Workflow executed successfully");

    let events = sink.snapshot();
    assert_eq!(output_messages(&events), vec!["from-sub".to_string()]);

    let call_processing =
        position(&events, |e| is_status(e, "call_1", NodeStatus::Processing)).unwrap();
    let call_succeeded =
        position(&events, |e| is_status(e, "call_1", NodeStatus::Succeeded)).unwrap();
    for node in ["start_s", "print_sub", "end_s"] {
        let processing =
            position(&events, |e| is_status(e, node, NodeStatus::Processing)).unwrap();
        let succeeded = position(&events, |e| is_status(e, node, NodeStatus::Succeeded)).unwrap();
        assert!(
            call_processing < processing && succeeded < call_succeeded,
            "sub node {node} must run inside the call window"
        );
    }

    // Sub events carry the sub's workflow id.
    let tagged = events.iter().any(|event| {
        matches!(
            event,
            RuntimeEvent::NodeStatusChange { workflow_id: Some(id), node_id, .. }
                if id == "sub_a" && node_id == "print_sub"
        )
    });
    assert!(tagged);

    // Exactly one over event, at the very end, from the root engine.
    let overs: Vec<&RuntimeEvent> = events
        .iter()
        .filter(|e| matches!(e, RuntimeEvent::Over { .. }))
        .collect();
    assert_eq!(overs.len(), 1);
    assert!(matches!(
        events.last(),
        Some(RuntimeEvent::Over { status: OverStatus::Success, .. })
    ));

    // Reclamation: the sub engine is gone, the stack is empty.
    assert_eq!(manager.live_engine_ids(), vec!["main".to_string()]);
    assert_eq!(manager.call_stack_depth(), 0);
    assert_eq!(manager.status("sub_a"), Some(WorkflowStatus::Completed));
    assert_eq!(manager.status("main"), Some(WorkflowStatus::Completed));
}

#[tokio::test]
async fn nested_sub_workflow_calls_unwind_in_order() {
    let sub_a = WorkflowDocument {
        nodes: vec![
            start_node("start_a"),
            call_node("call_b", "SubB"),
            end_node("end_a"),
        ],
        edges: vec![Edge::new("start_a", "call_b"), Edge::new("call_b", "end_a")],
    };
    let (manager, sink) = manager_with_sink(vec![
        ("main", main_entry(call_main_document())),
        ("sub_a", sub_entry("SubA", sub_a)),
        ("sub_b", sub_entry("SubB", sub_print_document("deep"))),
    ]);

    manager.run().await.expect("run succeeds");

    let events = sink.snapshot();
    let outer_start =
        position(&events, |e| is_status(e, "call_1", NodeStatus::Processing)).unwrap();
    let inner_start =
        position(&events, |e| is_status(e, "call_b", NodeStatus::Processing)).unwrap();
    let inner_done =
        position(&events, |e| is_status(e, "call_b", NodeStatus::Succeeded)).unwrap();
    let outer_done =
        position(&events, |e| is_status(e, "call_1", NodeStatus::Succeeded)).unwrap();
    assert!(outer_start < inner_start && inner_start < inner_done && inner_done < outer_done);

    assert_eq!(manager.live_engine_ids(), vec!["main".to_string()]);
    assert_eq!(manager.call_stack_depth(), 0);
}

#[tokio::test]
async fn call_input_data_reaches_the_sub_start_input_slot() {
    let call = NodeRecord::new(
        "call_1",
        "call",
        json!({
            "inputsValues": {
                "target_workflow": constant("SubA"),
                "input_data": constant(json!({ "x": 1 })),
            }
        }),
    );
    let main = WorkflowDocument {
        nodes: vec![start_node("start_m"), call, end_node("end_m")],
        edges: vec![Edge::new("start_m", "call_1"), Edge::new("call_1", "end_m")],
    };
    let sub = WorkflowDocument {
        nodes: vec![
            start_node("start_s"),
            print_node("print_sub", reference("start_s", "input")),
            end_node("end_s"),
        ],
        edges: vec![
            Edge::new("start_s", "print_sub"),
            Edge::new("print_sub", "end_s"),
        ],
    };
    let (manager, sink) = manager_with_sink(vec![
        ("main", main_entry(main)),
        ("sub_a", sub_entry("SubA", sub)),
    ]);

    manager.run().await.expect("run succeeds");
    assert_eq!(
        output_messages(&sink.snapshot()),
        vec!["{\"x\":1}".to_string()]
    );
}

#[tokio::test]
async fn sub_workflow_failure_fails_the_call_node_and_the_run() {
    let failing_sub = WorkflowDocument {
        nodes: vec![
            start_node("start_s"),
            print_node("print_sub", reference("ghost", "slot")),
            end_node("end_s"),
        ],
        edges: vec![
            Edge::new("start_s", "print_sub"),
            Edge::new("print_sub", "end_s"),
        ],
    };
    let (manager, sink) = manager_with_sink(vec![
        ("main", main_entry(call_main_document())),
        ("sub_a", sub_entry("SubA", failing_sub)),
    ]);

    let result = manager.run().await;
    assert!(result.is_err());

    let events = sink.snapshot();
    let call_failure = events
        .iter()
        .find_map(|event| match event {
            RuntimeEvent::NodeStatusChange {
                node_id,
                status: NodeStatus::Failed,
                payload: Some(payload),
                ..
            } if node_id == "call_1" => Some(payload.clone()),
            _ => None,
        })
        .expect("call node FAILED payload");
    assert_eq!(call_failure["kind"], json!("CallNodeError"));

    assert_eq!(manager.status("sub_a"), Some(WorkflowStatus::Failed));
    assert_eq!(manager.status("main"), Some(WorkflowStatus::Failed));
    // The failed sub engine is still reclaimed.
    assert_eq!(manager.live_engine_ids(), vec!["main".to_string()]);
    assert!(matches!(
        events.last(),
        Some(RuntimeEvent::Over { status: OverStatus::Error, .. })
    ));
}

#[tokio::test]
async fn unknown_call_target_surfaces_as_a_call_error() {
    let (manager, sink) = manager_with_sink(vec![
        ("main", main_entry(call_main_document())),
        ("sub_other", sub_entry("NotSubA", sub_print_document("x"))),
    ]);

    let result = manager.run().await;
    assert!(result.is_err());

    let detail = sink
        .snapshot()
        .iter()
        .find_map(|event| match event {
            RuntimeEvent::NodeStatusChange {
                status: NodeStatus::Failed,
                payload: Some(payload),
                ..
            } => Some(payload["detail"].as_str().unwrap_or_default().to_string()),
            _ => None,
        })
        .expect("failure payload");
    assert!(detail.contains("unknown workflow"), "got: {detail}");
}

#[tokio::test]
async fn calling_the_main_workflow_is_rejected() {
    let mut main = call_main_document();
    // Target the main workflow by its own id.
    main.nodes[1] = call_node("call_1", "main");
    let (manager, sink) = manager_with_sink(vec![("main", main_entry(main))]);

    let result = manager.run().await;
    assert!(result.is_err());

    let detail = sink
        .snapshot()
        .iter()
        .find_map(|event| match event {
            RuntimeEvent::NodeStatusChange {
                status: NodeStatus::Failed,
                payload: Some(payload),
                ..
            } => Some(payload["detail"].as_str().unwrap_or_default().to_string()),
            _ => None,
        })
        .expect("failure payload");
    assert!(detail.contains("not a sub-workflow"), "got: {detail}");
}

#[tokio::test]
async fn duplicate_main_workflows_are_rejected_at_registration() {
    let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
    let manager = WorkflowManager::new(bus);
    let result = manager.register(bundle(vec![
        ("main_1", main_entry(linear_print_document())),
        ("main_2", main_entry(linear_print_document())),
    ]));
    assert!(matches!(result, Err(ManagerError::DuplicateMain { .. })));
}

#[tokio::test]
async fn duplicate_sub_names_are_rejected_at_registration() {
    let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
    let manager = WorkflowManager::new(bus);
    let result = manager.register(bundle(vec![
        ("main", main_entry(linear_print_document())),
        ("sub_1", sub_entry("SubA", sub_print_document("a"))),
        ("sub_2", sub_entry("SubA", sub_print_document("b"))),
    ]));
    assert!(matches!(result, Err(ManagerError::DuplicateSubName { .. })));
}

#[tokio::test]
async fn running_without_a_main_workflow_is_an_error() {
    let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
    let manager = WorkflowManager::new(bus);
    manager
        .register(bundle(vec![(
            "sub_a",
            sub_entry("SubA", sub_print_document("a")),
        )]))
        .expect("register");
    assert!(matches!(
        manager.run().await,
        Err(ManagerError::NoMainWorkflow)
    ));
}

#[tokio::test]
async fn memory_summary_reports_live_engines_and_instance_counts() {
    let (manager, _sink) = manager_with_sink(vec![
        ("main", main_entry(linear_print_document())),
        ("sub_a", sub_entry("SubA", sub_print_document("a"))),
    ]);

    manager.run().await.expect("run succeeds");

    let summary = manager.memory_summary();
    assert_eq!(summary.len(), 1, "only the main engine is live");
    assert_eq!(summary[0].workflow_id, "main");
    assert_eq!(summary[0].status, WorkflowStatus::Completed);
    // start_1, print_1, end_1 stay instantiated until the manager drops.
    assert_eq!(summary[0].node_instances, 3);
}

#[tokio::test]
async fn force_cleanup_reclaims_directly_executed_sub_workflows() {
    let (manager, _sink) = manager_with_sink(vec![
        ("main", main_entry(linear_print_document())),
        ("sub_a", sub_entry("SubA", sub_print_document("a"))),
    ]);

    // Executing a sub directly leaves its engine live (only the call
    // path reclaims automatically).
    manager.execute_workflow("sub_a").await.expect("sub runs");
    assert!(manager.live_engine_ids().contains(&"sub_a".to_string()));

    manager.force_cleanup_subworkflows().await;
    assert!(!manager.live_engine_ids().contains(&"sub_a".to_string()));
    assert_eq!(manager.status("sub_a"), Some(WorkflowStatus::Completed));
}
