use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Lifecycle status of a node within one run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Processing => write!(f, "PROCESSING"),
            NodeStatus::Succeeded => write!(f, "SUCCEEDED"),
            NodeStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Severity of a diagnostic `message` event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Outcome carried by the final `over` event of a run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverStatus {
    Success,
    Error,
}

/// Everything the engine and manager tell observers about a run.
///
/// Within one workflow, node lifecycle events are emitted strictly in
/// execution order: `PROCESSING(N)`, any `nodes_output` from N's body,
/// then `SUCCEEDED(N)` or `FAILED(N)`, before any event for the next
/// node. `execution_paused` for a node precedes that node's PROCESSING.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    NodeStatusChange {
        #[serde(skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
        node_id: String,
        status: NodeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    NodesOutput {
        #[serde(skip_serializing_if = "Option::is_none")]
        workflow_id: Option<String>,
        node_id: String,
        message: String,
    },
    Message {
        level: MessageLevel,
        node_id: String,
        text: String,
    },
    ExecutionPaused {
        node_id: String,
        reason: String,
    },
    ExecutionResumed {
        node_id: String,
        reason: String,
    },
    ExecutionStepOver {
        node_id: String,
    },
    ExecutionTerminated {
        #[serde(skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        reason: String,
    },
    WorkflowCompleted {
        workflow_id: String,
        message: String,
    },
    WorkflowFailed {
        workflow_id: String,
        message: String,
    },
    Over {
        status: OverStatus,
        message: String,
    },
}

impl RuntimeEvent {
    pub fn processing(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        RuntimeEvent::NodeStatusChange {
            workflow_id: Some(workflow_id.into()),
            node_id: node_id.into(),
            status: NodeStatus::Processing,
            payload: None,
        }
    }

    pub fn succeeded(
        workflow_id: impl Into<String>,
        node_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        RuntimeEvent::NodeStatusChange {
            workflow_id: Some(workflow_id.into()),
            node_id: node_id.into(),
            status: NodeStatus::Succeeded,
            payload: Some(payload),
        }
    }

    pub fn failed(
        workflow_id: impl Into<String>,
        node_id: impl Into<String>,
        kind: &str,
        detail: impl Into<String>,
    ) -> Self {
        RuntimeEvent::NodeStatusChange {
            workflow_id: Some(workflow_id.into()),
            node_id: node_id.into(),
            status: NodeStatus::Failed,
            payload: Some(json!({ "kind": kind, "detail": detail.into() })),
        }
    }

    /// The node this event concerns, when it concerns one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RuntimeEvent::NodeStatusChange { node_id, .. }
            | RuntimeEvent::NodesOutput { node_id, .. }
            | RuntimeEvent::Message { node_id, .. }
            | RuntimeEvent::ExecutionPaused { node_id, .. }
            | RuntimeEvent::ExecutionResumed { node_id, .. }
            | RuntimeEvent::ExecutionStepOver { node_id } => Some(node_id),
            RuntimeEvent::ExecutionTerminated { node_id, .. } => node_id.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<NodeStatus> {
        match self {
            RuntimeEvent::NodeStatusChange { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable label matching the serde tag, used by sinks and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeEvent::NodeStatusChange { .. } => "node_status_change",
            RuntimeEvent::NodesOutput { .. } => "nodes_output",
            RuntimeEvent::Message { .. } => "message",
            RuntimeEvent::ExecutionPaused { .. } => "execution_paused",
            RuntimeEvent::ExecutionResumed { .. } => "execution_resumed",
            RuntimeEvent::ExecutionStepOver { .. } => "execution_step_over",
            RuntimeEvent::ExecutionTerminated { .. } => "execution_terminated",
            RuntimeEvent::WorkflowCompleted { .. } => "workflow_completed",
            RuntimeEvent::WorkflowFailed { .. } => "workflow_failed",
            RuntimeEvent::Over { .. } => "over",
        }
    }

    /// Normalized JSON export: the serialized variant plus a timestamp,
    /// one object per event.
    pub fn to_json_value(&self) -> Value {
        let mut object = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Tagged enum serialization always yields an object.
            _ => Default::default(),
        };
        object.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        Value::Object(object)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEvent::NodeStatusChange {
                node_id, status, ..
            } => write!(f, "[{node_id}] {status}"),
            RuntimeEvent::NodesOutput {
                node_id, message, ..
            } => {
                write!(f, "[{node_id}] output: {message}")
            }
            RuntimeEvent::Message {
                level,
                node_id,
                text,
            } => {
                write!(f, "[{node_id}] {level:?}: {text}")
            }
            RuntimeEvent::ExecutionPaused { node_id, reason } => {
                write!(f, "[{node_id}] paused: {reason}")
            }
            RuntimeEvent::ExecutionResumed { node_id, reason } => {
                write!(f, "[{node_id}] resumed: {reason}")
            }
            RuntimeEvent::ExecutionStepOver { node_id } => write!(f, "[{node_id}] step over"),
            RuntimeEvent::ExecutionTerminated { node_id, reason } => match node_id {
                Some(node_id) => write!(f, "[{node_id}] terminated: {reason}"),
                None => write!(f, "terminated: {reason}"),
            },
            RuntimeEvent::WorkflowCompleted {
                workflow_id,
                message,
            } => {
                write!(f, "workflow {workflow_id} completed: {message}")
            }
            RuntimeEvent::WorkflowFailed {
                workflow_id,
                message,
            } => {
                write!(f, "workflow {workflow_id} failed: {message}")
            }
            RuntimeEvent::Over { status, message } => write!(f, "over ({status:?}): {message}"),
        }
    }
}
