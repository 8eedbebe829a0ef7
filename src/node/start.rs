//! Start node: the workflow's entry point and initial message producer.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::{Node, NodeContext, single_successor};
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::store::MessageHub;

/// Seeds its message store from the declared output slots at construction
/// (defaults from `data.outputs.properties`, with `{}` / `[]` synthesized
/// for object / array slots) and publishes a `timestamp` slot when run.
///
/// Slots already present in the store are left alone, so bootstrap input
/// delivered by a caller workflow survives the default pass.
#[derive(Debug)]
pub struct StartNode {
    id: String,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl StartNode {
    pub fn new(record: &PreparedNode, hub: &mut MessageHub) -> Result<Self, NodeError> {
        if let Some(properties) = record
            .data
            .get("outputs")
            .and_then(|outputs| outputs.get("properties"))
            .and_then(Value::as_object)
        {
            for (slot, info) in properties {
                let default = match info.get("type").and_then(Value::as_str) {
                    Some("object") => json!({}),
                    Some("array") => json!([]),
                    _ => info.get("default").cloned().unwrap_or(Value::Null),
                };
                hub.set_if_absent(&record.id, slot, default);
            }
        }

        Ok(Self {
            id: record.id.clone(),
            transitions: record.transitions.clone(),
            next: None,
        })
    }
}

#[async_trait]
impl Node for StartNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        ctx.publish("timestamp", json!(Utc::now().to_rfc3339()));
        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(ctx.hub.snapshot(&self.id))
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
