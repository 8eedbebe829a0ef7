//! Call node: transfers control to a named sub-workflow and publishes its
//! result.
//!
//! The invocation goes through the run's [`SubworkflowHost`] (the
//! workflow manager), which executes the callee inline before returning;
//! every event the callee emits therefore lands between this node's
//! PROCESSING and SUCCEEDED/FAILED. The returned value is published under
//! the `output` slot for downstream references.

use async_trait::async_trait;
use serde_json::Value;

use super::{Node, NodeContext, optional_input, required_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;

#[derive(Debug)]
pub struct CallNode {
    id: String,
    target: ValueSource,
    input_data: Option<ValueSource>,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl CallNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        Ok(Self {
            id: record.id.clone(),
            target: required_input(record, "target_workflow")?,
            input_data: optional_input(record, "input_data")?,
            transitions: record.transitions.clone(),
            next: None,
        })
    }

    fn call_error(&self, reason: impl Into<String>) -> NodeError {
        NodeError::Call {
            node_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Node for CallNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let host = ctx
            .host
            .ok_or_else(|| self.call_error("no workflow manager attached to this run"))?;

        let target = ctx.resolve(&self.target)?;
        let target = target
            .as_str()
            .ok_or_else(|| self.call_error("target_workflow must be a string"))?
            .to_string();
        if target.is_empty() {
            return Err(self.call_error("target_workflow is empty"));
        }

        let input = match &self.input_data {
            Some(source) => Some(ctx.resolve(source)?),
            None => None,
        };

        ctx.info(format!("Calling sub-workflow: {target}"));
        let returned = host.call(&target, &self.id, input).await?;

        ctx.publish("output", returned.clone());
        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(returned)
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }

    fn cleanup(&mut self) {
        self.next = None;
    }
}
