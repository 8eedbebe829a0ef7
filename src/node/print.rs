//! Print node: diagnostic passthrough that emits its resolved input as a
//! `nodes_output` event.

use async_trait::async_trait;
use serde_json::Value;

use super::{Node, NodeContext, required_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::utils::values::{display_value, is_empty_value};

#[derive(Debug)]
pub struct PrintNode {
    id: String,
    input: ValueSource,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl PrintNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        Ok(Self {
            id: record.id.clone(),
            input: required_input(record, "input")?,
            transitions: record.transitions.clone(),
            next: None,
        })
    }
}

#[async_trait]
impl Node for PrintNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let value = ctx.resolve(&self.input)?;
        if is_empty_value(&value) {
            ctx.warn("input value is empty");
        }
        let rendered = display_value(&value);
        ctx.output(rendered.clone());
        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(Value::String(rendered))
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
