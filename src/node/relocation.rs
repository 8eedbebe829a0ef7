//! Relocation node: overwrites a slot in another node's message store.
//!
//! `sourceVariable` must be a reference naming the `(node, slot)` to
//! overwrite; `targetVariable` supplies the replacement value (constant
//! or reference). This is the one node that writes into foreign stores.

use async_trait::async_trait;
use serde_json::Value;

use super::{Node, NodeContext, required_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;

#[derive(Debug)]
pub struct RelocationNode {
    id: String,
    source_variable: ValueSource,
    target_variable: ValueSource,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl RelocationNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let source_variable = required_input(record, "sourceVariable")?;
        if !source_variable.is_ref() {
            return Err(NodeError::Validation(format!(
                "node {}: sourceVariable must be a reference",
                record.id
            )));
        }
        Ok(Self {
            id: record.id.clone(),
            source_variable,
            target_variable: required_input(record, "targetVariable")?,
            transitions: record.transitions.clone(),
            next: None,
        })
    }
}

#[async_trait]
impl Node for RelocationNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let ValueSource::Ref { node_id, slot } = self.source_variable.clone() else {
            unreachable!("checked at construction");
        };
        // The written-to slot must already exist: overwriting a value a
        // not-yet-executed node would later publish is a wiring error.
        if ctx.hub.get(&node_id, &slot).is_none() {
            return Err(NodeError::MissingInput {
                what: format!("{node_id}.{slot}"),
            });
        }

        let replacement = ctx.resolve(&self.target_variable)?;
        ctx.hub.set(&node_id, &slot, replacement.clone());
        ctx.info(format!("Updated \"{node_id}.{slot}\""));
        ctx.publish("value", replacement.clone());

        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(replacement)
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
