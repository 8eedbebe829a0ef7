//! JSON processor: structural operations over resolved values.
//!
//! Modes: `parse` (string → value), `stringify` (value → string,
//! optionally pretty), `query` / `update` (dotted-path access), `merge`
//! (deep object union, right side wins on conflicts). Results are
//! published under `result`, with `found` alongside for queries.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Node, NodeContext, optional_input, required_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::utils::json_ext::{deep_merge, get_path, set_path};
use crate::utils::values::truthy;

#[derive(Debug)]
pub struct JsonNode {
    id: String,
    mode: String,
    input_data: ValueSource,
    path: Option<ValueSource>,
    new_value: Option<ValueSource>,
    other: Option<ValueSource>,
    pretty: Option<ValueSource>,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl JsonNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let mode = record
            .data
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            id: record.id.clone(),
            mode,
            input_data: required_input(record, "inputData")?,
            path: optional_input(record, "path")?,
            new_value: optional_input(record, "newValue")?,
            other: optional_input(record, "other")?,
            pretty: optional_input(record, "pretty")?,
            transitions: record.transitions.clone(),
            next: None,
        })
    }

    /// Inputs may arrive as already-structured values or as JSON text.
    fn structured(&self, value: Value) -> Result<Value, NodeError> {
        match value {
            Value::String(text) => serde_json::from_str(&text).map_err(NodeError::from),
            other => Ok(other),
        }
    }

    fn path_input(&self, ctx: &NodeContext<'_>) -> Result<String, NodeError> {
        let source = self.path.as_ref().ok_or_else(|| {
            NodeError::Validation(format!("node {}: missing input `path`", self.id))
        })?;
        let value = ctx.resolve(source)?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            NodeError::Validation(format!("node {}: input `path` must be a string", self.id))
        })
    }
}

#[async_trait]
impl Node for JsonNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let input = ctx.resolve(&self.input_data)?;

        let outputs = match self.mode.as_str() {
            "parse" => {
                let parsed = self.structured(input)?;
                json!({ "result": parsed })
            }
            "stringify" => {
                let pretty = ctx
                    .resolve_optional(self.pretty.as_ref())
                    .is_some_and(|v| truthy(&v));
                let rendered = if pretty {
                    serde_json::to_string_pretty(&input)?
                } else {
                    serde_json::to_string(&input)?
                };
                json!({ "result": rendered })
            }
            "query" => {
                let data = self.structured(input)?;
                let path = self.path_input(ctx)?;
                let found = get_path(&data, &path).cloned();
                json!({ "result": found.clone().unwrap_or(Value::Null), "found": found.is_some() })
            }
            "update" => {
                let mut data = self.structured(input)?;
                let path = self.path_input(ctx)?;
                let replacement = self
                    .new_value
                    .as_ref()
                    .map(|source| ctx.resolve(source))
                    .transpose()?
                    .ok_or_else(|| {
                        NodeError::Validation(format!(
                            "node {}: missing input `newValue`",
                            self.id
                        ))
                    })?;
                set_path(&mut data, &path, replacement).map_err(|detail| {
                    NodeError::Execution {
                        detail: format!("update at `{path}` failed: {detail}"),
                    }
                })?;
                json!({ "result": data })
            }
            "merge" => {
                let left = self.structured(input)?;
                let right = self
                    .other
                    .as_ref()
                    .map(|source| ctx.resolve(source))
                    .transpose()?
                    .ok_or_else(|| {
                        NodeError::Validation(format!("node {}: missing input `other`", self.id))
                    })?;
                let right = self.structured(right)?;
                if !(left.is_object() && right.is_object()) {
                    return Err(NodeError::Validation(format!(
                        "node {}: merge requires two objects",
                        self.id
                    )));
                }
                json!({ "result": deep_merge(&left, &right) })
            }
            other => {
                return Err(NodeError::Validation(format!(
                    "node {}: unsupported json mode: {other}",
                    self.id
                )));
            }
        };

        if let Some(map) = outputs.as_object() {
            for (slot, value) in map {
                ctx.publish(slot, value.clone());
            }
        }

        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(outputs)
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
