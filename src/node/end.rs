//! End node: terminates an execution path.

use async_trait::async_trait;
use serde_json::Value;

use super::{Node, NodeContext};
use crate::error::NodeError;
use crate::graph::PreparedNode;

#[derive(Debug)]
pub struct EndNode {
    #[allow(dead_code)]
    id: String,
}

impl EndNode {
    pub fn new(record: &PreparedNode) -> Self {
        Self {
            id: record.id.clone(),
        }
    }
}

#[async_trait]
impl Node for EndNode {
    async fn run(&mut self, _ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        Ok(Value::Null)
    }

    fn next(&self) -> Option<&str> {
        None
    }
}
