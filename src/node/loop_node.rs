//! Loop node: bounded iteration of an inner subgraph over an array.
//!
//! `batchFor` must be a reference to the iterable. For each item the node
//! discards the previous iteration's inner instances and stores,
//! instantiates the inner nodes afresh, publishes the item under its own
//! `item` slot (inner nodes reference it through the loop node's id), and
//! walks the inner subgraph like a miniature engine. An inner condition
//! selecting no branch is a legal early exit; any other walk must finish
//! on an inner end node. Inner failures wrap as loop errors.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::{Node, NodeContext, NodeFactory, single_successor};
use crate::document::{Edge, NodeRecord, ValueSource};
use crate::error::NodeError;
use crate::graph::{CONDITION_KIND, END_KIND, PreparedGraph, PreparedNode, START_KIND};

#[derive(Debug)]
pub struct LoopNode {
    id: String,
    batch_for: ValueSource,
    inner: PreparedGraph,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl LoopNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let batch_for = record
            .data
            .get("batchFor")
            .map(ValueSource::from_json)
            .transpose()
            .map_err(|detail| {
                NodeError::Validation(format!("node {}: bad batchFor: {detail}", record.id))
            })?
            .ok_or_else(|| {
                NodeError::Validation(format!("node {}: missing batchFor", record.id))
            })?;
        if !batch_for.is_ref() {
            return Err(NodeError::Validation(format!(
                "node {}: batchFor must be a reference",
                record.id
            )));
        }

        let blocks: Vec<NodeRecord> = record
            .data
            .get("blocks")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let edges: Vec<Edge> = record
            .data
            .get("edges")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let inner = PreparedGraph::prepare(&blocks, &edges).map_err(|err| {
            NodeError::Validation(format!("node {}: bad loop body: {err}", record.id))
        })?;

        Ok(Self {
            id: record.id.clone(),
            batch_for,
            inner,
            transitions: record.transitions.clone(),
            next: None,
        })
    }

    async fn run_iteration(
        &self,
        ctx: &mut NodeContext<'_>,
        start_id: &str,
        item: &Value,
    ) -> Result<(), NodeError> {
        // Reclaim the previous iteration before instantiating afresh.
        for node in self.inner.iter() {
            ctx.hub.remove_node(&node.id);
        }
        let mut instances: FxHashMap<String, Box<dyn Node>> = FxHashMap::default();
        for node in self.inner.iter() {
            let instance = NodeFactory::create(node, ctx.hub).map_err(|err| self.wrap(err))?;
            instances.insert(node.id.clone(), instance);
        }

        ctx.publish("item", item.clone());

        let mut current = Some(start_id.to_string());
        let mut last_kind = String::new();
        while let Some(node_id) = current.take() {
            let Some(node) = instances.get_mut(&node_id) else {
                return Err(self.wrap(NodeError::Validation(format!(
                    "loop body references unknown node {node_id}"
                ))));
            };
            last_kind = self
                .inner
                .get(&node_id)
                .map(|prepared| prepared.kind.clone())
                .unwrap_or_default();

            {
                let mut child = ctx.child(&node_id);
                node.run(&mut child).await.map_err(|err| self.wrap(err))?;
            }
            current = node.next().map(str::to_string);

            // A condition with no matching branch exits this item early.
            if current.is_none() && last_kind == CONDITION_KIND {
                return Ok(());
            }
        }

        if last_kind != END_KIND {
            return Err(self.wrap(NodeError::Validation(
                "loop body did not finish on an End node".to_string(),
            )));
        }
        Ok(())
    }

    fn wrap(&self, inner: NodeError) -> NodeError {
        NodeError::Loop {
            node_id: self.id.clone(),
            source: Box::new(inner),
        }
    }
}

#[async_trait]
impl Node for LoopNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        ctx.info("Loop start!");

        let items = ctx.resolve(&self.batch_for)?;
        let items = items
            .as_array()
            .cloned()
            .ok_or_else(|| NodeError::Validation(format!(
                "node {}: batchFor must resolve to an array",
                self.id
            )))?;

        let start_id = {
            let mut starts = self.inner.ids_of_kind(START_KIND);
            let first = starts.next().map(str::to_string);
            match (first, starts.next()) {
                (Some(id), None) => id,
                _ => {
                    return Err(NodeError::Validation(format!(
                        "node {}: loop body needs exactly one Start node",
                        self.id
                    )));
                }
            }
        };
        if !self.inner.has_end() {
            return Err(NodeError::Validation(format!(
                "node {}: loop body needs an End node",
                self.id
            )));
        }

        for item in &items {
            self.run_iteration(ctx, &start_id, item).await?;
        }

        self.next = Some(single_successor(&self.transitions, &self.id)?);
        ctx.info("Loop end!");
        Ok(ctx.hub.snapshot(&self.id))
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
