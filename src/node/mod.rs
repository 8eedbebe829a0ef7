//! Node execution framework: the [`Node`] trait, the execution context
//! handed to running nodes, and the factory that builds instances from
//! prepared records.
//!
//! A node is a typed unit of work with inputs, outputs, and
//! exactly-one-or-branching successor selection. Instances are created
//! lazily on first execution, own no graph state beyond their
//! configuration, and publish outputs into the engine's [`MessageHub`]
//! where downstream value references find them.

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{ValueSource, input_source};
use crate::error::NodeError;
use crate::event_bus::{EventBus, MessageLevel, RuntimeEvent};
use crate::graph::PreparedNode;
use crate::store::MessageHub;

mod call;
mod condition;
mod end;
mod json;
mod loop_node;
mod print;
mod relocation;
mod sleep;
mod start;
mod text;

pub use call::CallNode;
pub use condition::{ConditionNode, Operator};
pub use end::EndNode;
pub use json::JsonNode;
pub use loop_node::LoopNode;
pub use print::PrintNode;
pub use relocation::RelocationNode;
pub use sleep::SleepNode;
pub use start::StartNode;
pub use text::TextNode;

/// Core trait for executable workflow nodes.
///
/// `run` executes the node's work, publishes outputs through the context,
/// and records the successor that [`Node::next`] reports afterwards. A
/// returned error fails the node; the engine decides whether that aborts
/// the workflow (standard mode) or pauses it (debug mode).
#[async_trait]
pub trait Node: Send + std::fmt::Debug {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError>;

    /// The node id chosen by the last `run`, or `None` for a terminator.
    fn next(&self) -> Option<&str>;

    /// Hook for releasing extra resources at reclamation time.
    fn cleanup(&mut self) {}
}

/// Mediates a sub-workflow invocation on behalf of a call node.
///
/// The workflow manager implements this; the engine threads it through so
/// neither the call node nor the callee engine holds the other directly.
/// The call is synchronous: the callee runs to completion before `call`
/// returns.
#[async_trait]
pub trait SubworkflowHost: Send + Sync {
    async fn call(
        &self,
        target: &str,
        caller_node_id: &str,
        input: Option<Value>,
    ) -> Result<Value, NodeError>;
}

/// Execution context passed to a node for one `run`.
pub struct NodeContext<'a> {
    pub node_id: &'a str,
    pub workflow_id: &'a str,
    pub hub: &'a mut MessageHub,
    pub bus: &'a EventBus,
    pub host: Option<&'a dyn SubworkflowHost>,
}

impl NodeContext<'_> {
    /// Resolve a value descriptor. A reference to a slot that no executed
    /// node has published is a [`NodeError::MissingInput`].
    pub fn resolve(&self, source: &ValueSource) -> Result<Value, NodeError> {
        match source {
            ValueSource::Constant(value) => Ok(value.clone()),
            ValueSource::Ref { node_id, slot } => self
                .hub
                .get(node_id, slot)
                .cloned()
                .ok_or_else(|| NodeError::MissingInput {
                    what: format!("{node_id}.{slot}"),
                }),
        }
    }

    /// Resolve a descriptor declared optional: an unresolvable reference
    /// yields `None` instead of failing.
    pub fn resolve_optional(&self, source: Option<&ValueSource>) -> Option<Value> {
        match source? {
            ValueSource::Constant(value) => Some(value.clone()),
            ValueSource::Ref { node_id, slot } => self.hub.get(node_id, slot).cloned(),
        }
    }

    /// Publish a value into this node's own message store.
    pub fn publish(&mut self, slot: &str, value: Value) {
        self.hub.set(self.node_id, slot, value);
    }

    /// Emit a `nodes_output` event with this node's identity.
    pub fn output(&self, message: impl Into<String>) {
        self.bus.emit(&RuntimeEvent::NodesOutput {
            workflow_id: Some(self.workflow_id.to_string()),
            node_id: self.node_id.to_string(),
            message: message.into(),
        });
    }

    pub fn log(&self, level: MessageLevel, text: impl Into<String>) {
        self.bus.emit(&RuntimeEvent::Message {
            level,
            node_id: self.node_id.to_string(),
            text: text.into(),
        });
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(MessageLevel::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.log(MessageLevel::Warning, text);
    }

    /// A context for an inner node sharing this node's hub, bus, and host
    /// (used by the loop node's miniature interpreter).
    pub fn child<'b>(&'b mut self, node_id: &'b str) -> NodeContext<'b> {
        NodeContext {
            node_id,
            workflow_id: self.workflow_id,
            hub: &mut *self.hub,
            bus: self.bus,
            host: self.host,
        }
    }
}

/// Builds node instances from prepared records, dispatching on the type
/// string. Seeds construction-time store defaults into the hub.
pub struct NodeFactory;

impl NodeFactory {
    pub fn create(
        record: &PreparedNode,
        hub: &mut MessageHub,
    ) -> Result<Box<dyn Node>, NodeError> {
        match record.kind.as_str() {
            "start" => Ok(Box::new(StartNode::new(record, hub)?)),
            "end" => Ok(Box::new(EndNode::new(record))),
            "print" => Ok(Box::new(PrintNode::new(record)?)),
            "condition" => Ok(Box::new(ConditionNode::new(record)?)),
            "loop" => Ok(Box::new(LoopNode::new(record)?)),
            "call" => Ok(Box::new(CallNode::new(record)?)),
            "sleep" => Ok(Box::new(SleepNode::new(record)?)),
            "text" => Ok(Box::new(TextNode::new(record)?)),
            "json" => Ok(Box::new(JsonNode::new(record)?)),
            "relocation" => Ok(Box::new(RelocationNode::new(record)?)),
            other => Err(NodeError::Validation(format!(
                "unknown node type: {other}"
            ))),
        }
    }
}

/// Required input descriptor from `data.inputsValues`, with errors mapped
/// into the node error taxonomy.
pub(crate) fn required_input(
    record: &PreparedNode,
    key: &str,
) -> Result<ValueSource, NodeError> {
    match input_source(&record.data, key) {
        Some(Ok(source)) => Ok(source),
        Some(Err(detail)) => Err(NodeError::Validation(format!(
            "node {}: bad descriptor for input `{key}`: {detail}",
            record.id
        ))),
        None => Err(NodeError::Validation(format!(
            "node {}: missing input `{key}`",
            record.id
        ))),
    }
}

/// Optional input descriptor from `data.inputsValues`.
pub(crate) fn optional_input(
    record: &PreparedNode,
    key: &str,
) -> Result<Option<ValueSource>, NodeError> {
    match input_source(&record.data, key) {
        Some(Ok(source)) => Ok(Some(source)),
        Some(Err(detail)) => Err(NodeError::Validation(format!(
            "node {}: bad descriptor for input `{key}`: {detail}",
            record.id
        ))),
        None => Ok(None),
    }
}

/// The single successor every non-branching node selects at the end of a
/// successful run.
pub(crate) fn single_successor(
    transitions: &[(String, String)],
    node_id: &str,
) -> Result<String, NodeError> {
    transitions
        .first()
        .map(|(_, target)| target.clone())
        .ok_or_else(|| NodeError::MissingSuccessor {
            node_id: node_id.to_string(),
        })
}
