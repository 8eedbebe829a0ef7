//! Error taxonomy for graph preparation, node execution, engine runs, and
//! the multi-workflow manager.
//!
//! Node-level failures ([`NodeError`]) surface to observers as
//! `node_status_change { status: FAILED, payload: { kind, detail } }`
//! events; [`NodeError::kind`] supplies the stable `kind` string.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while preparing a workflow document into an executable
/// graph. Preparation happens once at engine construction; none of these
/// occur mid-run.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("duplicate node id: {node_id}")]
    #[diagnostic(code(loomflow::graph::duplicate_node))]
    DuplicateNode { node_id: String },

    #[error("edge references unknown source node: {node_id}")]
    #[diagnostic(code(loomflow::graph::unknown_source))]
    UnknownEdgeSource { node_id: String },

    #[error("edge references unknown target node: {node_id}")]
    #[diagnostic(code(loomflow::graph::unknown_target))]
    UnknownEdgeTarget { node_id: String },

    #[error("condition node {node_id} has an outgoing edge without a branch port")]
    #[diagnostic(
        code(loomflow::graph::missing_branch_port),
        help("Every edge leaving a condition node must declare a sourcePortID.")
    )]
    MissingBranchPort { node_id: String },
}

/// Errors raised by a node, either while it is constructed from its
/// prepared record or while it runs.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// A value reference could not be resolved: the producer has not run
    /// yet, or never published the slot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(loomflow::node::missing_input),
        help("Check that the producer node executed before this one and published the slot.")
    )]
    MissingInput { what: String },

    /// The node needs an outgoing transition and has none.
    #[error("node {node_id} has no outgoing transition")]
    #[diagnostic(code(loomflow::node::missing_successor))]
    MissingSuccessor { node_id: String },

    /// A condition expression is malformed or its operands have the wrong
    /// types for the operator.
    #[error("condition error: {detail}")]
    #[diagnostic(code(loomflow::node::condition))]
    Condition { detail: String },

    /// A failure inside a loop iteration, wrapping the inner error.
    #[error("loop node {node_id} iteration failed: {source}")]
    #[diagnostic(code(loomflow::node::loop_body))]
    Loop {
        node_id: String,
        #[source]
        source: Box<NodeError>,
    },

    /// A sub-workflow call failed: unknown target, wrong workflow type, or
    /// a failure inside the callee.
    #[error("call node {node_id}: {reason}")]
    #[diagnostic(code(loomflow::node::call))]
    Call { node_id: String, reason: String },

    /// Node configuration is invalid (bad `data` shape, unknown mode, ...).
    #[error("validation failed: {0}")]
    #[diagnostic(code(loomflow::node::validation))]
    Validation(String),

    #[error(transparent)]
    #[diagnostic(code(loomflow::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// A processor body failure (I/O, pattern compilation, external API).
    #[error("execution failed: {detail}")]
    #[diagnostic(code(loomflow::node::execution))]
    Execution { detail: String },
}

impl NodeError {
    /// Stable kind label carried in FAILED event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::MissingInput { .. } => "MissingInput",
            NodeError::MissingSuccessor { .. } => "MissingSuccessor",
            NodeError::Condition { .. } => "ConditionError",
            NodeError::Loop { .. } => "LoopError",
            NodeError::Call { .. } => "CallNodeError",
            NodeError::Validation(_) => "ValidationError",
            NodeError::Serde(_) => "SerdeError",
            NodeError::Execution { .. } => "NodeExecution",
        }
    }
}

/// Errors produced by a single engine run.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("missing start")]
    #[diagnostic(
        code(loomflow::engine::missing_start),
        help("A workflow must contain exactly one node of type `start`.")
    )]
    MissingStart,

    #[error("missing end")]
    #[diagnostic(code(loomflow::engine::missing_end))]
    MissingEnd,

    #[error("multiple start nodes")]
    #[diagnostic(code(loomflow::engine::ambiguous_start))]
    AmbiguousStart,

    #[error("workflow did not end with End node")]
    #[diagnostic(code(loomflow::engine::no_end_reached))]
    NoEndReached,

    #[error("failed to construct node {node_id}: {source}")]
    #[diagnostic(code(loomflow::engine::node_construction))]
    NodeConstruction {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("node {node_id} failed: {source}")]
    #[diagnostic(code(loomflow::engine::node_failed))]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("terminated by user")]
    #[diagnostic(code(loomflow::engine::terminated))]
    Terminated,

    #[error(transparent)]
    #[diagnostic(code(loomflow::engine::graph))]
    Graph(#[from] GraphError),
}

/// Errors produced by the workflow manager.
#[derive(Debug, Error, Diagnostic)]
pub enum ManagerError {
    #[error("no main workflow registered")]
    #[diagnostic(code(loomflow::manager::no_main))]
    NoMainWorkflow,

    #[error("main workflow already registered: {existing}")]
    #[diagnostic(
        code(loomflow::manager::duplicate_main),
        help("A bundle must contain exactly one workflow of type `main`.")
    )]
    DuplicateMain { existing: String },

    #[error("duplicate sub-workflow name: {name}")]
    #[diagnostic(code(loomflow::manager::duplicate_sub_name))]
    DuplicateSubName { name: String },

    #[error("unknown workflow: {target}")]
    #[diagnostic(code(loomflow::manager::unknown_workflow))]
    UnknownWorkflow { target: String },

    #[error("workflow {target} is not a sub-workflow")]
    #[diagnostic(code(loomflow::manager::not_a_sub))]
    NotASubWorkflow { target: String },

    #[error("workflow {target} is already active")]
    #[diagnostic(code(loomflow::manager::busy))]
    WorkflowBusy { target: String },

    #[error(transparent)]
    #[diagnostic(code(loomflow::manager::engine))]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(code(loomflow::manager::graph))]
    Graph(#[from] GraphError),
}
