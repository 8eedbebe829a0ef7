//! Single-workflow interpreter.
//!
//! The engine owns one prepared graph, the lazily-built node instances,
//! their message stores, and a local event bus. It drives nodes in the
//! order each node's own successor selection dictates, emitting lifecycle
//! events strictly in execution order, and optionally honors breakpoints
//! through a debuggable loop with a blocking gate.
//!
//! Execution is single-threaded and cooperative: one task interprets the
//! graph, yielding at the top of every node iteration so observer
//! channels drain. Debug controls arrive from other tasks and coordinate
//! with the interpreter only through atomic flags and the gate.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task;

use crate::document::WorkflowDocument;
use crate::error::{EngineError, GraphError, NodeError};
use crate::event_bus::{EventBus, RuntimeEvent};
use crate::graph::{END_KIND, PreparedGraph};
use crate::node::{Node, NodeContext, NodeFactory, SubworkflowHost};
use crate::store::MessageHub;

const SUCCESS_MESSAGE: &str = "Workflow executed successfully";
const NO_OUTPUT: &str = "no output";

/// Debug state shared between the interpreter task and control handles.
///
/// The gate is a watch channel carrying "open?"; the interpreter blocks on
/// it at the top of every iteration while it reads `false`.
struct DebugShared {
    running: AtomicBool,
    paused: AtomicBool,
    step_mode: AtomicBool,
    terminated: AtomicBool,
    current_node: Mutex<Option<String>>,
    gate: watch::Sender<bool>,
}

impl DebugShared {
    fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            step_mode: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            current_node: Mutex::new(None),
            gate,
        }
    }

    fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    async fn wait_open(&self) {
        let mut rx = self.gate.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    fn current(&self) -> Option<String> {
        self.current_node.lock().unwrap().clone()
    }

    fn set_current(&self, node_id: &str) {
        *self.current_node.lock().unwrap() = Some(node_id.to_string());
    }
}

/// Clonable handle for driving a debuggable run from another task.
///
/// All controls are valid only while the engine is inside `debug_run`;
/// invalid invocations are ignored with a warning and return `false`.
#[derive(Clone)]
pub struct DebugControls {
    shared: Arc<DebugShared>,
    bus: Arc<EventBus>,
}

impl DebugControls {
    /// Request a pause. Effective before the *next* node: the engine
    /// finishes the node it is on and blocks at the gate.
    pub fn pause(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) || self.shared.paused.load(Ordering::SeqCst)
        {
            tracing::warn!("pause ignored: engine not running or already paused");
            return false;
        }
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared.close_gate();
        self.bus.emit(&RuntimeEvent::ExecutionPaused {
            node_id: self.shared.current().unwrap_or_default(),
            reason: "Paused by user".to_string(),
        });
        true
    }

    /// Reopen the gate and clear pause/step state.
    pub fn resume(&self) -> bool {
        if !self.shared.paused.load(Ordering::SeqCst) {
            tracing::warn!("resume ignored: engine not paused");
            return false;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.step_mode.store(false, Ordering::SeqCst);
        self.bus.emit(&RuntimeEvent::ExecutionResumed {
            node_id: self.shared.current().unwrap_or_default(),
            reason: "Resumed by user".to_string(),
        });
        self.shared.open_gate();
        true
    }

    /// Execute exactly one node, then pause again before the next.
    pub fn step_over(&self) -> bool {
        if !self.shared.paused.load(Ordering::SeqCst) {
            tracing::warn!("step_over ignored: engine not paused");
            return false;
        }
        self.shared.step_mode.store(true, Ordering::SeqCst);
        self.bus.emit(&RuntimeEvent::ExecutionStepOver {
            node_id: self.shared.current().unwrap_or_default(),
        });
        self.shared.open_gate();
        true
    }

    /// Cooperative termination: takes effect at the next gate check. A
    /// node already past the check completes first.
    pub fn terminate(&self) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) {
            tracing::warn!("terminate ignored: engine not running");
            return false;
        }
        self.shared.terminated.store(true, Ordering::SeqCst);
        self.shared.open_gate();
        true
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

/// Interpreter for one workflow graph.
pub struct Engine {
    workflow_id: String,
    graph: PreparedGraph,
    hub: MessageHub,
    instances: FxHashMap<String, Box<dyn Node>>,
    back_stack: Vec<String>,
    bus: Arc<EventBus>,
    debug: Arc<DebugShared>,
    breakpoints: FxHashSet<String>,
    emit_final: bool,
    bootstrap_input: Option<Value>,
    instance_gauge: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(
        workflow_id: impl Into<String>,
        document: &WorkflowDocument,
        bus: Arc<EventBus>,
    ) -> Result<Self, GraphError> {
        let graph = PreparedGraph::from_document(document)?;
        let debug = Arc::new(DebugShared::new());
        if let Some(start) = graph.start_node() {
            debug.set_current(&start.id);
        }
        Ok(Self {
            workflow_id: workflow_id.into(),
            graph,
            hub: MessageHub::new(),
            instances: FxHashMap::default(),
            back_stack: Vec::new(),
            bus,
            debug,
            breakpoints: FxHashSet::default(),
            emit_final: true,
            bootstrap_input: None,
            instance_gauge: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Node ids at which a debuggable run pauses before execution.
    pub fn with_breakpoints(mut self, breakpoints: impl IntoIterator<Item = String>) -> Self {
        self.breakpoints = breakpoints.into_iter().collect();
        self
    }

    /// Input delivered by a caller workflow, published under the start
    /// node's `input` slot before its declared defaults are seeded.
    pub fn with_bootstrap_input(mut self, input: Option<Value>) -> Self {
        self.bootstrap_input = input;
        self
    }

    /// Setter variant of [`Engine::with_bootstrap_input`] for engines
    /// already installed in a registry.
    pub fn set_bootstrap_input(&mut self, input: Option<Value>) {
        self.bootstrap_input = input;
    }

    /// Sub-workflow engines do not emit the run-final `over` event; the
    /// root engine of a run does.
    pub fn suppress_final_event(mut self) -> Self {
        self.emit_final = false;
        self
    }

    pub fn controls(&self) -> DebugControls {
        DebugControls {
            shared: Arc::clone(&self.debug),
            bus: Arc::clone(&self.bus),
        }
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn graph(&self) -> &PreparedGraph {
        &self.graph
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Live instance counter shared with the workflow manager's memory
    /// snapshot; tracks `instance_count` without locking the engine.
    pub fn instance_gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.instance_gauge)
    }

    /// Execute the workflow to completion. Dispatches to the standard
    /// loop when no breakpoints are set, else to the debuggable loop.
    pub async fn run(
        &mut self,
        host: Option<&dyn SubworkflowHost>,
    ) -> Result<String, EngineError> {
        if self.breakpoints.is_empty() {
            let result = self.standard_loop(host).await;
            self.finalize(result)
        } else {
            self.debug_run(host).await
        }
    }

    /// Debuggable execution: honors breakpoints and the external
    /// pause/resume/step/terminate controls.
    pub async fn debug_run(
        &mut self,
        host: Option<&dyn SubworkflowHost>,
    ) -> Result<String, EngineError> {
        let result = self.debug_loop(host).await;
        self.finalize(result)
    }

    /// Emit the run-final `over` event. Precondition violations return
    /// without any side effect, and termination ends the event stream
    /// with `execution_terminated` instead.
    fn finalize(&self, result: Result<String, EngineError>) -> Result<String, EngineError> {
        if self.emit_final {
            match &result {
                Ok(message) => self.bus.emit(&RuntimeEvent::Over {
                    status: crate::event_bus::OverStatus::Success,
                    message: message.clone(),
                }),
                Err(
                    EngineError::Terminated
                    | EngineError::MissingStart
                    | EngineError::MissingEnd
                    | EngineError::AmbiguousStart,
                ) => {}
                Err(err) => self.bus.emit(&RuntimeEvent::Over {
                    status: crate::event_bus::OverStatus::Error,
                    message: err.to_string(),
                }),
            }
        }
        result
    }

    /// Structural preconditions, checked before any side effect.
    fn preflight(&self) -> Result<String, EngineError> {
        match self.graph.start_count() {
            0 => return Err(EngineError::MissingStart),
            1 => {}
            _ => return Err(EngineError::AmbiguousStart),
        }
        if !self.graph.has_end() {
            return Err(EngineError::MissingEnd);
        }
        let start = self
            .graph
            .start_node()
            .ok_or(EngineError::MissingStart)?;
        Ok(start.id.clone())
    }

    fn seed_bootstrap(&mut self, start_id: &str) {
        if let Some(input) = self.bootstrap_input.take() {
            self.hub.set(start_id, "input", input);
        }
    }

    async fn standard_loop(
        &mut self,
        host: Option<&dyn SubworkflowHost>,
    ) -> Result<String, EngineError> {
        let start = self.preflight()?;
        self.seed_bootstrap(&start);

        let mut current = start;
        loop {
            task::yield_now().await;
            self.bus
                .emit(&RuntimeEvent::processing(&self.workflow_id, &current));

            let (_payload, next) = self.execute_node(&current, host).await?;

            match next.or_else(|| self.back_stack.pop()) {
                Some(next_id) => current = next_id,
                None => break,
            }
        }

        // `current` still names the last executed node.
        if self.kind_of(&current) != END_KIND {
            return Err(EngineError::NoEndReached);
        }
        Ok(SUCCESS_MESSAGE.to_string())
    }

    async fn debug_loop(
        &mut self,
        host: Option<&dyn SubworkflowHost>,
    ) -> Result<String, EngineError> {
        let start = self.preflight()?;
        self.seed_bootstrap(&start);

        self.debug.running.store(true, Ordering::SeqCst);
        let mut current = Some(start);
        let mut last_executed: Option<String> = None;
        let mut failure: Option<EngineError> = None;

        while let Some(node_id) = current {
            self.debug.set_current(&node_id);
            task::yield_now().await;

            if self.debug.terminated.load(Ordering::SeqCst) {
                return self.finish_terminated(&node_id);
            }

            // Decide whether to pause before executing this node. A
            // breakpoint consumes any pending step so the two cannot
            // stack into a spurious second pause.
            let pause_reason = if self.breakpoints.contains(&node_id) {
                self.debug.step_mode.store(false, Ordering::SeqCst);
                Some("Breakpoint hit")
            } else if self.debug.step_mode.swap(false, Ordering::SeqCst) {
                Some("Step mode")
            } else {
                None
            };
            if let Some(reason) = pause_reason {
                self.debug.paused.store(true, Ordering::SeqCst);
                self.debug.close_gate();
                self.bus.emit(&RuntimeEvent::ExecutionPaused {
                    node_id: node_id.clone(),
                    reason: reason.to_string(),
                });
                tracing::info!(node = %node_id, reason, "execution paused");
            }

            // Blocks while paused, whether by this engine or by a user
            // pause() that closed the gate externally.
            self.debug.wait_open().await;
            self.debug.paused.store(false, Ordering::SeqCst);

            if self.debug.terminated.load(Ordering::SeqCst) {
                return self.finish_terminated(&node_id);
            }

            self.bus
                .emit(&RuntimeEvent::processing(&self.workflow_id, &node_id));

            let next = match self.execute_node(&node_id, host).await {
                Ok((_payload, next)) => next,
                Err(err) => {
                    // FAILED is already emitted; under debug a failure
                    // pauses instead of aborting so the user can decide.
                    tracing::error!(node = %node_id, %err, "node failed under debug");
                    failure.get_or_insert(err);
                    self.debug.paused.store(true, Ordering::SeqCst);
                    self.debug.close_gate();
                    self.bus.emit(&RuntimeEvent::ExecutionPaused {
                        node_id: node_id.clone(),
                        reason: "Error occurred".to_string(),
                    });
                    self.debug.wait_open().await;
                    self.debug.paused.store(false, Ordering::SeqCst);
                    if self.debug.terminated.load(Ordering::SeqCst) {
                        return self.finish_terminated(&node_id);
                    }
                    None
                }
            };

            current = next.or_else(|| self.back_stack.pop());
            last_executed = Some(node_id);
        }

        self.debug.running.store(false, Ordering::SeqCst);
        if let Some(err) = failure {
            return Err(err);
        }
        let ended_well = last_executed.is_some_and(|node_id| self.kind_of(&node_id) == END_KIND);
        if !ended_well {
            return Err(EngineError::NoEndReached);
        }
        Ok(SUCCESS_MESSAGE.to_string())
    }

    fn finish_terminated(&self, node_id: &str) -> Result<String, EngineError> {
        self.debug.running.store(false, Ordering::SeqCst);
        self.bus.emit(&RuntimeEvent::ExecutionTerminated {
            node_id: Some(node_id.to_string()),
            reason: "Terminated by user".to_string(),
        });
        tracing::info!(node = %node_id, "execution terminated by user");
        Err(EngineError::Terminated)
    }

    fn kind_of(&self, node_id: &str) -> String {
        self.graph
            .get(node_id)
            .map(|node| node.kind.clone())
            .unwrap_or_default()
    }

    /// Construct the node if needed, run it, and emit its terminal status
    /// event. Returns the payload and chosen successor on success.
    async fn execute_node(
        &mut self,
        node_id: &str,
        host: Option<&dyn SubworkflowHost>,
    ) -> Result<(Value, Option<String>), EngineError> {
        let mut instance = match self.instances.remove(node_id) {
            Some(instance) => instance,
            None => match self.construct_node(node_id) {
                Ok(instance) => instance,
                Err(err) => {
                    self.bus.emit(&RuntimeEvent::failed(
                        &self.workflow_id,
                        node_id,
                        err.kind(),
                        err.to_string(),
                    ));
                    return Err(EngineError::NodeConstruction {
                        node_id: node_id.to_string(),
                        source: err,
                    });
                }
            },
        };

        let run_result = {
            let mut ctx = NodeContext {
                node_id,
                workflow_id: &self.workflow_id,
                hub: &mut self.hub,
                bus: &self.bus,
                host,
            };
            instance.run(&mut ctx).await
        };
        let next = instance.next().map(str::to_string);
        self.instances.insert(node_id.to_string(), instance);
        self.instance_gauge
            .store(self.instances.len(), Ordering::SeqCst);

        match run_result {
            Ok(payload) => {
                let payload = if payload.is_null() {
                    json!(NO_OUTPUT)
                } else {
                    payload
                };
                self.bus.emit(&RuntimeEvent::succeeded(
                    &self.workflow_id,
                    node_id,
                    payload.clone(),
                ));
                Ok((payload, next))
            }
            Err(err) => {
                self.bus.emit(&RuntimeEvent::failed(
                    &self.workflow_id,
                    node_id,
                    err.kind(),
                    err.to_string(),
                ));
                Err(EngineError::NodeFailed {
                    node_id: node_id.to_string(),
                    source: err,
                })
            }
        }
    }

    fn construct_node(&mut self, node_id: &str) -> Result<Box<dyn Node>, NodeError> {
        let record = self
            .graph
            .get(node_id)
            .ok_or_else(|| NodeError::Validation(format!("unknown node id: {node_id}")))?
            .clone();
        NodeFactory::create(&record, &mut self.hub)
    }

    /// Reclaim everything this engine holds: node instances (running each
    /// cleanup hook), message stores, the back-stack, and the local bus's
    /// subscriber list.
    pub fn cleanup_all_nodes(&mut self) {
        for (_, mut instance) in self.instances.drain() {
            instance.cleanup();
        }
        self.instance_gauge.store(0, Ordering::SeqCst);
        self.hub.clear();
        self.back_stack.clear();
        self.bus.clear_sinks();
    }
}
