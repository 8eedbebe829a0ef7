//! Multi-workflow coordinator.
//!
//! The manager owns the registry of workflow documents, their statuses,
//! the call stack, and the global event bus. Engines are created lazily,
//! one per workflow id at most; sub-workflow engines are created on
//! demand when a call node invokes them and reclaimed on return. The
//! manager is the run's [`SubworkflowHost`]: a call node's invocation
//! recurses synchronously through [`WorkflowManager::execute_workflow`]
//! on the same task, so all callee events land inside the caller node's
//! PROCESSING window.
//!
//! All methods take `&self`; registry state sits behind mutexes so an
//! `Arc<WorkflowManager>` can be driven from a spawned run task while
//! debug commands arrive from the transport.

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::document::{WorkflowBundle, WorkflowEntry, WorkflowKind};
use crate::engine::{DebugControls, Engine};
use crate::error::{ManagerError, NodeError};
use crate::event_bus::{EventBus, EventSink, RuntimeEvent};
use crate::node::SubworkflowHost;

/// Lifecycle of one registered workflow.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Record of a suspended caller while its sub-workflow runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallFrame {
    pub caller_workflow_id: String,
    pub caller_node_id: String,
}

/// Per-workflow entry in the memory snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowMemoryInfo {
    pub workflow_id: String,
    pub kind: WorkflowKind,
    pub status: WorkflowStatus,
    pub node_instances: usize,
}

/// Forwards every event an engine emits locally onto the global bus.
struct ForwardSink {
    target: Arc<EventBus>,
}

impl EventSink for ForwardSink {
    fn handle(&mut self, event: &RuntimeEvent) -> std::io::Result<()> {
        self.target.emit(event);
        Ok(())
    }

    fn name(&self) -> String {
        "ForwardSink".to_string()
    }
}

struct EngineSlot {
    engine: Arc<tokio::sync::Mutex<Engine>>,
    controls: DebugControls,
    gauge: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Registry {
    entries: FxHashMap<String, WorkflowEntry>,
    statuses: FxHashMap<String, WorkflowStatus>,
    engines: FxHashMap<String, EngineSlot>,
    /// Sub-workflow name → workflow id (call-node lookup keys).
    names: FxHashMap<String, String>,
    main_id: Option<String>,
}

pub struct WorkflowManager {
    state: Mutex<Registry>,
    call_stack: Mutex<Vec<CallFrame>>,
    /// Engines currently inside `execute_workflow`, innermost last. Debug
    /// commands target the innermost engine, following the call stack.
    active: Mutex<Vec<(String, DebugControls)>>,
    global_bus: Arc<EventBus>,
    breakpoints: FxHashSet<String>,
}

impl WorkflowManager {
    pub fn new(global_bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(Registry::default()),
            call_stack: Mutex::new(Vec::new()),
            active: Mutex::new(Vec::new()),
            global_bus,
            breakpoints: FxHashSet::default(),
        }
    }

    /// Breakpoints applied to every engine this manager creates.
    pub fn with_breakpoints(mut self, breakpoints: impl IntoIterator<Item = String>) -> Self {
        self.breakpoints = breakpoints.into_iter().collect();
        self
    }

    pub fn global_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.global_bus)
    }

    /// Ingest a bundle: exactly one main workflow, unique sub names, all
    /// statuses PENDING.
    pub fn register(&self, bundle: WorkflowBundle) -> Result<(), ManagerError> {
        let mut state = self.state.lock().unwrap();
        for (workflow_id, entry) in bundle {
            match entry.kind {
                WorkflowKind::Main => {
                    if let Some(existing) = &state.main_id {
                        return Err(ManagerError::DuplicateMain {
                            existing: existing.clone(),
                        });
                    }
                    state.main_id = Some(workflow_id.clone());
                }
                WorkflowKind::Sub => {
                    if state
                        .names
                        .insert(entry.name.clone(), workflow_id.clone())
                        .is_some()
                    {
                        return Err(ManagerError::DuplicateSubName {
                            name: entry.name.clone(),
                        });
                    }
                }
            }
            tracing::info!(workflow = %workflow_id, kind = %entry.kind, "registered workflow");
            state.statuses.insert(workflow_id.clone(), WorkflowStatus::Pending);
            state.entries.insert(workflow_id, entry);
        }
        Ok(())
    }

    /// Execute the main workflow to completion. On successful return the
    /// call stack is empty and every sub-workflow engine is reclaimed.
    pub async fn run(&self) -> Result<String, ManagerError> {
        let main_id = self
            .state
            .lock()
            .unwrap()
            .main_id
            .clone()
            .ok_or(ManagerError::NoMainWorkflow)?;
        tracing::info!(workflow = %main_id, "starting main workflow");

        let result = self.execute_workflow(&main_id).await;

        let leftover = self.call_stack.lock().unwrap().len();
        if leftover > 0 {
            tracing::warn!(frames = leftover, "call stack not empty after run");
        }
        self.force_cleanup_subworkflows().await;
        result
    }

    /// Lazily instantiate the engine for `workflow_id` and return its
    /// debug controls. The transport calls this before a debug run so
    /// controls exist ahead of execution.
    pub fn ensure_main_engine(&self) -> Result<DebugControls, ManagerError> {
        let main_id = self
            .state
            .lock()
            .unwrap()
            .main_id
            .clone()
            .ok_or(ManagerError::NoMainWorkflow)?;
        let (_, controls) = self.ensure_engine_slot(&main_id)?;
        Ok(controls)
    }

    /// Debug controls of the innermost engine currently executing, or the
    /// main engine when nothing runs yet.
    pub fn current_controls(&self) -> Option<DebugControls> {
        if let Some((_, controls)) = self.active.lock().unwrap().last() {
            return Some(controls.clone());
        }
        let state = self.state.lock().unwrap();
        let main_id = state.main_id.clone()?;
        state
            .engines
            .get(&main_id)
            .map(|slot| slot.controls.clone())
    }

    /// Run one registered workflow: create its engine if needed, wire its
    /// local bus to the global bus, track status transitions, and emit
    /// the completion/failure event.
    pub async fn execute_workflow(&self, workflow_id: &str) -> Result<String, ManagerError> {
        self.execute_workflow_with_input(workflow_id, None).await
    }

    async fn execute_workflow_with_input(
        &self,
        workflow_id: &str,
        input: Option<Value>,
    ) -> Result<String, ManagerError> {
        let (engine, controls) = self.ensure_engine_slot(workflow_id)?;
        self.set_status(workflow_id, WorkflowStatus::Running);
        self.active
            .lock()
            .unwrap()
            .push((workflow_id.to_string(), controls));
        tracing::info!(workflow = %workflow_id, "executing workflow");

        let result = {
            let mut guard = engine.lock().await;
            guard.set_bootstrap_input(input);
            guard.run(Some(self)).await
        };

        self.active.lock().unwrap().pop();

        match &result {
            Ok(message) => {
                self.set_status(workflow_id, WorkflowStatus::Completed);
                self.global_bus.emit(&RuntimeEvent::WorkflowCompleted {
                    workflow_id: workflow_id.to_string(),
                    message: message.clone(),
                });
            }
            Err(err) => {
                self.set_status(workflow_id, WorkflowStatus::Failed);
                self.global_bus.emit(&RuntimeEvent::WorkflowFailed {
                    workflow_id: workflow_id.to_string(),
                    message: err.to_string(),
                });
            }
        }

        result.map_err(ManagerError::from)
    }

    /// Reclaim one sub-workflow: run every node cleanup hook, drop the
    /// stores and the engine. The main workflow's engine is never touched.
    pub async fn cleanup_subworkflow(&self, workflow_id: &str) {
        let slot = {
            let mut state = self.state.lock().unwrap();
            let is_sub = state
                .entries
                .get(workflow_id)
                .is_some_and(|entry| entry.kind == WorkflowKind::Sub);
            if !is_sub {
                tracing::warn!(workflow = %workflow_id, "refusing to clean a non-sub workflow");
                return;
            }
            state.engines.remove(workflow_id)
        };
        if let Some(slot) = slot {
            let mut engine = slot.engine.lock().await;
            engine.cleanup_all_nodes();
            tracing::info!(workflow = %workflow_id, "sub-workflow reclaimed");
        }
    }

    /// Force-reclaim every sub-workflow engine. The main engine is never
    /// force-cleaned.
    pub async fn force_cleanup_subworkflows(&self) {
        let sub_ids: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .engines
                .keys()
                .filter(|id| {
                    state
                        .entries
                        .get(*id)
                        .is_some_and(|entry| entry.kind == WorkflowKind::Sub)
                })
                .cloned()
                .collect()
        };
        for workflow_id in sub_ids {
            self.cleanup_subworkflow(&workflow_id).await;
        }
    }

    /// Per-live-workflow snapshot of id, type, status, and instantiated
    /// node count.
    pub fn memory_summary(&self) -> Vec<WorkflowMemoryInfo> {
        let state = self.state.lock().unwrap();
        let mut summary: Vec<WorkflowMemoryInfo> = state
            .engines
            .iter()
            .filter_map(|(workflow_id, slot)| {
                let entry = state.entries.get(workflow_id)?;
                Some(WorkflowMemoryInfo {
                    workflow_id: workflow_id.clone(),
                    kind: entry.kind,
                    status: *state
                        .statuses
                        .get(workflow_id)
                        .unwrap_or(&WorkflowStatus::Pending),
                    node_instances: slot.gauge.load(Ordering::SeqCst),
                })
            })
            .collect();
        summary.sort_by(|a, b| a.workflow_id.cmp(&b.workflow_id));
        summary
    }

    pub fn status(&self, workflow_id: &str) -> Option<WorkflowStatus> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .get(workflow_id)
            .copied()
    }

    /// Ids of workflows with a live engine.
    pub fn live_engine_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .engines
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.lock().unwrap().len()
    }

    fn set_status(&self, workflow_id: &str, status: WorkflowStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(workflow_id.to_string(), status);
    }

    fn ensure_engine_slot(
        &self,
        workflow_id: &str,
    ) -> Result<(Arc<tokio::sync::Mutex<Engine>>, DebugControls), ManagerError> {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.engines.get(workflow_id) {
            return Ok((Arc::clone(&slot.engine), slot.controls.clone()));
        }

        let entry = state
            .entries
            .get(workflow_id)
            .ok_or_else(|| ManagerError::UnknownWorkflow {
                target: workflow_id.to_string(),
            })?;
        let document = entry.document();
        let is_main = state.main_id.as_deref() == Some(workflow_id);

        let local_bus = Arc::new(EventBus::with_sink(ForwardSink {
            target: Arc::clone(&self.global_bus),
        }));
        let mut engine = Engine::new(workflow_id, &document, local_bus)?
            .with_breakpoints(self.breakpoints.iter().cloned());
        if !is_main {
            engine = engine.suppress_final_event();
        }
        let controls = engine.controls();
        let gauge = engine.instance_gauge();
        let engine = Arc::new(tokio::sync::Mutex::new(engine));
        state.engines.insert(
            workflow_id.to_string(),
            EngineSlot {
                engine: Arc::clone(&engine),
                controls: controls.clone(),
                gauge,
            },
        );
        Ok((engine, controls))
    }

    /// Resolve a call target (sub-workflow name, or id as a fallback) and
    /// check it can be invoked right now.
    fn resolve_call_target(&self, target: &str) -> Result<String, ManagerError> {
        let state = self.state.lock().unwrap();
        let workflow_id = state
            .names
            .get(target)
            .cloned()
            .or_else(|| {
                state
                    .entries
                    .contains_key(target)
                    .then(|| target.to_string())
            })
            .ok_or_else(|| ManagerError::UnknownWorkflow {
                target: target.to_string(),
            })?;

        let entry = state
            .entries
            .get(&workflow_id)
            .ok_or_else(|| ManagerError::UnknownWorkflow {
                target: target.to_string(),
            })?;
        if entry.kind != WorkflowKind::Sub {
            return Err(ManagerError::NotASubWorkflow {
                target: target.to_string(),
            });
        }
        // Re-entering an active workflow would recurse into its engine.
        if matches!(
            state.statuses.get(&workflow_id),
            Some(WorkflowStatus::Running) | Some(WorkflowStatus::Paused)
        ) {
            return Err(ManagerError::WorkflowBusy {
                target: target.to_string(),
            });
        }
        Ok(workflow_id)
    }
}

#[async_trait]
impl SubworkflowHost for WorkflowManager {
    /// Handle a call node's invocation: push a call frame, suspend the
    /// caller, run the callee inline, deliver its result, and reclaim the
    /// callee's engine whatever the outcome.
    async fn call(
        &self,
        target: &str,
        caller_node_id: &str,
        input: Option<Value>,
    ) -> Result<Value, NodeError> {
        let call_error = |reason: String| NodeError::Call {
            node_id: caller_node_id.to_string(),
            reason,
        };

        let target_id = self
            .resolve_call_target(target)
            .map_err(|err| call_error(err.to_string()))?;

        let caller_workflow_id = self
            .active
            .lock()
            .unwrap()
            .last()
            .map(|(id, _)| id.clone())
            .unwrap_or_default();
        self.call_stack.lock().unwrap().push(CallFrame {
            caller_workflow_id: caller_workflow_id.clone(),
            caller_node_id: caller_node_id.to_string(),
        });
        if !caller_workflow_id.is_empty() {
            self.set_status(&caller_workflow_id, WorkflowStatus::Paused);
        }
        tracing::info!(
            target = %target_id,
            caller = %caller_node_id,
            "invoking sub-workflow"
        );

        let outcome = self.execute_workflow_with_input(&target_id, input).await;

        if let Some(frame) = self.call_stack.lock().unwrap().pop()
            && !frame.caller_workflow_id.is_empty()
        {
            self.set_status(&frame.caller_workflow_id, WorkflowStatus::Running);
        }
        self.cleanup_subworkflow(&target_id).await;

        match outcome {
            Ok(message) => Ok(Value::String(message)),
            Err(err) => Err(call_error(err.to_string())),
        }
    }
}
