//! Run dispatcher: the in-process command/observer surface a push
//! transport plugs into.
//!
//! `start_process` and `start_debug` allocate a fresh run id, build an
//! isolated manager + global bus for the run, and execute it on its own
//! task; every event the run emits reaches the observer as an
//! [`OutboundFrame`] tagged with the run id. `debug_command` routes
//! pause/resume/step/terminate to the run's innermost engine. The HTTP /
//! websocket layer itself lives outside this crate.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::document::WorkflowBundle;
use crate::error::ManagerError;
use crate::event_bus::{EventBus, EventSink, JsonLinesSink, RuntimeEvent};
use crate::manager::WorkflowManager;

/// Debug commands accepted from the control plane.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebugCommand {
    Pause,
    Resume,
    StepOver,
    Terminate,
}

/// One frame on the observer channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Acknowledges a freshly allocated debug run id.
    DebugSessionStarted,
    Runtime(RuntimeEvent),
}

impl SessionEvent {
    pub fn to_json_value(&self) -> Value {
        match self {
            SessionEvent::DebugSessionStarted => json!({ "event": "debug_session_started" }),
            SessionEvent::Runtime(event) => event.to_json_value(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutboundFrame {
    pub run_id: String,
    pub event: SessionEvent,
}

impl OutboundFrame {
    pub fn to_json_value(&self) -> Value {
        let mut object = match self.event.to_json_value() {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("payload".into(), other);
                map
            }
        };
        object.insert("run_id".into(), json!(self.run_id));
        Value::Object(object)
    }
}

/// Bridges a run's global bus onto the dispatcher's outbound channel.
struct FrameSink {
    run_id: String,
    tx: flume::Sender<OutboundFrame>,
}

impl EventSink for FrameSink {
    fn handle(&mut self, event: &RuntimeEvent) -> std::io::Result<()> {
        self.tx
            .send(OutboundFrame {
                run_id: self.run_id.clone(),
                event: SessionEvent::Runtime(event.clone()),
            })
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "observer channel dropped")
            })
    }

    fn name(&self) -> String {
        "FrameSink".to_string()
    }
}

struct SessionHandle {
    manager: Arc<WorkflowManager>,
}

pub struct SessionDispatcher {
    sessions: Arc<Mutex<FxHashMap<String, SessionHandle>>>,
    outbound_tx: flume::Sender<OutboundFrame>,
    artifact_dir: Option<PathBuf>,
}

impl SessionDispatcher {
    /// Build a dispatcher and the observer end of its frame channel.
    ///
    /// When `LOOMFLOW_ARTIFACT_DIR` is set (environment or `.env`), each
    /// run additionally writes its events as JSON lines under that
    /// directory.
    pub fn new() -> (Self, flume::Receiver<OutboundFrame>) {
        dotenvy::dotenv().ok();
        let artifact_dir = std::env::var("LOOMFLOW_ARTIFACT_DIR")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);
        let (tx, rx) = flume::unbounded();
        (
            Self {
                sessions: Arc::new(Mutex::new(FxHashMap::default())),
                outbound_tx: tx,
                artifact_dir,
            },
            rx,
        )
    }

    /// Begin a non-debug run of the bundle. Returns the fresh run id.
    pub fn start_process(&self, bundle: WorkflowBundle) -> Result<String, ManagerError> {
        let run_id = Uuid::new_v4().to_string();
        let bus = self.build_bus(&run_id);
        let manager = Arc::new(WorkflowManager::new(bus));
        manager.register(bundle)?;
        self.spawn_run(run_id.clone(), manager);
        Ok(run_id)
    }

    /// Begin a debuggable run. The main engine is created before
    /// execution so controls exist, and the allocated run id is
    /// acknowledged to the observer with a `debug_session_started` frame.
    pub fn start_debug(
        &self,
        bundle: WorkflowBundle,
        breakpoints: Vec<String>,
    ) -> Result<String, ManagerError> {
        let run_id = Uuid::new_v4().to_string();
        let bus = self.build_bus(&run_id);
        let manager = Arc::new(WorkflowManager::new(bus).with_breakpoints(breakpoints));
        manager.register(bundle)?;
        manager.ensure_main_engine()?;
        let _ = self.outbound_tx.send(OutboundFrame {
            run_id: run_id.clone(),
            event: SessionEvent::DebugSessionStarted,
        });
        self.spawn_run(run_id.clone(), manager);
        Ok(run_id)
    }

    /// Route a debug command to the run's innermost engine. An unknown
    /// run id is ignored with a warning.
    pub fn debug_command(&self, run_id: &str, command: DebugCommand) {
        let manager = self
            .sessions
            .lock()
            .unwrap()
            .get(run_id)
            .map(|handle| Arc::clone(&handle.manager));
        let Some(manager) = manager else {
            tracing::warn!(run = %run_id, ?command, "debug command for unknown run id");
            return;
        };
        let Some(controls) = manager.current_controls() else {
            tracing::warn!(run = %run_id, ?command, "run has no debuggable engine");
            return;
        };
        match command {
            DebugCommand::Pause => controls.pause(),
            DebugCommand::Resume => controls.resume(),
            DebugCommand::StepOver => controls.step_over(),
            DebugCommand::Terminate => controls.terminate(),
        };
    }

    pub fn active_run_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn build_bus(&self, run_id: &str) -> Arc<EventBus> {
        let bus = EventBus::with_sink(FrameSink {
            run_id: run_id.to_string(),
            tx: self.outbound_tx.clone(),
        });
        if let Some(dir) = &self.artifact_dir {
            match JsonLinesSink::to_file(dir.join(format!("{run_id}.jsonl"))) {
                Ok(sink) => bus.add_sink(sink),
                Err(err) => tracing::warn!(run = %run_id, %err, "failed to open run artifact"),
            }
        }
        Arc::new(bus)
    }

    fn spawn_run(&self, run_id: String, manager: Arc<WorkflowManager>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(run_id.clone(), SessionHandle {
                manager: Arc::clone(&manager),
            });
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            match manager.run().await {
                Ok(message) => tracing::info!(run = %run_id, %message, "run completed"),
                Err(err) => tracing::error!(run = %run_id, %err, "run failed"),
            }
            sessions.lock().unwrap().remove(&run_id);
        });
    }
}
