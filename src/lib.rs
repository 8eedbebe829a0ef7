//! # Loomflow: Graph-driven Workflow Execution Engine
//!
//! Loomflow executes user-authored directed workflow graphs in which each
//! node is a typed operation: input producers, text/JSON processors,
//! control flow (condition, loop, sub-workflow call), and diagnostics.
//! The engine runs a submitted graph to completion, streaming per-node
//! status, output, and log events to observers, and optionally honors
//! breakpoints so a user can pause, step, resume, or terminate a run
//! interactively.
//!
//! ## Core Concepts
//!
//! - **Documents**: JSON node + edge lists, grouped into bundles of one
//!   main workflow and named callable sub-workflows
//! - **Prepared graph**: the immutable id-indexed node map with computed
//!   outgoing transitions the engine interprets
//! - **Value references**: node inputs resolved at read time from the
//!   slots previously-executed peers published
//! - **Event bus**: synchronous fan-out of lifecycle events to observer
//!   sinks, with ordering guarantees suitable for streaming UIs
//! - **Debugger**: a gate-based pause/step/resume/terminate protocol over
//!   per-node breakpoints
//! - **Workflow manager**: multi-workflow call/return with sub-workflow
//!   isolation and memory reclamation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use loomflow::document::{Edge, NodeRecord, WorkflowDocument};
//! use loomflow::engine::Engine;
//! use loomflow::event_bus::{EventBus, MemorySink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let document = WorkflowDocument {
//!     nodes: vec![
//!         NodeRecord::new("start_1", "start", json!({})),
//!         NodeRecord::new("print_1", "print", json!({
//!             "inputsValues": { "input": { "kind": "constant", "content": "hello" } }
//!         })),
//!         NodeRecord::new("end_1", "end", json!({})),
//!     ],
//!     edges: vec![Edge::new("start_1", "print_1"), Edge::new("print_1", "end_1")],
//! };
//!
//! let sink = MemorySink::new();
//! let bus = Arc::new(EventBus::with_sink(sink.clone()));
//! let mut engine = Engine::new("main", &document, bus)?;
//! let message = engine.run(None).await?;
//! assert_eq!(message, "Workflow executed successfully");
//! # Ok(())
//! # }
//! ```
//!
//! Multi-workflow runs go through [`manager::WorkflowManager`], and an
//! interactive transport drives runs through [`sessions::SessionDispatcher`].
//!
//! ## Module Guide
//!
//! - [`document`] - Workflow documents, bundles, and value descriptors
//! - [`graph`] - Graph preparation and the prepared node map
//! - [`store`] - Per-node message stores
//! - [`node`] - The node trait, context, factory, and node kinds
//! - [`engine`] - The interpreter and debugger
//! - [`manager`] - Multi-workflow coordination
//! - [`event_bus`] - Event vocabulary, bus, and sinks
//! - [`sessions`] - Run dispatch and debug command routing
//! - [`error`] - The error taxonomy

pub mod document;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod graph;
pub mod manager;
pub mod node;
pub mod sessions;
pub mod store;
pub mod telemetry;
pub mod utils;
