//! Sleep node: pauses the workflow for a configured number of seconds.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use super::{Node, NodeContext, optional_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::utils::values::as_number;

const DEFAULT_SLEEP_SECS: f64 = 10.0;

#[derive(Debug)]
pub struct SleepNode {
    id: String,
    sleep_time: ValueSource,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl SleepNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let sleep_time = optional_input(record, "sleepTime")?
            .unwrap_or_else(|| ValueSource::constant(json!(DEFAULT_SLEEP_SECS)));
        Ok(Self {
            id: record.id.clone(),
            sleep_time,
            transitions: record.transitions.clone(),
            next: None,
        })
    }
}

#[async_trait]
impl Node for SleepNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let raw = ctx.resolve(&self.sleep_time)?;
        let seconds = as_number(&raw).filter(|s| *s >= 0.0).ok_or_else(|| {
            NodeError::Validation(format!(
                "node {}: sleepTime must be a non-negative number, got {raw}",
                self.id
            ))
        })?;

        ctx.info(format!("Sleeping for {seconds} seconds..."));
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        ctx.info("Sleep finished.");
        ctx.output(seconds.to_string());

        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(json!(seconds))
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
