use std::any::type_name;
use std::fs::File;
use std::io::{self, Result as IoResult, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::event::RuntimeEvent;

/// Abstraction over an output target that consumes runtime events.
///
/// Sinks run inline on the emitting thread; the bus logs a failing sink
/// and carries on with the remaining ones.
pub trait EventSink: Send {
    fn handle(&mut self, event: &RuntimeEvent) -> IoResult<()>;

    /// A stable, human-friendly identifier for this sink instance.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

/// Stdout sink: one human-readable line per event.
#[derive(Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &RuntimeEvent) -> IoResult<()> {
        let mut handle = io::stdout();
        writeln!(handle, "{event}")?;
        handle.flush()
    }

    fn name(&self) -> String {
        "StdOutSink".to_string()
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<RuntimeEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of every captured event so callers can inspect state without
    /// holding the lock.
    pub fn snapshot(&self) -> Vec<RuntimeEvent> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &RuntimeEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn name(&self) -> String {
        "MemorySink".to_string()
    }
}

/// Channel sink: forwards events to a flume channel for live observers
/// (push transports, dashboards, tests that await specific events).
pub struct ChannelSink {
    tx: flume::Sender<RuntimeEvent>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &RuntimeEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }

    fn name(&self) -> String {
        "ChannelSink".to_string()
    }
}

/// JSON Lines sink: one normalized JSON object per line, for per-run
/// artifacts and log aggregation.
pub struct JsonLinesSink {
    handle: Box<dyn Write + Send>,
}

impl JsonLinesSink {
    pub fn new(handle: Box<dyn Write + Send>) -> Self {
        Self { handle }
    }

    pub fn to_stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn to_file(path: impl AsRef<Path>) -> IoResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl EventSink for JsonLinesSink {
    fn handle(&mut self, event: &RuntimeEvent) -> IoResult<()> {
        let json = event
            .to_json_string()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.handle, "{json}")?;
        self.handle.flush()
    }

    fn name(&self) -> String {
        "JsonLinesSink".to_string()
    }
}
