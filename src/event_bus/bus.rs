use std::sync::Mutex;

use super::event::RuntimeEvent;
use super::sink::{EventSink, StdOutSink};

/// Synchronous multi-sink event hub for workflow execution events.
///
/// Each engine owns one bus; the workflow manager owns a global bus that
/// engine buses forward into. `emit` runs every registered sink in
/// registration order on the calling thread and returns only after all
/// of them have handled the event, so observers see events exactly in
/// emission order. A sink error is logged and does not abort the
/// remaining sinks.
///
/// Sink lists are mutated only during setup and engine teardown.
pub struct EventBus {
    sinks: Mutex<Vec<Box<dyn EventSink>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink)
    }
}

impl EventBus {
    /// A bus with no sinks attached yet.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Mutex::new(sinks),
        }
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        self.sinks.lock().unwrap().push(sink);
    }

    /// Deliver one event to every sink, in registration order.
    pub fn emit(&self, event: &RuntimeEvent) {
        let mut sinks = self.sinks.lock().unwrap();
        for sink in sinks.iter_mut() {
            if let Err(err) = sink.handle(event) {
                tracing::warn!(sink = %sink.name(), %err, "event sink error");
            }
        }
    }

    /// Drop every sink (engine teardown).
    pub fn clear_sinks(&self) {
        self.sinks.lock().unwrap().clear();
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::sink::MemorySink;
    use std::io;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn handle(&mut self, _event: &RuntimeEvent) -> io::Result<()> {
            Err(io::Error::other("boom"))
        }
    }

    #[test]
    fn emit_reaches_every_sink_in_order() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let bus = EventBus::with_sinks(vec![Box::new(first.clone()), Box::new(second.clone())]);

        bus.emit(&RuntimeEvent::processing("wf", "n1"));
        bus.emit(&RuntimeEvent::processing("wf", "n2"));

        for sink in [first, second] {
            let events = sink.snapshot();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].node_id(), Some("n1"));
            assert_eq!(events[1].node_id(), Some("n2"));
        }
    }

    #[test]
    fn failing_sink_does_not_abort_the_rest() {
        let witness = MemorySink::new();
        let bus = EventBus::with_sinks(vec![Box::new(FailingSink), Box::new(witness.clone())]);
        bus.emit(&RuntimeEvent::processing("wf", "n"));
        assert_eq!(witness.snapshot().len(), 1);
    }

    #[test]
    fn clear_sinks_empties_the_bus() {
        let bus = EventBus::with_sink(MemorySink::new());
        assert_eq!(bus.sink_count(), 1);
        bus.clear_sinks();
        assert_eq!(bus.sink_count(), 0);
    }
}
