//! Event bus: the synchronous publish hub that fans runtime events out to
//! observer sinks (stdout, memory snapshots, channels, JSON-lines files).

mod bus;
mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{MessageLevel, NodeStatus, OverStatus, RuntimeEvent};
pub use sink::{ChannelSink, EventSink, JsonLinesSink, MemorySink, StdOutSink};
