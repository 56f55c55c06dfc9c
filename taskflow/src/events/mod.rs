//! Optional telemetry hook for task lifecycles.
//!
//! Tasks report every lifecycle transition to a [`TaskEventSink`]. The default
//! sink discards events; [`LoggingEventSink`] forwards them to `tracing` and
//! [`CollectingEventSink`] keeps them for assertions.

mod event;
mod sink;

pub use event::{TaskEvent, TaskEventKind};
pub use sink::{CollectingEventSink, LoggingEventSink, NoOpEventSink, TaskEventSink};

#[cfg(test)]
pub use sink::MockTaskEventSink;
