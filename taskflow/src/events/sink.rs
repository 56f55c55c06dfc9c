//! Event sink trait and implementations.

use tracing::{debug, error, info, trace, warn, Level};

use super::{TaskEvent, TaskEventKind};

/// Receives task lifecycle events.
///
/// Sinks are an optional telemetry hook; a task works the same with the
/// default [`NoOpEventSink`].
#[cfg_attr(test, mockall::automock)]
pub trait TaskEventSink: Send + Sync {
    /// Records an event without blocking.
    ///
    /// This method must never panic. Errors are logged but suppressed.
    fn try_emit(&self, event: &TaskEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl TaskEventSink for NoOpEventSink {
    fn try_emit(&self, _event: &TaskEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Every event is logged at the configured level. Tasks log their own retries
/// and terminal failures at `WARN` and `ERROR`, so the sink only adds the
/// event stream.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }

    /// Returns the configured level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }
}

impl TaskEventSink for LoggingEventSink {
    fn try_emit(&self, event: &TaskEvent) {
        let event_type = event.event_type();
        let (attempt, delay_ms, error) = match &event.kind {
            TaskEventKind::Retrying {
                attempt,
                delay_ms,
                error,
            } => (Some(*attempt), Some(*delay_ms), Some(error.as_str())),
            TaskEventKind::Failed { attempts, error } => {
                (Some(*attempts), None, Some(error.as_str()))
            }
            _ => (None, None, None),
        };

        macro_rules! log_at {
            ($log:ident) => {
                $log!(
                    task = %event.task,
                    generation = event.generation,
                    attempt,
                    delay_ms,
                    error,
                    "Event: {}", event_type
                )
            };
        }

        if self.level == Level::ERROR {
            log_at!(error);
        } else if self.level == Level::WARN {
            log_at!(warn);
        } else if self.level == Level::INFO {
            log_at!(info);
        } else if self.level == Level::DEBUG {
            log_at!(debug);
        } else {
            log_at!(trace);
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<TaskEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.read().clone()
    }

    /// Returns the dotted types of all collected events, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(TaskEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<TaskEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl TaskEventSink for CollectingEventSink {
    fn try_emit(&self, event: &TaskEvent) {
        self.events.write().push(event.clone());
    }
}
