//! Task lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a task generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEventKind {
    /// A generation was accepted and its first attempt started.
    Started,
    /// A value was published on the result channel.
    Succeeded,
    /// An attempt failed and a retry was scheduled.
    Retrying {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Backoff before the retry.
        delay_ms: u64,
        /// Rendered failure of the attempt.
        error: String,
    },
    /// Retries were exhausted and the failure was published.
    Failed {
        /// Total number of invocations, initial one included.
        attempts: u32,
        /// Rendered terminal failure.
        error: String,
    },
    /// A newer `run` replaced this generation.
    Superseded,
    /// The generation was cancelled without a replacement.
    Cancelled,
}

/// A lifecycle event emitted to a [`TaskEventSink`](super::TaskEventSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Name of the task.
    pub task: String,
    /// Generation the event belongs to.
    pub generation: u64,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub kind: TaskEventKind,
}

impl TaskEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(task: impl Into<String>, generation: u64, kind: TaskEventKind) -> Self {
        Self {
            task: task.into(),
            generation,
            at: Utc::now(),
            kind,
        }
    }

    /// Returns a dotted event type such as `task.retrying`.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            TaskEventKind::Started => "task.started",
            TaskEventKind::Succeeded => "task.succeeded",
            TaskEventKind::Retrying { .. } => "task.retrying",
            TaskEventKind::Failed { .. } => "task.failed",
            TaskEventKind::Superseded => "task.superseded",
            TaskEventKind::Cancelled => "task.cancelled",
        }
    }

    /// Converts the event to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
