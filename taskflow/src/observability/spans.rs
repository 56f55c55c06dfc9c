//! Spans for task workers.

use tracing::Span;

/// Span covering one generation of a task, including its retries.
#[must_use]
pub fn task_span(task: &str, generation: u64) -> Span {
    tracing::debug_span!("task", task, generation)
}
