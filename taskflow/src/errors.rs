//! Error types for the taskflow crate.
//!
//! Two families are kept apart:
//! - [`TaskflowError`] is returned synchronously, and only while building a
//!   task or parsing its configuration.
//! - [`TaskError`] describes a failed operation and is only ever published on a
//!   task's error channel.

use thiserror::Error;

/// Errors raised while constructing or configuring a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskflowError {
    /// A task was given an empty name.
    #[error("Task name must not be empty")]
    InvalidName,

    /// The retry configuration cannot be represented.
    #[error(
        "Invalid retry config: {max_attempts} attempts with a base delay of {base_delay_ms}ms overflows the longest backoff"
    )]
    InvalidRetryConfig {
        /// Configured number of retries.
        max_attempts: u32,
        /// Configured base delay in milliseconds.
        base_delay_ms: u64,
    },

    /// A task was built outside a tokio runtime and no handle was supplied.
    #[error("Task '{0}' must be built inside a tokio runtime or given a runtime handle")]
    NoRuntime(String),

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TaskflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// A terminal operation failure, as seen by subscribers of a task's errors.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The operation resolved with an error.
    #[error("{0}")]
    Operation(E),

    /// The operation panicked while being called or polled.
    #[error("Operation panicked: {0}")]
    Panicked(String),

    /// The generation ended without publishing a value, either because it was
    /// cancelled or because a streaming operation completed empty.
    ///
    /// Never published on the error channel; only returned by
    /// [`Task::run_and_wait`](crate::task::Task::run_and_wait).
    #[error("Task ended without a result")]
    Cancelled,
}

impl<E> TaskError<E> {
    /// Returns true if the operation itself returned the error.
    #[must_use]
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Returns true if the operation panicked.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns the operation error, if this failure carries one.
    #[must_use]
    pub const fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            _ => None,
        }
    }
}

/// Renders a caught panic payload into a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
