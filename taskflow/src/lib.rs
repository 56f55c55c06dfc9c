//! # Taskflow
//!
//! Reactive task pipelines and state containers.
//!
//! Taskflow provides:
//!
//! - **Task pipelines**: wrap an async operation with pending/result/error channels
//! - **Supersede semantics**: a new run cancels the in-flight one, so only the latest outcome is published
//! - **Retry with linear backoff**: retry `n` waits `n × base_delay`
//! - **State containers**: atomic replacement with shared, deduplicated selectors
//! - **Lifecycle events**: optional telemetry sinks for every task transition
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskflow::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Todos {
//!     items: Vec<String>,
//!     loading: bool,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), TaskflowError> {
//! let state = StateContainer::new(Todos::default());
//!
//! let fetch: Task<Vec<String>> = Task::builder("fetch-todos")
//!     .retry(RetryConfig::standard())
//!     .build(|()| async { Ok(vec!["milk".to_string()]) })?;
//!
//! let mut service = SubscriptionSet::new();
//! service.add({
//!     let state = state.clone();
//!     fetch.pending().subscribe(move |pending| {
//!         let pending = *pending;
//!         state.update(|todos| todos.loading = pending);
//!     })
//! });
//! service.add({
//!     let state = state.clone();
//!     fetch.results().subscribe(move |items| {
//!         let items = items.clone();
//!         state.update(|todos| todos.items = items);
//!     })
//! });
//!
//! fetch.run(());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod errors;
pub mod events;
pub mod observability;
pub mod signal;
pub mod state;
pub mod task;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::GenerationToken;
    pub use crate::errors::{TaskError, TaskflowError};
    pub use crate::events::{
        CollectingEventSink, LoggingEventSink, NoOpEventSink, TaskEvent, TaskEventKind,
        TaskEventSink,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::signal::{
        BehaviorSubject, BehaviorView, Observable, Subject, SubjectView, Subscription,
        SubscriptionSet,
    };
    pub use crate::state::{Selector, StateContainer};
    pub use crate::task::{Operation, RetryConfig, Task, TaskBuilder, TaskConfig, TaskFailure};
}
