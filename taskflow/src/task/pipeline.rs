//! The task pipeline: one wrapped operation, three channels, cancel-and-restart.

use futures::future::Future;
use futures::stream::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, warn, Instrument};

use super::operation::{self, BoxedOperation, Operation};
use super::{RetryConfig, TaskConfig};
use crate::cancellation::GenerationToken;
use crate::errors::{panic_message, TaskError, TaskflowError};
use crate::events::{NoOpEventSink, TaskEvent, TaskEventKind, TaskEventSink};
use crate::observability::task_span;
use crate::signal::{BehaviorSubject, BehaviorView, Dispatcher, Subject, SubjectView};

/// A failure as published on a task's error channel.
pub type TaskFailure<E> = Arc<TaskError<E>>;

#[derive(Default)]
struct Control {
    /// Last generation handed out.
    generation: u64,
    live: Option<Arc<GenerationToken>>,
}

struct Inner<R, P, E> {
    name: String,
    operation: BoxedOperation<P, R, E>,
    retry: RetryConfig,
    sink: Arc<dyn TaskEventSink>,
    runtime: Handle,
    pending: BehaviorSubject<bool>,
    results: Subject<R>,
    errors: Subject<TaskFailure<E>>,
    last_result: RwLock<Option<R>>,
    last_error: RwLock<Option<TaskFailure<E>>>,
    /// Delivery queue shared by the three channels. Liveness checks and the
    /// notifications they allow are staged together under its lock, and
    /// listeners run after it is released.
    dispatcher: Arc<Dispatcher>,
    /// Never held while calling out.
    control: Mutex<Control>,
}

impl<R, P, E> Inner<R, P, E>
where
    R: Clone + Send + Sync + 'static,
    P: Clone + Send + 'static,
    E: Display + Send + Sync + 'static,
{
    fn emit(&self, generation: u64, kind: TaskEventKind) {
        self.sink
            .try_emit(&TaskEvent::new(self.name.as_str(), generation, kind));
    }

    fn is_live(&self, token: &GenerationToken) -> bool {
        self.control
            .lock()
            .live
            .as_ref()
            .is_some_and(|live| live.generation() == token.generation())
    }

    /// Ends the generation if it is still live. Call while staging.
    fn end_generation(&self, token: &GenerationToken) -> bool {
        let mut control = self.control.lock();
        let live = control
            .live
            .as_ref()
            .is_some_and(|live| live.generation() == token.generation());
        if live {
            control.live = None;
        }
        live
    }

    /// Publishes one successful value. Returns false if the generation is stale.
    fn publish(&self, token: &GenerationToken, value: R) -> bool {
        let published = self.dispatcher.stage(|jobs| {
            if !self.is_live(token) {
                return false;
            }
            *self.last_result.write() = Some(value.clone());
            *self.last_error.write() = None;
            self.results.stage_next(jobs, value);
            true
        });
        if published {
            self.emit(token.generation(), TaskEventKind::Succeeded);
        }
        self.dispatcher.drain();
        published
    }

    /// Ends a live generation and clears the pending flag.
    fn complete(&self, token: &GenerationToken) {
        let finished = self.dispatcher.stage(|jobs| {
            let finished = self.end_generation(token);
            if finished {
                self.pending.stage_next(jobs, false);
            }
            finished
        });
        if finished {
            debug!(task = %self.name, generation = token.generation(), "Task finished");
        }
        self.dispatcher.drain();
    }

    fn fail(&self, token: &GenerationToken, failure: TaskError<E>, attempts: u32) {
        let failure = Arc::new(failure);
        let failed = self.dispatcher.stage(|jobs| {
            if !self.end_generation(token) {
                return false;
            }
            *self.last_error.write() = Some(Arc::clone(&failure));
            self.errors.stage_next(jobs, Arc::clone(&failure));
            self.pending.stage_next(jobs, false);
            true
        });
        if failed {
            error!(
                task = %self.name,
                generation = token.generation(),
                attempts,
                error = %failure,
                "Task failed"
            );
            self.emit(
                token.generation(),
                TaskEventKind::Failed {
                    attempts,
                    error: failure.to_string(),
                },
            );
        }
        self.dispatcher.drain();
    }

    fn note_retry(&self, token: &GenerationToken, attempt: u32, failure: &TaskError<E>) {
        let delay_ms = self.retry.delay_ms_for(attempt);
        warn!(
            task = %self.name,
            generation = token.generation(),
            attempt,
            delay_ms,
            error = %failure,
            "Task failed. Retrying after {:.1} seconds...",
            self.retry.delay_for(attempt).as_secs_f64()
        );
        self.emit(
            token.generation(),
            TaskEventKind::Retrying {
                attempt,
                delay_ms,
                error: failure.to_string(),
            },
        );
    }
}

impl<R, P, E> Drop for Inner<R, P, E> {
    fn drop(&mut self) {
        if let Some(token) = self.control.get_mut().live.take() {
            token.cancel("task dropped");
        }
    }
}

enum Attempt<E> {
    Completed,
    Failed(TaskError<E>),
    Stale,
}

/// Drives one generation: attempts, backoff, and the terminal transition.
///
/// Holds only a weak reference to the task between steps so that dropping the
/// last task handle cancels the generation.
async fn drive<R, P, E>(
    task: Weak<Inner<R, P, E>>,
    token: Arc<GenerationToken>,
    operation: BoxedOperation<P, R, E>,
    retry: RetryConfig,
    params: P,
) where
    R: Clone + Send + Sync + 'static,
    P: Clone + Send + 'static,
    E: Display + Send + Sync + 'static,
{
    let mut retries = 0_u32;
    loop {
        let failure = match attempt(&task, &token, &operation, params.clone()).await {
            Attempt::Completed => {
                if let Some(inner) = task.upgrade() {
                    inner.complete(&token);
                }
                return;
            }
            Attempt::Stale => return,
            Attempt::Failed(failure) => failure,
        };

        let Some(inner) = task.upgrade() else { return };
        if !inner.is_live(&token) {
            return;
        }
        let Some(delay) = retry.next_retry(retries) else {
            inner.fail(&token, failure, retries + 1);
            return;
        };
        retries += 1;
        inner.note_retry(&token, retries, &failure);
        drop(inner);

        tokio::time::sleep(delay).await;
        if token.is_cancelled() {
            return;
        }
    }
}

async fn attempt<R, P, E>(
    task: &Weak<Inner<R, P, E>>,
    token: &GenerationToken,
    operation: &BoxedOperation<P, R, E>,
    params: P,
) -> Attempt<E>
where
    R: Clone + Send + Sync + 'static,
    P: Clone + Send + 'static,
    E: Display + Send + Sync + 'static,
{
    let stream = match panic::catch_unwind(AssertUnwindSafe(|| (operation.as_ref())(params))) {
        Ok(stream) => stream,
        Err(payload) => return Attempt::Failed(TaskError::Panicked(panic_message(payload.as_ref()))),
    };

    let mut stream = AssertUnwindSafe(stream).catch_unwind();
    while let Some(item) = stream.next().await {
        match item {
            Ok(Ok(value)) => {
                let Some(inner) = task.upgrade() else {
                    return Attempt::Stale;
                };
                if !inner.publish(token, value) {
                    return Attempt::Stale;
                }
            }
            Ok(Err(err)) => return Attempt::Failed(TaskError::Operation(err)),
            Err(payload) => {
                return Attempt::Failed(TaskError::Panicked(panic_message(payload.as_ref())))
            }
        }
    }
    Attempt::Completed
}

/// Wraps one asynchronous operation with pending/result/error channels,
/// retry with linear backoff, and automatic cancellation of superseded runs.
///
/// `Task` is a cheap handle; clones share the same pipeline. When the last
/// handle is dropped, any live generation is cancelled.
///
/// ```rust
/// use taskflow::task::{RetryConfig, Task};
///
/// # async fn demo() -> Result<(), taskflow::errors::TaskflowError> {
/// let fetch: Task<Vec<String>> = Task::builder("fetch-items")
///     .retry(RetryConfig::new(2, 1000))
///     .build(|()| async { Ok(vec!["milk".to_string()]) })?;
///
/// let _sub = fetch.results().subscribe(|items| println!("{} items", items.len()));
/// fetch.run(());
/// assert!(fetch.is_pending());
/// # Ok(())
/// # }
/// ```
pub struct Task<R, P = (), E = anyhow::Error> {
    inner: Arc<Inner<R, P, E>>,
}

impl Task<(), (), anyhow::Error> {
    /// Starts building a task named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }
}

impl<R, P, E> Task<R, P, E>
where
    R: Clone + Send + Sync + 'static,
    P: Clone + Send + 'static,
    E: Display + Send + Sync + 'static,
{
    /// Starts a new generation with `params`, cancelling the live one.
    ///
    /// [`is_pending`](Self::is_pending) is true when this returns, and
    /// `pending` listeners have seen `true` unless this is called from inside
    /// one of the task's listeners or while another thread is delivering the
    /// task's notifications. Then `true` is delivered as soon as that delivery
    /// returns, still ahead of anything the new generation publishes.
    /// Outcomes are only observable through [`results`](Self::results) and
    /// [`errors`](Self::errors).
    pub fn run(&self, params: P) {
        let inner = &self.inner;
        let (token, superseded) = inner.dispatcher.stage(|jobs| {
            let mut control = inner.control.lock();
            let superseded = control.live.take();
            control.generation += 1;
            let token = Arc::new(GenerationToken::new(control.generation));
            control.live = Some(Arc::clone(&token));
            drop(control);
            inner.pending.stage_next(jobs, true);
            (token, superseded)
        });

        if let Some(previous) = superseded {
            previous.cancel(format!("superseded by generation {}", token.generation()));
            debug!(task = %inner.name, generation = previous.generation(), "Task superseded");
            inner.emit(previous.generation(), TaskEventKind::Superseded);
        }

        debug!(task = %inner.name, generation = token.generation(), "Task started");
        inner.emit(token.generation(), TaskEventKind::Started);

        let worker = inner.runtime.spawn(
            drive(
                Arc::downgrade(inner),
                Arc::clone(&token),
                Arc::clone(&inner.operation),
                inner.retry,
                params,
            )
            .instrument(task_span(&inner.name, token.generation())),
        );
        let abort = worker.abort_handle();
        token.on_cancel(move || abort.abort());
        inner.dispatcher.drain();
    }

    /// Cancels the live generation without starting a new one.
    ///
    /// Publishes `pending = false` and nothing else. Returns false when idle.
    pub fn cancel(&self) -> bool {
        let inner = &self.inner;
        let live = inner.dispatcher.stage(|jobs| {
            let live = inner.control.lock().live.take();
            if live.is_some() {
                inner.pending.stage_next(jobs, false);
            }
            live
        });
        let Some(token) = live else {
            return false;
        };

        token.cancel("cancelled");
        debug!(task = %inner.name, generation = token.generation(), "Task cancelled");
        inner.emit(token.generation(), TaskEventKind::Cancelled);
        inner.dispatcher.drain();
        true
    }

    /// Runs with `params` and waits for the next terminal notification.
    ///
    /// Resolves with the first value published on `results` or the first
    /// failure on `errors` after the call. If this generation is superseded the
    /// superseding generation's outcome is returned instead; if the task goes
    /// idle without either, the result is [`TaskError::Cancelled`].
    pub async fn run_and_wait(&self, params: P) -> Result<R, TaskFailure<E>> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let _results = {
            let slot = Arc::clone(&slot);
            self.inner
                .results
                .subscribe(move |value: &R| settle(&slot, Ok(value.clone())))
        };
        let _errors = {
            let slot = Arc::clone(&slot);
            self.inner
                .errors
                .subscribe(move |failure: &TaskFailure<E>| settle(&slot, Err(Arc::clone(failure))))
        };

        self.run(params);

        let _pending = {
            let slot = Arc::clone(&slot);
            self.inner.pending.subscribe(move |pending: &bool| {
                if !*pending {
                    settle(&slot, Err(Arc::new(TaskError::Cancelled)));
                }
            })
        };
        drop(slot);

        rx.await
            .unwrap_or_else(|_| Err(Arc::new(TaskError::Cancelled)))
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        self.inner.retry
    }

    /// Execution status channel; replays the current status on subscribe.
    #[must_use]
    pub fn pending(&self) -> BehaviorView<bool> {
        BehaviorView::from(&self.inner.pending)
    }

    /// Successful results channel.
    #[must_use]
    pub fn results(&self) -> SubjectView<R> {
        SubjectView::from(&self.inner.results)
    }

    /// Terminal failures channel.
    #[must_use]
    pub fn errors(&self) -> SubjectView<TaskFailure<E>> {
        SubjectView::from(&self.inner.errors)
    }

    /// Returns true while a generation is live.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.value()
    }

    /// Returns the most recent published value.
    #[must_use]
    pub fn last_result(&self) -> Option<R> {
        self.inner.last_result.read().clone()
    }

    /// Returns the most recent terminal failure, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<TaskFailure<E>> {
        self.inner.last_error.read().clone()
    }

    /// Returns the number of generations started so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.control.lock().generation
    }
}

fn settle<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, outcome: T) {
    if let Some(tx) = slot.lock().take() {
        // the waiting future may already be gone
        let _ = tx.send(outcome);
    }
}

impl<R, P, E> Clone for Task<R, P, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, P, E> std::fmt::Debug for Task<R, P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("retry", &self.inner.retry)
            .field("pending", &self.inner.pending.value())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
///
/// Validation happens in the terminal `build*` methods, so misuse fails at
/// construction rather than at run time.
pub struct TaskBuilder {
    config: TaskConfig,
    sink: Arc<dyn TaskEventSink>,
    runtime: Option<Handle>,
}

impl TaskBuilder {
    /// Creates a builder with no retries and no event sink.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(TaskConfig::new(name))
    }

    /// Creates a builder from a loaded configuration.
    #[must_use]
    pub fn from_config(config: TaskConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
            runtime: None,
        }
    }

    /// Replaces the name and retry policy with a loaded configuration.
    #[must_use]
    pub fn config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn TaskEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs workers on `handle` instead of the ambient runtime.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds a task around a future-returning operation.
    pub fn build<R, P, E, F, Fut>(self, operation: F) -> Result<Task<R, P, E>, TaskflowError>
    where
        R: Clone + Send + Sync + 'static,
        P: Clone + Send + 'static,
        E: Display + Send + Sync + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.finish(operation::from_future(operation))
    }

    /// Builds a task around a stream-returning operation.
    ///
    /// Every `Ok` item is published as it arrives; an `Err` item fails the
    /// attempt; the generation completes when the stream ends.
    pub fn build_stream<R, P, E, F, S>(self, operation: F) -> Result<Task<R, P, E>, TaskflowError>
    where
        R: Clone + Send + Sync + 'static,
        P: Clone + Send + 'static,
        E: Display + Send + Sync + 'static,
        F: Fn(P) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<R, E>> + Send + 'static,
    {
        self.finish(operation::from_stream(operation))
    }

    /// Builds a task around an [`Operation`] implementor.
    pub fn build_operation<P, O>(
        self,
        operation: O,
    ) -> Result<Task<O::Output, P, O::Error>, TaskflowError>
    where
        P: Clone + Send + 'static,
        O: Operation<P>,
        O::Output: Clone + Sync,
        O::Error: Display + Sync,
    {
        self.finish(operation::from_operation(operation))
    }

    fn finish<R, P, E>(self, operation: BoxedOperation<P, R, E>) -> Result<Task<R, P, E>, TaskflowError>
    where
        R: Clone + Send + Sync + 'static,
        P: Clone + Send + 'static,
        E: Display + Send + Sync + 'static,
    {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|_| TaskflowError::NoRuntime(self.config.name.clone()))?,
        };

        let dispatcher = Arc::new(Dispatcher::new());
        Ok(Task {
            inner: Arc::new(Inner {
                name: self.config.name,
                operation,
                retry: self.config.retry,
                sink: self.sink,
                runtime,
                pending: BehaviorSubject::with_dispatcher(false, Arc::clone(&dispatcher)),
                results: Subject::with_dispatcher(Arc::clone(&dispatcher)),
                errors: Subject::with_dispatcher(Arc::clone(&dispatcher)),
                last_result: RwLock::new(None),
                last_error: RwLock::new(None),
                dispatcher,
                control: Mutex::new(Control::default()),
            }),
        })
    }
}

impl std::fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("config", &self.config)
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}
