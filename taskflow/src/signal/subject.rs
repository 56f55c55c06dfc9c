//! Synchronous multicast subjects.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::warn;

use super::dispatcher::{Dispatcher, Job};
use super::{SignalStream, Subscription};
use crate::errors::panic_message;

/// A registered listener.
///
/// Cleared entries stay in staged deliveries but are skipped.
pub(crate) struct Entry<T> {
    active: AtomicBool,
    listener: Box<dyn Fn(&T) + Send + Sync>,
}

impl<T> Entry<T> {
    fn call(&self, value: &T) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (self.listener)(value))) {
            warn!(
                error = %panic_message(payload.as_ref()),
                "Listener panicked"
            );
        }
    }
}

/// Stages a delivery of `value` to `entry` alone.
pub(crate) fn replay<T: Send + 'static>(entry: Arc<Entry<T>>, value: T) -> Job {
    Box::new(move || entry.call(&value))
}

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Arc<Entry<T>>)>,
}

struct Inner<T> {
    dispatcher: Arc<Dispatcher>,
    listeners: Mutex<Listeners<T>>,
}

/// A multicast notification channel.
///
/// Listeners are called in registration order, once per
/// [`next`](Self::next), with no lock held. A value emitted from inside a
/// listener is delivered once the current delivery returns, and a value
/// emitted while another thread is delivering is handed to that thread. A
/// panicking listener is logged and skipped. Cloning a subject yields another
/// handle to the same channel.
pub struct Subject<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Subject<T> {
    /// Creates a subject with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dispatcher(Arc::new(Dispatcher::new()))
    }

    /// Creates a subject that delivers through a queue shared with its owner.
    pub(crate) fn with_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                listeners: Mutex::new(Listeners {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Registers a listener. The listener stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let (_, subscription) = self.register(Box::new(listener));
        subscription
    }

    /// Delivers a value to every current listener.
    pub fn next(&self, value: T) {
        let dispatcher = &self.inner.dispatcher;
        dispatcher.stage(|jobs| self.stage_next(jobs, value));
        dispatcher.drain();
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().entries.len()
    }

    /// Adapts the subject into an async stream of future values.
    #[must_use]
    pub fn stream(&self) -> SignalStream<T>
    where
        T: Clone,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            // receiver gone means the stream was dropped mid-dispatch
            let _ = tx.send(value.clone());
        });
        SignalStream::new(rx, subscription)
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Stages a delivery to the listeners registered right now. Call with the
    /// dispatcher's queue locked, then drain.
    pub(crate) fn stage_next(&self, jobs: &mut VecDeque<Job>, value: T) {
        let entries: Vec<Arc<Entry<T>>> = self
            .inner
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, entry)| Arc::clone(entry))
            .collect();
        if entries.is_empty() {
            return;
        }

        jobs.push_back(Box::new(move || {
            for entry in &entries {
                entry.call(&value);
            }
        }));
    }

    pub(crate) fn register(
        &self,
        listener: Box<dyn Fn(&T) + Send + Sync>,
    ) -> (Arc<Entry<T>>, Subscription) {
        let entry = Arc::new(Entry {
            active: AtomicBool::new(true),
            listener,
        });
        let id = {
            let mut listeners = self.inner.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::clone(&entry)));
            id
        };

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let registered = Arc::clone(&entry);
        let subscription = Subscription::new(move || {
            registered.active.store(false, Ordering::Release);
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().entries.retain(|(entry, _)| *entry != id);
            }
        });
        (entry, subscription)
    }
}

impl<T: Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("listeners", &self.inner.listeners.lock().entries.len())
            .finish()
    }
}

/// A subject that remembers its latest value.
///
/// New listeners receive the current value on subscribe, ordered after every
/// value emitted before it.
pub struct BehaviorSubject<T> {
    subject: Subject<T>,
    current: Arc<RwLock<T>>,
}

impl<T: Clone + Send + 'static> BehaviorSubject<T> {
    /// Creates a behavior subject holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_dispatcher(initial, Arc::new(Dispatcher::new()))
    }

    /// Creates a behavior subject that delivers through a queue shared with
    /// its owner.
    pub(crate) fn with_dispatcher(initial: T, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            subject: Subject::with_dispatcher(dispatcher),
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// Returns a copy of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.current.read().clone()
    }

    /// Stores `value` and delivers it to every listener.
    pub fn next(&self, value: T) {
        let dispatcher = self.subject.dispatcher();
        dispatcher.stage(|jobs| self.stage_next(jobs, value));
        dispatcher.drain();
    }

    /// Registers a listener and calls it with the current value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let dispatcher = self.subject.dispatcher();
        let subscription = dispatcher.stage(|jobs| {
            let (entry, subscription) = self.subject.register(Box::new(listener));
            jobs.push_back(replay(entry, self.value()));
            subscription
        });
        dispatcher.drain();
        subscription
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subject.listener_count()
    }

    /// Adapts the subject into an async stream starting with the current value.
    #[must_use]
    pub fn stream(&self) -> SignalStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        SignalStream::new(rx, subscription)
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.subject.dispatcher()
    }

    /// Stores `value` and stages its delivery. Call with the dispatcher's
    /// queue locked, then drain.
    pub(crate) fn stage_next(&self, jobs: &mut VecDeque<Job>, value: T) {
        *self.current.write() = value.clone();
        self.subject.stage_next(jobs, value);
    }
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            current: Arc::clone(&self.current),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorSubject")
            .field("value", &*self.current.read())
            .field("listeners", &self.subject.inner.listeners.lock().entries.len())
            .finish()
    }
}
