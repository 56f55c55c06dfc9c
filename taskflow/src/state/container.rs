//! The state container.

use parking_lot::ReentrantMutex;
use std::sync::Arc;
use tracing::trace;

use super::Selector;
use crate::signal::{BehaviorSubject, Observable, SignalStream, Subscription};

struct Inner<T> {
    /// Serializes recipes. Re-entrant so a recipe may replace the value
    /// itself. Never held while subscribers run.
    update: ReentrantMutex<()>,
    current: BehaviorSubject<Arc<T>>,
}

/// Holds a value and publishes every replacement of it.
///
/// Subscribers and selectors are notified through one ordered queue with no
/// lock held, so a subscriber may replace the value or drive a task from
/// inside a notification. Cloning yields another handle to the same state.
///
/// ```rust
/// use taskflow::state::StateContainer;
///
/// #[derive(Clone, Default)]
/// struct Todos {
///     items: Vec<String>,
///     loading: bool,
/// }
///
/// let state = StateContainer::new(Todos::default());
/// let count = state.select(|todos| todos.items.len());
///
/// state.update(|todos| todos.items.push("write docs".to_string()));
/// assert_eq!(count.get(), 1);
/// ```
pub struct StateContainer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + Sync + 'static> StateContainer<T> {
    /// Creates a container holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                update: ReentrantMutex::new(()),
                current: BehaviorSubject::new(Arc::new(initial)),
            }),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn value(&self) -> Arc<T> {
        self.inner.current.value()
    }

    /// Returns a copy of the current value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value().as_ref().clone()
    }

    /// Replaces the value with `recipe(current)` and notifies subscribers once.
    pub fn replace<F>(&self, recipe: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = &self.inner.current;
        {
            let _update = self.inner.update.lock();
            let next = Arc::new(recipe(&current.value()));
            trace!(listeners = current.listener_count(), "State replaced");
            current
                .dispatcher()
                .stage(|jobs| current.stage_next(jobs, next));
        }
        current.dispatcher().drain();
    }

    /// Replaces the value outright.
    pub fn set(&self, value: T) {
        self.replace(|_| value);
    }

    /// Applies `recipe` to a copy of the current value, which then becomes the
    /// new value.
    pub fn update<F>(&self, recipe: F)
    where
        T: Clone,
        F: FnOnce(&mut T),
    {
        self.replace(|current| {
            let mut draft = current.clone();
            recipe(&mut draft);
            draft
        });
    }

    /// Registers a listener for every replacement; it is called with the
    /// current snapshot immediately.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.inner.current.subscribe(listener)
    }

    /// Returns the number of raw listeners, counting one per connected selector.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.current.listener_count()
    }

    /// Adapts raw change notifications into an async stream.
    #[must_use]
    pub fn stream(&self) -> SignalStream<Arc<T>> {
        self.inner.current.stream()
    }

    /// Derives a deduplicated projection of the value.
    pub fn select<K, F>(&self, projector: F) -> Selector<K>
    where
        K: Clone + PartialEq + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let projector = Arc::new(projector);
        let get = {
            let state = self.clone();
            let projector = Arc::clone(&projector);
            move || projector(state.value().as_ref())
        };
        let state = self.clone();
        let connect = move |emit: Box<dyn Fn(K) + Send + Sync>| {
            let projector = Arc::clone(&projector);
            state
                .inner
                .current
                .subscribe(move |value: &Arc<T>| emit(projector(value.as_ref())))
        };

        Selector::new(Arc::clone(self.inner.current.dispatcher()), get, connect)
    }

    /// Selector over the whole value, emitting only when it changes.
    pub fn value_changes(&self) -> Selector<T>
    where
        T: Clone + PartialEq,
    {
        self.select(T::clone)
    }
}

impl<T: Default + Send + Sync + 'static> Default for StateContainer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for StateContainer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StateContainer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateContainer")
            .field("value", &self.inner.current)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Observable<Arc<T>> for StateContainer<T> {
    fn observe(&self, listener: Box<dyn Fn(&Arc<T>) + Send + Sync>) -> Subscription {
        self.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Todos {
        items: Vec<String>,
        loading: bool,
    }

    #[test]
    fn test_replace_then_read() {
        let state = StateContainer::new(Todos::default());
        let replacement = Todos {
            items: vec!["milk".to_string()],
            loading: true,
        };

        let expected = replacement.clone();
        state.replace(move |_| replacement);

        assert_eq!(state.get(), expected);
    }

    #[test]
    fn test_set_and_update() {
        let state = StateContainer::new(0_u32);
        state.set(4);
        state.update(|n| *n += 1);
        assert_eq!(*state.value(), 5);
    }

    #[test]
    fn test_subscribers_notified_once_per_replace() {
        let state = StateContainer::new(1_u32);
        let recorder = Recorder::new();
        let _sub = recorder.attach(&state);

        state.set(1);
        state.replace(|n| n * 10);

        let seen: Vec<u32> = recorder.values().iter().map(|v| **v).collect();
        assert_eq!(seen, vec![1, 1, 10]);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let state = StateContainer::new(vec![1, 2]);
        let before = state.value();

        state.update(|items| items.push(3));

        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*state.value(), vec![1, 2, 3]);
    }

    #[test]
    fn test_subscriber_may_replace_reentrantly() {
        let state = StateContainer::new(0_u32);
        let echo = state.clone();
        let _sub = state.subscribe(move |value| {
            if **value == 1 {
                echo.set(2);
            }
        });

        state.set(1);
        assert_eq!(*state.value(), 2);
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let state = StateContainer::new(0_u64);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        state.update(|n| *n += 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*state.value(), 2000);
    }

    #[test]
    fn test_replace_from_other_thread_while_notifying() {
        let state = StateContainer::new(0_u32);
        let recorder = Recorder::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (resume_tx, resume_rx) = std::sync::mpsc::channel::<()>();
        let resume_rx = parking_lot::Mutex::new(resume_rx);

        let _gate = state.subscribe(move |value| {
            if **value == 1 {
                entered_tx.send(()).unwrap();
                resume_rx.lock().recv().unwrap();
            }
        });
        let _rec = recorder.attach(&state);

        let first = {
            let state = state.clone();
            std::thread::spawn(move || state.set(1))
        };
        entered_rx.recv().unwrap();

        state.set(2);
        assert_eq!(*state.value(), 2);

        resume_tx.send(()).unwrap();
        first.join().unwrap();
        let seen: Vec<u32> = recorder.values().iter().map(|v| **v).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stream_yields_snapshots() {
        use futures::StreamExt;

        let state = StateContainer::new("idle");
        let mut changes = state.stream();
        state.set("loading");

        assert_eq!(*changes.next().await.unwrap(), "idle");
        assert_eq!(*changes.next().await.unwrap(), "loading");
    }
}
