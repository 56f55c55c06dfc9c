//! Shared, deduplicated projections of a state container.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::signal::{replay, Dispatcher, Observable, SignalStream, Subject, Subscription};

type Emit<K> = Box<dyn Fn(K) + Send + Sync>;
type Connect<K> = Box<dyn Fn(Emit<K>) -> Subscription + Send + Sync>;

struct Connection<K> {
    last: Option<K>,
    subscribers: usize,
}

struct Shared<K> {
    /// The owning container's delivery queue.
    dispatcher: Arc<Dispatcher>,
    get: Box<dyn Fn() -> K + Send + Sync>,
    connect: Connect<K>,
    connection: Mutex<Connection<K>>,
    upstream: Mutex<Option<Subscription>>,
    downstream: Subject<K>,
}

impl<K: Clone + PartialEq + Send + 'static> Shared<K> {
    fn offer(&self, value: K) {
        self.dispatcher.stage(|jobs| {
            let mut connection = self.connection.lock();
            if connection.subscribers == 0 || connection.last.as_ref() == Some(&value) {
                return;
            }
            connection.last = Some(value.clone());
            drop(connection);
            self.downstream.stage_next(jobs, value);
        });
        self.dispatcher.drain();
    }

    fn release(&self) {
        let upstream = self.dispatcher.stage(|_| {
            let mut connection = self.connection.lock();
            connection.subscribers = connection.subscribers.saturating_sub(1);
            if connection.subscribers == 0 {
                connection.last = None;
                self.upstream.lock().take()
            } else {
                None
            }
        });
        if upstream.is_some() {
            debug!("Selector disconnected");
        }
        drop(upstream);
    }
}

/// A derived view over a [`StateContainer`](super::StateContainer).
///
/// Subscribers get the current projection immediately, then only projections
/// that differ from the last one delivered. All subscribers share a single
/// upstream subscription, so the projector runs once per replacement no matter
/// how many subscribers there are. The upstream subscription is made by the
/// first subscriber and released with the last.
pub struct Selector<K> {
    shared: Arc<Shared<K>>,
}

impl<K: Clone + PartialEq + Send + 'static> Selector<K> {
    pub(crate) fn new<G, C>(dispatcher: Arc<Dispatcher>, get: G, connect: C) -> Self
    where
        G: Fn() -> K + Send + Sync + 'static,
        C: Fn(Emit<K>) -> Subscription + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                downstream: Subject::with_dispatcher(Arc::clone(&dispatcher)),
                dispatcher,
                get: Box::new(get),
                connect: Box::new(connect),
                connection: Mutex::new(Connection {
                    last: None,
                    subscribers: 0,
                }),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// Registers a listener; it is called with the current projection now and
    /// with every distinct projection after.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        let shared = &self.shared;

        let (downstream, first) = shared.dispatcher.stage(|jobs| {
            let (entry, downstream) = shared.downstream.register(Box::new(listener));
            let mut connection = shared.connection.lock();
            connection.subscribers += 1;
            if let Some(last) = &connection.last {
                jobs.push_back(replay(entry, last.clone()));
            }
            (downstream, connection.subscribers == 1)
        });

        if first {
            // the first projection arrives through the upstream replay
            let weak = Arc::downgrade(shared);
            let upstream = (shared.connect)(Box::new(move |value| {
                if let Some(shared) = weak.upgrade() {
                    shared.offer(value);
                }
            }));
            *shared.upstream.lock() = Some(upstream);
            debug!("Selector connected");
        }
        shared.dispatcher.drain();

        let shared = Arc::clone(shared);
        Subscription::new(move || {
            drop(downstream);
            shared.release();
        })
    }

    /// Projects the current value without subscribing.
    #[must_use]
    pub fn get(&self) -> K {
        (self.shared.get)()
    }

    /// Adapts the selector into an async stream starting with the current
    /// projection.
    #[must_use]
    pub fn stream(&self) -> SignalStream<K> {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &K| {
            // receiver gone means the stream was dropped mid-dispatch
            let _ = tx.send(value.clone());
        });
        SignalStream::new(rx, subscription)
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.connection.lock().subscribers
    }

    /// Returns true while the shared upstream subscription exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.upstream.lock().is_some()
    }
}

impl<K> Clone for Selector<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for Selector<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connection = self.shared.connection.lock();
        f.debug_struct("Selector")
            .field("last", &connection.last)
            .field("subscribers", &connection.subscribers)
            .finish()
    }
}

impl<K: Clone + PartialEq + Send + 'static> Observable<K> for Selector<K> {
    fn observe(&self, listener: Box<dyn Fn(&K) + Send + Sync>) -> Subscription {
        self.subscribe(listener)
    }
}
