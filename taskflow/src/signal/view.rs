//! Read-only handles to subjects.

use super::{BehaviorSubject, Observable, SignalStream, Subject, Subscription};

/// Subscribe-only handle to a [`Subject`].
pub struct SubjectView<T> {
    subject: Subject<T>,
}

impl<T: Send + 'static> SubjectView<T> {
    /// Registers a listener until the returned subscription is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subject.subscribe(listener)
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subject.listener_count()
    }

    /// Adapts the channel into an async stream of future values.
    #[must_use]
    pub fn stream(&self) -> SignalStream<T>
    where
        T: Clone,
    {
        self.subject.stream()
    }
}

impl<T> Clone for SubjectView<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SubjectView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SubjectView").field(&self.subject).finish()
    }
}

impl<T: Send + 'static> Observable<T> for SubjectView<T> {
    fn observe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subject.subscribe(listener)
    }
}

impl<T: Send + 'static> From<&Subject<T>> for SubjectView<T> {
    fn from(subject: &Subject<T>) -> Self {
        Self {
            subject: subject.clone(),
        }
    }
}

/// Subscribe-only handle to a [`BehaviorSubject`].
pub struct BehaviorView<T> {
    subject: BehaviorSubject<T>,
}

impl<T: Clone + Send + 'static> BehaviorView<T> {
    /// Returns a copy of the current value.
    #[must_use]
    pub fn value(&self) -> T {
        self.subject.value()
    }

    /// Registers a listener and calls it with the current value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subject.subscribe(listener)
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.subject.listener_count()
    }

    /// Adapts the channel into an async stream starting with the current value.
    #[must_use]
    pub fn stream(&self) -> SignalStream<T> {
        self.subject.stream()
    }
}

impl<T> Clone for BehaviorView<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BehaviorView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BehaviorView").field(&self.subject).finish()
    }
}

impl<T: Clone + Send + 'static> Observable<T> for BehaviorView<T> {
    fn observe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subject.subscribe(listener)
    }
}

impl<T: Clone + Send + 'static> From<&BehaviorSubject<T>> for BehaviorView<T> {
    fn from(subject: &BehaviorSubject<T>) -> Self {
        Self {
            subject: subject.clone(),
        }
    }
}
