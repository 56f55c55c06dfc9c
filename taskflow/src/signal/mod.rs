//! Notification primitives.
//!
//! This module provides:
//! - [`Subject`] for plain multicast notifications
//! - [`BehaviorSubject`] for notifications with a current value
//! - [`Subscription`] and [`SubscriptionSet`] for listener lifetimes
//! - [`SubjectView`] and [`BehaviorView`] for handing out subscribe-only access
//! - [`SignalStream`] for consuming any of them as an async stream

mod dispatcher;
mod stream;
mod subject;
mod subscription;
mod view;

pub(crate) use dispatcher::Dispatcher;
pub use stream::SignalStream;
pub(crate) use subject::replay;
pub use subject::{BehaviorSubject, Subject};
pub use subscription::{Subscription, SubscriptionSet};
pub use view::{BehaviorView, SubjectView};

/// Anything that can deliver values of type `T` to listeners.
///
/// This is the seam task pipelines and selectors are consumed through.
pub trait Observable<T> {
    /// Registers a listener until the returned subscription is dropped.
    fn observe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription;
}

impl<T: Send + 'static> Observable<T> for Subject<T> {
    fn observe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subscribe(listener)
    }
}

impl<T: Clone + Send + 'static> Observable<T> for BehaviorSubject<T> {
    fn observe(&self, listener: Box<dyn Fn(&T) + Send + Sync>) -> Subscription {
        self.subscribe(listener)
    }
}
