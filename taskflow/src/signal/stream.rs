//! Async stream adapter for subjects.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::Subscription;

/// Values delivered to a subject, consumed as a [`Stream`].
///
/// Values are buffered without bound. The stream ends once every handle to the
/// source is dropped; dropping the stream unsubscribes from the source.
#[derive(Debug)]
pub struct SignalStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _subscription: Subscription,
}

impl<T> SignalStream<T> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<T>, subscription: Subscription) -> Self {
        Self {
            rx,
            _subscription: subscription,
        }
    }
}

impl<T> Stream for SignalStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use crate::signal::{BehaviorSubject, Subject};
    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_stream_yields_future_values() {
        let subject = Subject::<u32>::new();
        let mut stream = task::spawn(subject.stream());

        assert_pending!(stream.poll_next());

        subject.next(7);
        assert!(stream.is_woken());
        assert_ready_eq!(stream.poll_next(), Some(7));
    }

    #[test]
    fn test_stream_ends_when_source_dropped() {
        let subject = Subject::<u32>::new();
        let mut stream = task::spawn(subject.stream());

        subject.next(1);
        drop(subject);

        assert_ready_eq!(stream.poll_next(), Some(1));
        assert_ready_eq!(stream.poll_next(), None);
    }

    #[test]
    fn test_dropping_stream_unsubscribes() {
        let subject = Subject::<u32>::new();
        let stream = subject.stream();
        assert_eq!(subject.listener_count(), 1);

        drop(stream);
        assert_eq!(subject.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_behavior_stream_starts_with_current() {
        let subject = BehaviorSubject::new("idle");
        let mut stream = subject.stream();
        subject.next("busy");

        assert_eq!(stream.next().await, Some("idle"));
        assert_eq!(stream.next().await, Some("busy"));
    }
}
