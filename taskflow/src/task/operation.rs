//! Operations wrapped by a task.
//!
//! Internally every operation is a function from parameters to a stream of
//! outcomes. Future-returning functions and [`Operation`] implementors are
//! adapted into one-item streams.

use async_trait::async_trait;
use futures::future::Future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::sync::Arc;

/// A type-erased operation producing a stream of outcomes.
pub type BoxedOperation<P, R, E> = Arc<dyn Fn(P) -> BoxStream<'static, Result<R, E>> + Send + Sync>;

/// A unit of work a task can wrap.
///
/// Implement this for operations that carry their own state, such as an API
/// client. Closures can be passed to
/// [`TaskBuilder::build`](super::TaskBuilder::build) directly instead.
#[async_trait]
pub trait Operation<P: Send + 'static>: Send + Sync + 'static {
    /// Successful result type.
    type Output: Send + 'static;
    /// Failure type.
    type Error: Send + 'static;

    /// Runs the operation once.
    async fn call(&self, params: P) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<P, O> Operation<P> for Arc<O>
where
    P: Send + 'static,
    O: Operation<P>,
{
    type Output = O::Output;
    type Error = O::Error;

    async fn call(&self, params: P) -> Result<Self::Output, Self::Error> {
        self.as_ref().call(params).await
    }
}

pub(crate) fn from_future<P, R, E, F, Fut>(operation: F) -> BoxedOperation<P, R, E>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Arc::new(move |params| stream::once(operation(params)).boxed())
}

pub(crate) fn from_stream<P, R, E, F, S>(operation: F) -> BoxedOperation<P, R, E>
where
    F: Fn(P) -> S + Send + Sync + 'static,
    S: Stream<Item = Result<R, E>> + Send + 'static,
{
    Arc::new(move |params| operation(params).boxed())
}

pub(crate) fn from_operation<P, O>(operation: O) -> BoxedOperation<P, O::Output, O::Error>
where
    P: Send + 'static,
    O: Operation<P>,
{
    let operation = Arc::new(operation);
    Arc::new(move |params| {
        let operation = Arc::clone(&operation);
        stream::once(async move { operation.call(params).await }).boxed()
    })
}
