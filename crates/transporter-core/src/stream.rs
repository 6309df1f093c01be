//! Stream helpers.
//!
//! Every Transporter operation returns a [`RecordStream`]: it does no work
//! until polled, each poll-loop is an independent subscription, and
//! dropping it cancels whatever the producer was doing. A stream yields zero
//! or more values and then either ends or yields exactly one error.

use std::future::Future;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{Result, TransportError};

/// A lazy, cancellable stream of results.
pub type RecordStream<T> = BoxStream<'static, Result<T>>;

/// A stream that fails every subscriber with `error`.
pub fn fail<T: Send + 'static>(error: TransportError) -> RecordStream<T> {
    stream::once(future::ready(Err(error))).boxed()
}

/// A stream that fails with `NotImplemented` for `operation`.
pub fn not_implemented<T: Send + 'static>(operation: &str) -> RecordStream<T> {
    fail(TransportError::not_implemented(operation.to_string()))
}

/// A stream producing the outcome of one future, started on first poll.
pub fn single<T, F>(work: F) -> RecordStream<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    stream::once(work).boxed()
}

/// End the stream right after its first error.
///
/// Anything the producer would have emitted after a failure is dropped, so
/// a consumer sees the error exactly once.
pub fn until_first_error<T: Send + 'static>(inner: RecordStream<T>) -> RecordStream<T> {
    inner
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}

/// Take the first value of a stream, if any.
pub async fn first<T: Send + 'static>(mut inner: RecordStream<T>) -> Result<Option<T>> {
    inner.try_next().await
}
