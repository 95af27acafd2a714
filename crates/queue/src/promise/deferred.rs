use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TaskError;

pub(crate) type Settle<R, E> = oneshot::Sender<Result<R, TaskError<E>>>;

/// Pending result of a task queued on an [`AsyncQueue`](super::AsyncQueue).
///
/// Resolves once the task settles. A task discarded before it ran, by `kill`,
/// `kill_and_drain` or `abort`, resolves to [`TaskError::Aborted`].
///
/// Dropping a `Deferred` does not cancel its task; the outcome is simply
/// discarded.
#[must_use = "a Deferred does nothing unless awaited, but dropping it does not cancel the task"]
pub struct Deferred<R, E> {
    rx: oneshot::Receiver<Result<R, TaskError<E>>>,
}

impl<R, E> Deferred<R, E> {
    pub(crate) fn channel() -> (Settle<R, E>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<R, E> Future for Deferred<R, E> {
    type Output = Result<R, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A closed channel means the task's callback was dropped unrun.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or_else(|_| Err(TaskError::Aborted)))
    }
}

impl<R, E> fmt::Debug for Deferred<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_resolves_with_sent_result() {
        let (tx, deferred) = Deferred::<u32, String>::channel();
        let mut deferred = task::spawn(deferred);

        assert_pending!(deferred.poll());
        tx.send(Ok(7)).unwrap();

        assert!(deferred.is_woken());
        assert_eq!(assert_ready!(deferred.poll()).unwrap(), 7);
    }

    #[test]
    fn test_dropped_sender_aborts() {
        let (tx, deferred) = Deferred::<u32, String>::channel();
        let mut deferred = task::spawn(deferred);

        assert_pending!(deferred.poll());
        drop(tx);

        let err = assert_ready!(deferred.poll()).unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "queue aborted");
    }
}
