//! Completion handle handed to workers

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::TaskError;
use crate::pool::NodeKey;

/// The engine side of a completion: settles the node's task and frees its slot.
pub(crate) trait Complete<R, E>: Send + Sync {
    fn complete(self: Arc<Self>, key: NodeKey, result: Result<R, TaskError<E>>);
}

/// Completion handle for one in-flight task.
///
/// Every dispatched task gets exactly one `Done`. Consuming it with
/// [`Done::complete`] (or [`Done::ok`] / [`Done::err`]) reports the result to
/// the task's callback and lets the queue start the next pending task, all
/// before `complete` returns.
///
/// Ownership makes a second completion impossible. A handle that is dropped
/// without being completed, for instance because the worker panicked,
/// completes its task with [`TaskError::Abandoned`] so the slot is not lost.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use everruns_queue::{Done, Queue};
///
/// let queue = Queue::new(
///     |value: u32, done: Done<u32, Infallible>| done.ok(value * 2),
///     1,
/// )
/// .unwrap();
///
/// queue.push(21, |_, result| assert_eq!(result.unwrap(), 42));
/// ```
pub struct Done<R, E> {
    owner: Option<Arc<dyn Complete<R, E>>>,
    key: NodeKey,
}

impl<R, E> Done<R, E> {
    pub(crate) fn new(owner: Arc<dyn Complete<R, E>>, key: NodeKey) -> Self {
        Self {
            owner: Some(owner),
            key,
        }
    }

    /// Report the task's outcome
    pub fn complete(mut self, result: Result<R, E>) {
        if let Some(owner) = self.owner.take() {
            owner.complete(self.key, result.map_err(TaskError::Worker));
        }
    }

    /// Report success
    pub fn ok(self, result: R) {
        self.complete(Ok(result))
    }

    /// Report failure
    pub fn err(self, error: E) {
        self.complete(Err(error))
    }
}

impl<R, E> Drop for Done<R, E> {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            warn!(key = %self.key, "Completion handle dropped without completing its task");
            owner.complete(self.key, Err(TaskError::Abandoned));
        }
    }
}

impl<R, E> fmt::Debug for Done<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("key", &self.key)
            .field("completed", &self.owner.is_none())
            .finish()
    }
}
