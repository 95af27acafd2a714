//! Future-based adaptor over the callback engine
//!
//! [`AsyncQueue`] drives `async` workers on tokio and hands back a
//! [`Deferred`] per task instead of taking a callback. Everything else,
//! ordering, concurrency and hooks, is the engine's.

mod deferred;

use std::fmt;
use std::future::Future;

use tokio::runtime::Handle;

use crate::config::QueueConfig;
use crate::engine::{Done, Queue, QueueStatus};
use crate::error::{QueueError, TaskError};

pub use deferred::Deferred;

/// Bounded-concurrency queue for `async` workers.
///
/// Each worker future is spawned on the tokio runtime that was current when
/// the queue was built. A worker that returns `Err` settles only its own
/// task; the queue moves on to the next one.
///
/// # Example
///
/// ```
/// use everruns_queue::AsyncQueue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue: AsyncQueue<u32, u32> = AsyncQueue::new(|n: u32| async move { Ok(n * n) }, 4).unwrap();
///
/// let squares = futures::future::join_all((1..=3).map(|n| queue.push(n))).await;
/// let squares: Vec<u32> = squares.into_iter().map(Result::unwrap).collect();
/// assert_eq!(squares, vec![1, 4, 9]);
///
/// queue.drained().await;
/// assert!(queue.idle());
/// # }
/// ```
pub struct AsyncQueue<T, R, E = anyhow::Error, C = ()> {
    queue: Queue<T, R, E, C>,
}

impl<T, R, E> AsyncQueue<T, R, E, ()>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Create an async queue without a context
    pub fn new<F, Fut>(worker: F, concurrency: usize) -> Result<Self, QueueError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_context((), move |_: &(), value| worker(value), concurrency)
    }
}

impl<T, R, E, C> AsyncQueue<T, R, E, C>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Create an async queue whose worker receives `context`
    pub fn with_context<F, Fut>(context: C, worker: F, concurrency: usize) -> Result<Self, QueueError>
    where
        F: Fn(&C, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_config(context, worker, QueueConfig::new(concurrency))
    }

    /// Create an async queue from a full configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_config<F, Fut>(context: C, worker: F, config: QueueConfig) -> Result<Self, QueueError>
    where
        F: Fn(&C, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let queue = Queue::with_config(
            context,
            move |ctx: &C, value: T, done: Done<R, E>| {
                let task = worker(ctx, value);
                // If the runtime drops the task unfinished, `done` abandons it.
                runtime.spawn(async move { done.complete(task.await) });
            },
            config,
        )?;

        Ok(Self { queue })
    }

    /// Queue a task at the tail
    pub fn push(&self, value: T) -> Deferred<R, E> {
        let (settle, deferred) = Deferred::channel();
        self.queue.push(value, move |_, result| {
            // Nobody is waiting if the Deferred was dropped.
            let _ = settle.send(result);
        });
        deferred
    }

    /// Queue a task at the head, ahead of everything already pending
    pub fn unshift(&self, value: T) -> Deferred<R, E> {
        let (settle, deferred) = Deferred::channel();
        self.queue.unshift(value, move |_, result| {
            let _ = settle.send(result);
        });
        deferred
    }

    /// Resolves once nothing is pending or in flight.
    ///
    /// The idle check happens one scheduler turn after the future is first
    /// polled, so tasks pushed right after calling `drained` are waited for.
    /// When the queue drains, the `drain` hook runs before this resolves.
    pub fn drained(&self) -> impl Future<Output = ()> + Send + 'static {
        let queue = self.queue.clone();
        async move {
            tokio::task::yield_now().await;
            // An error means the queue itself is gone, which is idle enough.
            let _ = queue.drain_waiter().await;
        }
    }

    /// Discard every pending task. Their deferreds resolve to
    /// [`TaskError::Aborted`]; tasks in flight settle normally. Wakes
    /// [`drained`](Self::drained) if nothing is left in flight.
    pub fn kill(&self) -> usize {
        self.queue.kill()
    }

    /// [`kill`](Self::kill), then run the `drain` hook and wake
    /// [`drained`](Self::drained) straight away
    pub fn kill_and_drain(&self) -> usize {
        self.queue.kill_and_drain()
    }

    /// Discard every pending task, reporting each to the `error` hook
    pub fn abort(&self) -> usize {
        self.queue.abort()
    }

    /// Register a handler for every task error, along with the task's payload
    pub fn error<F>(&self, handler: F)
    where
        F: Fn(&TaskError<E>, &T) + Send + Sync + 'static,
    {
        self.queue.on_error(handler);
    }

    /// See [`Queue::on_drain`]
    pub fn on_drain<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.queue.on_drain(hook);
    }

    /// See [`Queue::on_empty`]
    pub fn on_empty<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.queue.on_empty(hook);
    }

    /// See [`Queue::on_saturated`]
    pub fn on_saturated<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.queue.on_saturated(hook);
    }

    /// See [`Queue::clear_hooks`]
    pub fn clear_hooks(&self) {
        self.queue.clear_hooks();
    }

    /// See [`Queue::pause`]
    pub fn pause(&self) {
        self.queue.pause();
    }

    /// See [`Queue::resume`]
    pub fn resume(&self) {
        self.queue.resume();
    }

    /// See [`Queue::is_paused`]
    pub fn is_paused(&self) -> bool {
        self.queue.is_paused()
    }

    /// See [`Queue::idle`]
    pub fn idle(&self) -> bool {
        self.queue.idle()
    }

    /// See [`Queue::length`]
    pub fn length(&self) -> usize {
        self.queue.length()
    }

    /// See [`Queue::running`]
    pub fn running(&self) -> usize {
        self.queue.running()
    }

    /// See [`Queue::get_queue`]
    pub fn get_queue(&self) -> Vec<T> {
        self.queue.get_queue()
    }

    /// See [`Queue::concurrency`]
    pub fn concurrency(&self) -> usize {
        self.queue.concurrency()
    }

    /// See [`Queue::set_concurrency`]
    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), QueueError> {
        self.queue.set_concurrency(concurrency)
    }

    /// See [`Queue::status`]
    pub fn status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// The underlying callback engine
    pub fn inner(&self) -> &Queue<T, R, E, C> {
        &self.queue
    }
}

impl<T, R, E, C> Clone for AsyncQueue<T, R, E, C> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T, R, E, C> fmt::Debug for AsyncQueue<T, R, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncQueue").field(&self.queue).finish()
    }
}
