//! Callback-flavored queue engine
//!
//! Dispatches tasks to a worker with bounded concurrency, FIFO order and a
//! head-of-queue escape hatch (`unshift`).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, trace};

use super::done::{Complete, Done};
use super::hooks::{fire, DrainListener, ErrorHook, Hook, Hooks};
use super::pending::PendingList;
use crate::config::QueueConfig;
use crate::error::{QueueError, TaskError};
use crate::pool::{NodeKey, NodePool};

/// Completion callback: receives the queue context and the task's outcome
pub type Callback<R, E, C = ()> = Box<dyn FnOnce(&C, Result<R, TaskError<E>>) + Send>;

type WorkerFn<T, R, E, C> = Arc<dyn Fn(&C, T, Done<R, E>) + Send + Sync>;

/// A recyclable task node. Both fields are empty while the node sits on the
/// free list.
struct Task<T, R, E, C> {
    value: Option<T>,
    callback: Option<Callback<R, E, C>>,
}

impl<T, R, E, C> Task<T, R, E, C> {
    fn is_vacant(&self) -> bool {
        self.value.is_none() && self.callback.is_none()
    }
}

impl<T, R, E, C> Default for Task<T, R, E, C> {
    fn default() -> Self {
        Self {
            value: None,
            callback: None,
        }
    }
}

struct State<T, R, E, C> {
    nodes: NodePool<Task<T, R, E, C>>,
    pending: PendingList,
    running: usize,
    concurrency: usize,
    paused: bool,
    hooks: Hooks<T, E>,
    drain_listeners: Vec<DrainListener>,
    /// Dispatches handed off by completions that happened inside a dispatch
    /// loop. Already counted in `running`.
    handoff: VecDeque<Dispatch<T>>,
    /// Threads currently running a dispatch loop for this queue
    dispatchers: Vec<ThreadId>,
}

impl<T: Clone, R, E, C> State<T, R, E, C> {
    fn is_idle(&self) -> bool {
        self.running == 0 && self.pending.is_empty()
    }

    /// Detach the next pending task along with a copy of its payload for the
    /// worker. The node keeps its own copy until completion.
    fn pop_pending(&mut self) -> Option<(NodeKey, T)> {
        while let Some(key) = self.pending.pop_front(&mut self.nodes) {
            match self.nodes.node(key).and_then(|task| task.value.clone()) {
                Some(value) => return Some((key, value)),
                None => {
                    error!(%key, "Pending task node has no payload, dropping it");
                    if let Err(e) = self.nodes.release(key) {
                        error!(%key, error = %e, "Task node release failed");
                    }
                }
            }
        }
        None
    }

    fn empty_hook(&self) -> Option<Hook> {
        if self.pending.is_empty() {
            self.hooks.empty.clone()
        } else {
            None
        }
    }

    fn saturated_hook(&self) -> Option<Hook> {
        if self.running == self.concurrency {
            self.hooks.saturated.clone()
        } else {
            None
        }
    }

    fn add_drain_listener(&mut self, listener: DrainListener) {
        self.drain_listeners.retain(|existing| !existing.is_abandoned());
        self.drain_listeners.push(listener);
    }
}

/// A task that has just been given a slot, ready to hand to the worker once
/// the state lock is released.
struct Dispatch<T> {
    key: NodeKey,
    value: T,
    empty: Option<Hook>,
    saturated: Option<Hook>,
}

struct Shared<T, R, E, C> {
    name: String,
    context: C,
    worker: WorkerFn<T, R, E, C>,
    state: Mutex<State<T, R, E, C>>,
}

/// Deregisters the current thread's dispatch loop, also on unwind.
struct LoopGuard<'a, T, R, E, C> {
    shared: &'a Shared<T, R, E, C>,
    thread: ThreadId,
}

impl<T, R, E, C> Drop for LoopGuard<'_, T, R, E, C> {
    fn drop(&mut self) {
        let thread = self.thread;
        self.shared
            .state
            .lock()
            .dispatchers
            .retain(|id| *id != thread);
    }
}

impl<T, R, E, C> Shared<T, R, E, C>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    C: Send + Sync + 'static,
{
    fn enqueue(self: &Arc<Self>, value: T, callback: Callback<R, E, C>, at_front: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let has_slot = !state.paused && state.running < state.concurrency;

        let (key, task) = state.nodes.get();
        debug_assert!(task.is_vacant(), "recycled {key} still holds a task");
        task.callback = Some(callback);

        if !has_slot {
            task.value = Some(value);
            if at_front {
                state.pending.push_front(&mut state.nodes, key);
            } else {
                state.pending.push_back(&mut state.nodes, key);
            }
            trace!(queue = %self.name, %key, pending = state.pending.len(), "Task queued");
            return;
        }

        task.value = Some(value.clone());
        state.running += 1;

        let dispatch = Dispatch {
            key,
            value,
            empty: None,
            saturated: state.saturated_hook(),
        };
        self.schedule(guard, dispatch);
    }

    /// Run `dispatch` now, or queue it for the dispatch loop already running
    /// further up this thread's stack. Synchronous workers therefore chain
    /// through the pending list iteratively instead of recursing.
    fn schedule(
        self: &Arc<Self>,
        mut guard: MutexGuard<'_, State<T, R, E, C>>,
        dispatch: Dispatch<T>,
    ) {
        let thread = thread::current().id();
        if guard.dispatchers.contains(&thread) {
            guard.handoff.push_back(dispatch);
            return;
        }
        guard.dispatchers.push(thread);
        drop(guard);

        let _registration = LoopGuard {
            shared: self,
            thread,
        };

        let mut next = dispatch;
        loop {
            self.run(next);
            match self.state.lock().handoff.pop_front() {
                Some(dispatch) => next = dispatch,
                None => break,
            }
        }
    }

    fn run(self: &Arc<Self>, dispatch: Dispatch<T>) {
        trace!(queue = %self.name, key = %dispatch.key, "Dispatching task");

        fire(dispatch.empty);
        fire(dispatch.saturated);

        let owner: Arc<dyn Complete<R, E>> = Arc::clone(self) as Arc<dyn Complete<R, E>>;
        (self.worker)(
            &self.context,
            dispatch.value,
            Done::new(owner, dispatch.key),
        );
    }

    /// The completion trampoline body: settle the task, then release its node.
    fn finish(self: &Arc<Self>, key: NodeKey, result: Result<R, TaskError<E>>) {
        let (value, callback, on_error) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(task) = state.nodes.node_mut(key) else {
                error!(queue = %self.name, %key, "Completion for a task that is not in flight");
                return;
            };
            (task.value.take(), task.callback.take(), state.hooks.error.clone())
        };

        trace!(queue = %self.name, %key, ok = result.is_ok(), "Task completed");

        if let (Err(err), Some(on_error), Some(value)) = (&result, &on_error, &value) {
            on_error(err, value);
        }
        drop(value);

        if let Some(callback) = callback {
            callback(&self.context, result);
        }

        self.release(key);
    }

    /// Return a finished node to the free list and hand its slot to the next
    /// pending task, or give the slot back.
    fn release(self: &Arc<Self>, key: NodeKey) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Err(e) = state.nodes.release(key) {
            error!(queue = %self.name, error = %e, "Task node release failed");
        }

        if !state.paused && state.running <= state.concurrency {
            if let Some((key, value)) = state.pop_pending() {
                let dispatch = Dispatch {
                    key,
                    value,
                    empty: state.empty_hook(),
                    saturated: None,
                };
                self.schedule(guard, dispatch);
                return;
            }
        }

        state.running -= 1;
        if !state.is_idle() {
            return;
        }

        let drain = state.hooks.drain.clone();
        let listeners = std::mem::take(&mut state.drain_listeners);
        drop(guard);

        trace!(queue = %self.name, "Queue drained");
        fire(drain);
        notify(listeners);
    }

    /// Dispatch pending tasks into every free slot
    fn fill_slots(self: &Arc<Self>) {
        loop {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.paused || state.running >= state.concurrency {
                return;
            }
            let Some((key, value)) = state.pop_pending() else {
                return;
            };
            state.running += 1;

            let dispatch = Dispatch {
                key,
                value,
                empty: state.empty_hook(),
                saturated: state.saturated_hook(),
            };
            self.schedule(guard, dispatch);
        }
    }

    /// Detach every pending task and recycle its node
    fn discard(&self) -> Vec<Task<T, R, E, C>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let keys = state.pending.drain(&mut state.nodes);
        keys.into_iter()
            .filter_map(|key| {
                let task = state.nodes.node_mut(key).map(std::mem::take);
                if let Err(e) = state.nodes.release(key) {
                    error!(queue = %self.name, error = %e, "Task node release failed");
                }
                task
            })
            .collect()
    }

    /// Wake drain listeners if discarding work left nothing in flight
    fn notify_if_idle(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if !state.is_idle() {
                return;
            }
            std::mem::take(&mut state.drain_listeners)
        };
        notify(listeners);
    }
}

fn notify(listeners: Vec<DrainListener>) {
    for listener in listeners {
        listener.notify();
    }
}

impl<T, R, E, C> Complete<R, E> for Shared<T, R, E, C>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    C: Send + Sync + 'static,
{
    fn complete(self: Arc<Self>, key: NodeKey, result: Result<R, TaskError<E>>) {
        self.finish(key, result);
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queue name
    pub name: String,
    /// Concurrency limit
    pub concurrency: usize,
    /// Tasks in flight
    pub running: usize,
    /// Tasks waiting for a slot
    pub pending: usize,
    /// Whether dispatch is paused
    pub paused: bool,
    /// Task nodes allocated so far
    pub allocated_nodes: usize,
    /// Task nodes waiting on the free list
    pub free_nodes: usize,
}

impl QueueStatus {
    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.running == 0 && self.pending == 0
    }

    /// Every slot is occupied
    pub fn is_saturated(&self) -> bool {
        self.running >= self.concurrency
    }
}

/// Bounded-concurrency task queue with callback completion.
///
/// `Queue` is a cheap handle; clones share the same queue. The worker is
/// called with the queue context, the task payload and a [`Done`] handle, and
/// may complete synchronously or hand `Done` to anything that finishes later.
///
/// Bookkeeping happens under a lock that is never held while the worker, a
/// callback or a hook runs, so all of them may call back into the queue.
///
/// # Example
///
/// ```
/// use std::convert::Infallible;
/// use std::sync::{Arc, Mutex};
/// use everruns_queue::{Done, Queue};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let queue = Queue::new(
///     |value: u32, done: Done<u32, Infallible>| done.ok(value + 1),
///     2,
/// )
/// .unwrap();
///
/// for value in 0..3 {
///     let seen = Arc::clone(&seen);
///     queue.push(value, move |_, result| seen.lock().unwrap().push(result.unwrap()));
/// }
///
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
/// assert!(queue.idle());
/// ```
pub struct Queue<T, R, E, C = ()> {
    shared: Arc<Shared<T, R, E, C>>,
}

impl<T, R, E> Queue<T, R, E, ()>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Create a queue without a context
    pub fn new<F>(worker: F, concurrency: usize) -> Result<Self, QueueError>
    where
        F: Fn(T, Done<R, E>) + Send + Sync + 'static,
    {
        Self::with_context((), move |_: &(), value, done| worker(value, done), concurrency)
    }
}

impl<T, R, E, C> Queue<T, R, E, C>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    C: Send + Sync + 'static,
{
    /// Create a queue whose worker and callbacks all receive `context`
    pub fn with_context<F>(context: C, worker: F, concurrency: usize) -> Result<Self, QueueError>
    where
        F: Fn(&C, T, Done<R, E>) + Send + Sync + 'static,
    {
        Self::with_config(context, worker, QueueConfig::new(concurrency))
    }

    /// Create a queue from a full configuration
    pub fn with_config<F>(context: C, worker: F, config: QueueConfig) -> Result<Self, QueueError>
    where
        F: Fn(&C, T, Done<R, E>) + Send + Sync + 'static,
    {
        config.validate()?;

        debug!(
            queue = %config.name,
            concurrency = config.concurrency,
            preallocate = config.preallocate,
            "Creating queue"
        );

        let state = State {
            nodes: NodePool::with_capacity(config.preallocate),
            pending: PendingList::default(),
            running: 0,
            concurrency: config.concurrency,
            paused: false,
            hooks: Hooks::default(),
            drain_listeners: Vec::new(),
            handoff: VecDeque::new(),
            dispatchers: Vec::new(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name,
                context,
                worker: Arc::new(worker),
                state: Mutex::new(state),
            }),
        })
    }

    /// Queue a task at the tail, or start it right away if a slot is free.
    ///
    /// `callback` is called exactly once with the task's outcome, unless the
    /// task is discarded by [`kill`](Self::kill) or
    /// [`kill_and_drain`](Self::kill_and_drain) before it starts.
    pub fn push<F>(&self, value: T, callback: F)
    where
        F: FnOnce(&C, Result<R, TaskError<E>>) + Send + 'static,
    {
        self.shared.enqueue(value, Box::new(callback), false);
    }

    /// Queue a task at the head, ahead of everything already pending, or start
    /// it right away if a slot is free.
    pub fn unshift<F>(&self, value: T, callback: F)
    where
        F: FnOnce(&C, Result<R, TaskError<E>>) + Send + 'static,
    {
        self.shared.enqueue(value, Box::new(callback), true);
    }

    /// Stop starting pending tasks. Tasks already in flight keep running.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        debug!(queue = %self.shared.name, "Queue paused");
    }

    /// Start pending tasks again, filling every free slot. No-op unless paused.
    pub fn resume(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
        }

        debug!(queue = %self.shared.name, "Queue resumed");
        self.shared.fill_slots();
    }

    /// Whether the queue is paused
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Nothing pending and nothing in flight
    pub fn idle(&self) -> bool {
        self.shared.state.lock().is_idle()
    }

    /// Number of pending tasks, not counting those in flight
    pub fn length(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of tasks in flight
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Payloads of the pending tasks, in the order they will start
    pub fn get_queue(&self) -> Vec<T> {
        let state = self.shared.state.lock();
        state
            .pending
            .keys(&state.nodes)
            .filter_map(|key| state.nodes.node(key).and_then(|task| task.value.clone()))
            .collect()
    }

    /// Current concurrency limit
    pub fn concurrency(&self) -> usize {
        self.shared.state.lock().concurrency
    }

    /// Change the concurrency limit.
    ///
    /// Raising it starts pending tasks in the new slots straight away unless
    /// the queue is paused. Lowering it never interrupts tasks in flight.
    pub fn set_concurrency(&self, concurrency: usize) -> Result<(), QueueError> {
        if concurrency == 0 {
            return Err(QueueError::InvalidConcurrency(concurrency));
        }

        self.shared.state.lock().concurrency = concurrency;
        debug!(queue = %self.shared.name, concurrency, "Concurrency changed");

        self.shared.fill_slots();
        Ok(())
    }

    /// Discard every pending task without calling its callback.
    ///
    /// Tasks in flight are unaffected and still drain the queue normally when
    /// they finish. If nothing is in flight, drain listeners are woken since
    /// the queue is now idle; the `drain` hook is not run. Returns the number
    /// of discarded tasks.
    #[instrument(skip(self), fields(queue = %self.shared.name))]
    pub fn kill(&self) -> usize {
        let count = self.discard_silently();
        self.shared.notify_if_idle();
        count
    }

    /// Discard every pending task, then run the `drain` hook and wake drain
    /// listeners straight away even if tasks are still in flight.
    #[instrument(skip(self), fields(queue = %self.shared.name))]
    pub fn kill_and_drain(&self) -> usize {
        let count = self.discard_silently();

        let (drain, listeners) = {
            let mut state = self.shared.state.lock();
            (
                state.hooks.drain.clone(),
                std::mem::take(&mut state.drain_listeners),
            )
        };
        fire(drain);
        notify(listeners);

        count
    }

    fn discard_silently(&self) -> usize {
        let discarded = self.shared.discard();
        let count = discarded.len();
        drop(discarded);

        debug!(discarded = count, "Killed pending tasks");
        count
    }

    /// Discard every pending task, completing each with
    /// [`TaskError::Aborted`].
    ///
    /// The `error` hook sees every aborted task too. Returns the number of
    /// discarded tasks.
    #[instrument(skip(self), fields(queue = %self.shared.name))]
    pub fn abort(&self) -> usize {
        let discarded = self.shared.discard();
        let count = discarded.len();
        let on_error = self.shared.state.lock().hooks.error.clone();

        for task in discarded {
            if let (Some(on_error), Some(value)) = (&on_error, &task.value) {
                on_error(&TaskError::Aborted, value);
            }
            if let Some(callback) = task.callback {
                callback(&self.shared.context, Err(TaskError::Aborted));
            }
        }

        debug!(discarded = count, "Aborted pending tasks");
        self.shared.notify_if_idle();
        count
    }

    /// Run `listener` once the queue is idle: right away if it already is,
    /// otherwise right after the next drain (and after the `drain` hook).
    pub fn when_drained<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if !state.is_idle() {
                state.add_drain_listener(DrainListener::Callback(Box::new(listener)));
                return;
            }
        }
        listener();
    }

    /// Channel flavor of [`when_drained`](Self::when_drained). Waiters whose
    /// receiver was dropped are pruned as new ones register.
    pub(crate) fn drain_waiter(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.state.lock();
        if state.is_idle() {
            let _ = tx.send(());
        } else {
            state.add_drain_listener(DrainListener::Waiter(tx));
        }
        rx
    }

    /// Set the hook run when the last task in flight finishes with nothing
    /// pending
    pub fn on_drain<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.state.lock().hooks.drain = Some(Arc::new(hook));
    }

    /// Set the hook run when the last pending task is handed a slot
    pub fn on_empty<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.state.lock().hooks.empty = Some(Arc::new(hook));
    }

    /// Set the hook run when a dispatch takes the last free slot
    pub fn on_saturated<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.state.lock().hooks.saturated = Some(Arc::new(hook));
    }

    /// Set the hook run with every task error and the payload it failed on
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&TaskError<E>, &T) + Send + Sync + 'static,
    {
        let hook: ErrorHook<T, E> = Arc::new(hook);
        self.shared.state.lock().hooks.error = Some(hook);
    }

    /// Remove every hook
    pub fn clear_hooks(&self) {
        self.shared.state.lock().hooks = Hooks::default();
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The context passed to the worker and every callback
    pub fn context(&self) -> &C {
        &self.shared.context
    }

    /// Snapshot of the queue's counters
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        QueueStatus {
            name: self.shared.name.clone(),
            concurrency: state.concurrency,
            running: state.running,
            pending: state.pending.len(),
            paused: state.paused,
            allocated_nodes: state.nodes.allocated(),
            free_nodes: state.nodes.available(),
        }
    }
}

impl<T, R, E, C> Clone for Queue<T, R, E, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R, E, C> fmt::Debug for Queue<T, R, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Queue")
            .field("name", &self.shared.name)
            .field("concurrency", &state.concurrency)
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .field("paused", &state.paused)
            .field("hooks", &state.hooks)
            .finish()
    }
}
