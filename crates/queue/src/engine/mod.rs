//! Callback-based queue engine
//!
//! The engine owns the concurrency bookkeeping:
//! - `queue`: the [`Queue`] handle and its dispatch loop
//! - `done`: the [`Done`] completion handle handed to workers
//! - `hooks`: drain/empty/saturated/error hook types
//! - `pending`: the intrusive FIFO of tasks waiting for a slot
//!
//! Workers may complete synchronously, from another thread, or from a spawned
//! task. Either way the task's callback runs, and the next pending task is
//! dispatched, before [`Done::complete`] returns.

mod done;
mod hooks;
mod pending;
mod queue;

pub use done::Done;
pub use hooks::{ErrorHook, Hook};
pub use queue::{Callback, Queue, QueueStatus};
