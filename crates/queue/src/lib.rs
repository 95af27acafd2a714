//! # In-process Task Queue
//!
//! A bounded-concurrency work queue: tasks are handed to a single worker
//! function with at most `concurrency` of them in flight at once.
//!
//! ## Features
//!
//! - **FIFO dispatch**: `push` appends, `unshift` jumps ahead of everything pending
//! - **Node reuse**: task nodes are recycled through a free list instead of allocated per task
//! - **Flow control**: pause/resume, kill/kill-and-drain/abort of pending work, live concurrency changes
//! - **Lifecycle hooks**: drain, empty, saturated and error
//! - **Async adaptor**: `async` workers on tokio with a future per task
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        AsyncQueue                            │
//! │  (spawns worker futures, settles a Deferred per task)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Queue                               │
//! │  (pending list, running count, hooks, Done trampoline)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        NodePool                              │
//! │  (index arena with an intrusive free list)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use everruns_queue::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let queue: AsyncQueue<String, usize> =
//!     AsyncQueue::new(|line: String| async move { Ok(line.len()) }, 2)?;
//!
//! queue.error(|err, line| tracing::warn!(%line, error = %err, "line failed"));
//!
//! assert_eq!(queue.push("hello".to_string()).await?, 5);
//! queue.drained().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod promise;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::engine::{Done, Queue, QueueStatus};
    pub use crate::error::{QueueError, TaskError};
    pub use crate::promise::{AsyncQueue, Deferred};
}

// Re-export key types at crate root
pub use config::QueueConfig;
pub use engine::{Callback, Done, ErrorHook, Hook, Queue, QueueStatus};
pub use error::{QueueError, TaskError};
pub use pool::{NodeKey, NodePool, PoolError};
pub use promise::{AsyncQueue, Deferred};
