//! Lifecycle hooks

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::TaskError;

/// Zero-argument lifecycle hook (`drain`, `empty`, `saturated`)
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Hook invoked with a task's error and its payload
pub type ErrorHook<T, E> = Arc<dyn Fn(&TaskError<E>, &T) + Send + Sync>;

/// One-shot listener run after the next drain
pub(crate) enum DrainListener {
    Callback(Box<dyn FnOnce() + Send>),
    Waiter(oneshot::Sender<()>),
}

impl DrainListener {
    /// A waiter whose receiver is gone has nobody left to notify
    pub(crate) fn is_abandoned(&self) -> bool {
        match self {
            Self::Callback(_) => false,
            Self::Waiter(tx) => tx.is_closed(),
        }
    }

    pub(crate) fn notify(self) {
        match self {
            Self::Callback(listener) => listener(),
            Self::Waiter(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// Hooks installed on a queue. Unset hooks are no-ops.
pub(crate) struct Hooks<T, E> {
    pub(crate) drain: Option<Hook>,
    pub(crate) empty: Option<Hook>,
    pub(crate) saturated: Option<Hook>,
    pub(crate) error: Option<ErrorHook<T, E>>,
}

impl<T, E> Default for Hooks<T, E> {
    fn default() -> Self {
        Self {
            drain: None,
            empty: None,
            saturated: None,
            error: None,
        }
    }
}

impl<T, E> fmt::Debug for Hooks<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("drain", &self.drain.is_some())
            .field("empty", &self.empty.is_some())
            .field("saturated", &self.saturated.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Run a hook if one was set
pub(crate) fn fire(hook: Option<Hook>) {
    if let Some(hook) = hook {
        hook();
    }
}
