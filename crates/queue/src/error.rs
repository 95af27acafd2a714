//! Queue and task errors

/// Errors raised while building or reconfiguring a queue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Concurrency must be at least one
    #[error("queue concurrency must be greater than or equal to 1, got {0}")]
    InvalidConcurrency(usize),

    /// Invalid configuration value
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// Async workers need a tokio runtime to run on
    #[error("no tokio runtime available to drive async workers")]
    NoRuntime,
}

/// Why a task did not produce a result.
///
/// Worker failures are passed through untouched in [`TaskError::Worker`]; the
/// other variants are produced by the queue itself and never by a worker.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The task was discarded from the pending list before it ever ran
    #[error("queue aborted")]
    Aborted,

    /// The worker dropped its completion handle without completing the task
    #[error("worker dropped its completion handle without completing the task")]
    Abandoned,

    /// The worker reported a failure
    #[error("{0}")]
    Worker(E),
}

impl<E> TaskError<E> {
    /// Whether the task was discarded by `kill`, `kill_and_drain` or `abort`
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Whether the worker gave up on the task without reporting
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned)
    }

    /// The worker's own error, if that is what this is
    pub fn worker_error(&self) -> Option<&E> {
        match self {
            Self::Worker(err) => Some(err),
            _ => None,
        }
    }

    /// Unwrap the worker's own error, if that is what this is
    pub fn into_worker_error(self) -> Option<E> {
        match self {
            Self::Worker(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_message_is_fixed() {
        let err: TaskError<String> = TaskError::Aborted;
        assert_eq!(err.to_string(), "queue aborted");
        assert!(err.is_aborted());
        assert!(!err.is_abandoned());
        assert!(err.worker_error().is_none());
    }

    #[test]
    fn test_worker_error_is_unmodified() {
        let err: TaskError<anyhow::Error> = TaskError::Worker(anyhow::anyhow!("test error"));
        assert_eq!(err.to_string(), "test error");
        assert!(!err.is_aborted());

        let inner = err.into_worker_error().unwrap();
        assert_eq!(inner.to_string(), "test error");
    }

    #[test]
    fn test_queue_error_display() {
        assert_eq!(
            QueueError::InvalidConcurrency(0).to_string(),
            "queue concurrency must be greater than or equal to 1, got 0"
        );
        assert_eq!(
            QueueError::NoRuntime.to_string(),
            "no tokio runtime available to drive async workers"
        );
    }
}
