use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Error a task reports when its work fails.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of running a task.
pub type TaskResult = Result<(), TaskError>;

type Job = Box<dyn FnOnce(&CancelToken) -> TaskResult + Send + 'static>;

/// Identifier assigned at submission, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Cooperative cancellation flag shared by all tasks of one dispatcher.
///
/// It is tripped when shutdown gives up waiting. Long-running tasks should
/// check it between steps; nothing is interrupted forcibly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// A unit of work submitted to the dispatcher.
pub struct Task {
    label: &'static str,
    correlation_id: Option<String>,
    job: Job,
}

impl Task {
    /// Wrap a closure that ignores cancellation.
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self::cancellable(move |_| job())
    }

    /// Wrap a closure that receives the dispatcher's cancel token.
    pub fn cancellable<F>(job: F) -> Self
    where
        F: FnOnce(&CancelToken) -> TaskResult + Send + 'static,
    {
        Self {
            label: "task",
            correlation_id: None,
            job: Box::new(job),
        }
    }

    /// Short static name used in log fields (e.g. `sensor`, `command`).
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Caller-supplied identifier carried into log records.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub(crate) fn run(self, cancel: &CancelToken) -> TaskResult {
        (self.job)(cancel)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// A task sitting in the queue, stamped at submission.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub(crate) id: TaskId,
    pub(crate) submitted_at: Instant,
    pub(crate) task: Task,
}
