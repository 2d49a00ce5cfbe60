/// Errors reported by the dispatcher to submitters and owners.
///
/// Task failures are not in here: they are logged and counted, never
/// returned to whoever submitted the task.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts submissions.
    #[error("dispatcher is shut down")]
    ShutDown,

    /// A bounded queue with the reject policy is full.
    #[error("task queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// Graceful shutdown exceeded its deadline.
    #[error("shutdown timed out after {elapsed:?}; {abandoned} task(s) abandoned")]
    ShutdownTimeout {
        abandoned: usize,
        elapsed: std::time::Duration,
    },

    /// A dispatcher thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// The configuration cannot be used.
    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
