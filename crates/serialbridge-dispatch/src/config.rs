use std::time::Duration;

use crate::error::{DispatchError, Result};

/// Default interval at which the drainer re-checks its stop flags while idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default idle time after which a surplus worker exits.
pub const DEFAULT_WORKER_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default graceful-shutdown deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default sampling period of the load monitor.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// What `submit` does when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Wait for room (until the dispatcher stops accepting).
    #[default]
    Block,
    /// Fail immediately with [`DispatchError::QueueFull`].
    Reject,
}

/// Dispatcher tuning.
///
/// The defaults reproduce an unbounded queue feeding a pool that grows on
/// demand and shrinks after a minute of idleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum number of queued tasks; `None` is unbounded.
    pub queue_capacity: Option<usize>,
    /// Behavior of `submit` on a full bounded queue.
    pub admission: AdmissionPolicy,
    /// Upper bound on concurrently running workers; `None` grows on demand.
    pub max_workers: Option<usize>,
    pub worker_keep_alive: Duration,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
    pub monitor_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            admission: AdmissionPolicy::Block,
            max_workers: None,
            worker_keep_alive: DEFAULT_WORKER_KEEP_ALIVE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}

impl DispatcherConfig {
    /// Bound the queue and choose what happens when it is full.
    pub fn with_queue_capacity(mut self, capacity: usize, admission: AdmissionPolicy) -> Self {
        self.queue_capacity = Some(capacity);
        self.admission = admission;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_worker_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.worker_keep_alive = keep_alive;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == Some(0) {
            return Err(DispatchError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(DispatchError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.monitor_interval.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "monitor_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
