use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Point-in-time view of dispatcher load.
///
/// Every counter is read atomically on its own; the set as a whole is not a
/// transaction, so `active_tasks + queue_depth` may briefly lag
/// `total_submitted - completed - failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSnapshot {
    /// Tasks handed to the pool and not yet finished.
    pub active_tasks: u32,
    /// Tasks accepted since the dispatcher started.
    pub total_submitted: u64,
    /// Tasks waiting in the queue.
    pub queue_depth: u32,
    pub completed: u64,
    pub failed: u64,
    /// Live worker threads.
    pub workers: u32,
    pub captured_at: SystemTime,
}

impl LoadSnapshot {
    /// Tasks accepted but not yet finished (queued or running).
    pub fn pending(&self) -> u64 {
        self.total_submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }
}

impl fmt::Display for LoadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} queued={} submitted={} completed={} failed={} workers={}",
            self.active_tasks,
            self.queue_depth,
            self.total_submitted,
            self.completed,
            self.failed,
            self.workers
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct LoadCounters {
    pub(crate) active: AtomicU32,
    pub(crate) queued: AtomicU32,
    pub(crate) workers: AtomicU32,
    pub(crate) submitted: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    /// Tasks dropped unstarted once the dispatcher halted.
    pub(crate) discarded: AtomicU64,
}

impl LoadCounters {
    pub(crate) fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            active_tasks: self.active.load(Ordering::Acquire),
            total_submitted: self.submitted.load(Ordering::Acquire),
            queue_depth: self.queued.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            workers: self.workers.load(Ordering::Acquire),
            captured_at: SystemTime::now(),
        }
    }
}

/// Cloneable read-only handle on a dispatcher's load counters.
#[derive(Debug, Clone)]
pub struct LoadGauge {
    counters: Arc<LoadCounters>,
}

impl LoadGauge {
    pub(crate) fn new(counters: Arc<LoadCounters>) -> Self {
        Self { counters }
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        self.counters.snapshot()
    }
}

/// Holds one unit of `active` for a task between hand-off and completion.
///
/// Dropping it releases the unit, whether the task finished, failed,
/// panicked or was abandoned before a worker picked it up.
#[derive(Debug)]
pub(crate) struct ActiveGuard {
    counters: Arc<LoadCounters>,
}

impl ActiveGuard {
    pub(crate) fn acquire(counters: &Arc<LoadCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::AcqRel);
        Self {
            counters: Arc::clone(counters),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_active_count() {
        let counters = Arc::new(LoadCounters::default());
        let first = ActiveGuard::acquire(&counters);
        let second = ActiveGuard::acquire(&counters);
        assert_eq!(counters.snapshot().active_tasks, 2);
        drop(first);
        assert_eq!(counters.snapshot().active_tasks, 1);
        drop(second);
        assert_eq!(counters.snapshot().active_tasks, 0);
    }

    #[test]
    fn gauge_reads_shared_counters() {
        let counters = Arc::new(LoadCounters::default());
        let gauge = LoadGauge::new(Arc::clone(&counters));
        counters.submitted.fetch_add(3, Ordering::AcqRel);
        counters.completed.fetch_add(1, Ordering::AcqRel);
        counters.failed.fetch_add(1, Ordering::AcqRel);

        let snapshot = gauge.clone().snapshot();
        assert_eq!(snapshot.total_submitted, 3);
        assert_eq!(snapshot.pending(), 1);
    }

    #[test]
    fn display_lists_counters() {
        let counters = LoadCounters::default();
        counters.queued.fetch_add(4, Ordering::AcqRel);
        let text = counters.snapshot().to_string();
        assert!(text.contains("queued=4"));
        assert!(text.contains("active=0"));
    }
}
