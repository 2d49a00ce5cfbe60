use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, info, trace, warn};

use crate::config::{AdmissionPolicy, DispatcherConfig};
use crate::error::{DispatchError, Result};
use crate::pool::{Handoff, WorkerPool};
use crate::stats::{ActiveGuard, LoadCounters, LoadGauge, LoadSnapshot};
use crate::task::{CancelToken, QueuedTask, Task, TaskId};

/// Sleep between checks while shutdown waits for work to finish.
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

struct Shared {
    tx: Sender<QueuedTask>,
    rx: Receiver<QueuedTask>,
    counters: Arc<LoadCounters>,
    next_id: AtomicU64,
    /// Cleared when shutdown starts; `submit` fails afterwards.
    accepting: AtomicBool,
    /// Drainer exits once the queue is empty.
    draining: AtomicBool,
    /// Drainer and workers stop taking new work immediately.
    halted: Arc<AtomicBool>,
    cancel: CancelToken,
}

/// Outcome of [`Dispatcher::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True when the deadline passed before all work finished.
    pub timed_out: bool,
    /// Tasks dropped at the deadline without ever starting.
    pub abandoned_queued: usize,
    /// Tasks still running once the drainer stopped; best effort.
    pub abandoned_running: usize,
    pub elapsed: Duration,
}

impl ShutdownReport {
    pub fn abandoned(&self) -> usize {
        self.abandoned_queued + self.abandoned_running
    }

    /// Map a timed-out shutdown to [`DispatchError::ShutdownTimeout`].
    pub fn into_result(self) -> Result<()> {
        if self.timed_out {
            Err(DispatchError::ShutdownTimeout {
                abandoned: self.abandoned(),
                elapsed: self.elapsed,
            })
        } else {
            Ok(())
        }
    }
}

/// Asynchronous, FIFO task dispatcher.
///
/// `submit` is callable from any thread and never runs the task itself. A
/// draining thread moves tasks from the queue to an elastic worker pool in
/// submission order. With more than one worker, completion order is not
/// guaranteed.
pub struct Dispatcher {
    shared: Arc<Shared>,
    drainer: Mutex<Option<JoinHandle<()>>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Start a dispatcher with the given configuration.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = match config.queue_capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        let counters = Arc::new(LoadCounters::default());
        let halted = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();

        let shared = Arc::new(Shared {
            tx,
            rx,
            counters: Arc::clone(&counters),
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            draining: AtomicBool::new(false),
            halted: Arc::clone(&halted),
            cancel: cancel.clone(),
        });

        let pool = WorkerPool::new(
            counters,
            cancel,
            halted,
            config.max_workers,
            config.worker_keep_alive,
        );

        let drainer_shared = Arc::clone(&shared);
        let poll_interval = config.poll_interval;
        let drainer = thread::Builder::new()
            .name("serialbridge-drainer".to_string())
            .spawn(move || drain_loop(drainer_shared, pool, poll_interval))
            .map_err(|source| DispatchError::Spawn {
                name: "drainer",
                source,
            })?;

        debug!(
            queue_capacity = ?config.queue_capacity,
            max_workers = ?config.max_workers,
            "dispatcher started"
        );

        Ok(Self {
            shared,
            drainer: Mutex::new(Some(drainer)),
            config,
        })
    }

    /// Start a dispatcher with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DispatcherConfig::default())
    }

    /// Enqueue a task for asynchronous execution.
    ///
    /// Returns once the task is queued; the task's own failure is never
    /// reported here.
    pub fn submit(&self, task: Task) -> Result<TaskId> {
        let shared = &self.shared;
        if !shared.accepting.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }

        let id = TaskId(shared.next_id.fetch_add(1, Ordering::Relaxed));
        let queued = QueuedTask {
            id,
            submitted_at: Instant::now(),
            task,
        };

        // Counted before the send so the drainer's decrement can never run first.
        shared.counters.queued.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.enqueue(queued) {
            shared.counters.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(err);
        }
        shared.counters.submitted.fetch_add(1, Ordering::AcqRel);

        trace!(task_id = %id, "task queued");
        Ok(id)
    }

    fn enqueue(&self, queued: QueuedTask) -> Result<()> {
        let shared = &self.shared;

        if let (Some(capacity), AdmissionPolicy::Reject) =
            (self.config.queue_capacity, self.config.admission)
        {
            return shared.tx.try_send(queued).map_err(|err| match err {
                TrySendError::Full(_) => DispatchError::QueueFull { capacity },
                TrySendError::Disconnected(_) => DispatchError::ShutDown,
            });
        }

        let mut pending = queued;
        loop {
            match shared.tx.send_timeout(pending, self.config.poll_interval) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => {
                    if !shared.accepting.load(Ordering::Acquire) {
                        return Err(DispatchError::ShutDown);
                    }
                    pending = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(DispatchError::ShutDown),
            }
        }
    }

    /// Current load counters.
    pub fn snapshot(&self) -> LoadSnapshot {
        self.shared.counters.snapshot()
    }

    /// Cloneable handle for reading load from other threads.
    pub fn gauge(&self) -> LoadGauge {
        LoadGauge::new(Arc::clone(&self.shared.counters))
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Whether `submit` still accepts tasks.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Shut down using the configured timeout.
    pub fn shutdown_default(&self) -> ShutdownReport {
        self.shutdown(self.config.shutdown_timeout)
    }

    /// Stop accepting tasks and wait up to `timeout` for queued and running
    /// tasks to finish.
    ///
    /// On timeout the cancel token is tripped, tasks still queued are
    /// dropped and running tasks are left to finish on their own. A second
    /// call returns immediately.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let started = Instant::now();
        let shared = &self.shared;

        if !shared.accepting.swap(false, Ordering::AcqRel) {
            return ShutdownReport {
                timed_out: false,
                abandoned_queued: 0,
                abandoned_running: 0,
                elapsed: Duration::ZERO,
            };
        }
        shared.draining.store(true, Ordering::Release);
        info!(timeout_ms = timeout.as_millis() as u64, "dispatcher shutting down");

        let deadline = started + timeout;
        let finished = wait_until(deadline, || {
            self.drainer_finished() && shared.counters.active.load(Ordering::Acquire) == 0
        });

        let mut report = ShutdownReport {
            timed_out: !finished,
            abandoned_queued: 0,
            abandoned_running: 0,
            elapsed: Duration::ZERO,
        };

        if !finished {
            shared.halted.store(true, Ordering::Release);
            shared.cancel.cancel();
            report.abandoned_queued = self.discard_queued();
        }

        self.join_drainer();
        // Anything a racing submit slipped in after the drainer stopped.
        report.abandoned_queued += self.discard_queued();
        if !finished {
            // Counted once the drainer is gone, so a hand-off it dropped is
            // queued work, not running work. Best effort: a task that
            // finishes between the deadline and this read is not counted.
            report.abandoned_queued += shared.counters.discarded.load(Ordering::Acquire) as usize;
            report.abandoned_running = shared.counters.active.load(Ordering::Acquire) as usize;
        }
        report.elapsed = started.elapsed();

        if report.timed_out || report.abandoned() > 0 {
            warn!(
                abandoned_queued = report.abandoned_queued,
                abandoned_running = report.abandoned_running,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "dispatcher shutdown abandoned work"
            );
        } else {
            info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                "dispatcher shut down"
            );
        }
        report
    }

    fn discard_queued(&self) -> usize {
        let mut discarded = 0usize;
        for _ in self.shared.rx.try_iter() {
            self.shared.counters.queued.fetch_sub(1, Ordering::AcqRel);
            discarded += 1;
        }
        discarded
    }

    fn drainer_finished(&self) -> bool {
        self.drainer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    fn join_drainer(&self) {
        let handle = self
            .drainer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("drainer thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.shared.accepting.swap(false, Ordering::AcqRel) {
            debug!("dispatcher dropped without shutdown; halting");
            self.shared.halted.store(true, Ordering::Release);
            self.shared.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("load", &self.snapshot())
            .finish()
    }
}

fn drain_loop(shared: Arc<Shared>, mut pool: WorkerPool, poll_interval: Duration) {
    loop {
        if shared.halted.load(Ordering::Acquire) {
            break;
        }
        if shared.draining.load(Ordering::Acquire) && shared.rx.is_empty() {
            break;
        }

        match shared.rx.recv_timeout(poll_interval) {
            Ok(queued) => {
                shared.counters.queued.fetch_sub(1, Ordering::AcqRel);
                if shared.halted.load(Ordering::Acquire) {
                    debug!(task_id = %queued.id, "discarding task during halt");
                    shared.counters.discarded.fetch_add(1, Ordering::AcqRel);
                    break;
                }
                let guard = ActiveGuard::acquire(&shared.counters);
                pool.dispatch(Handoff { queued, guard });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("drainer stopped");
}

fn wait_until(deadline: Instant, mut done: impl FnMut() -> bool) -> bool {
    loop {
        if done() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline - now));
    }
}
