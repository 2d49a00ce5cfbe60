use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use tracing::{debug, error, trace, warn};

use crate::stats::{ActiveGuard, LoadCounters};
use crate::task::{CancelToken, QueuedTask};

/// How long the drainer waits on a saturated pool before re-checking the halt flag.
const HANDOFF_RETRY: Duration = Duration::from_millis(10);

/// A dequeued task travelling to a worker, holding its `active` unit.
pub(crate) struct Handoff {
    pub(crate) queued: QueuedTask,
    pub(crate) guard: ActiveGuard,
}

#[derive(Clone)]
struct WorkerContext {
    counters: Arc<LoadCounters>,
    cancel: CancelToken,
    halted: Arc<AtomicBool>,
    keep_alive: Duration,
}

/// Elastic pool fed through a rendezvous channel.
///
/// A hand-off goes to an idle worker when one is waiting; otherwise a new
/// worker is spawned with the task, up to `max_workers`. At the cap the
/// drainer blocks until a worker frees up, which keeps execution order equal
/// to queue order when `max_workers` is 1.
pub(crate) struct WorkerPool {
    tx: Sender<Handoff>,
    rx: Receiver<Handoff>,
    max_workers: u32,
    next_worker: u64,
    ctx: WorkerContext,
}

impl WorkerPool {
    pub(crate) fn new(
        counters: Arc<LoadCounters>,
        cancel: CancelToken,
        halted: Arc<AtomicBool>,
        max_workers: Option<usize>,
        keep_alive: Duration,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        let max_workers = max_workers
            .map(|max| u32::try_from(max).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        Self {
            tx,
            rx,
            max_workers,
            next_worker: 0,
            ctx: WorkerContext {
                counters,
                cancel,
                halted,
                keep_alive,
            },
        }
    }

    /// Hand a task to a worker, blocking while the pool is saturated.
    ///
    /// Once the halt flag is set the task is discarded instead, which
    /// releases its active unit.
    pub(crate) fn dispatch(&mut self, handoff: Handoff) {
        let mut handoff = handoff;
        loop {
            if self.ctx.halted.load(Ordering::Acquire) {
                discard(handoff, &self.ctx);
                return;
            }

            match self.tx.try_send(handoff) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) | Err(TrySendError::Disconnected(back)) => {
                    handoff = back;
                }
            }

            if self.try_reserve_worker() {
                self.spawn_worker(handoff);
                return;
            }

            match self.tx.send_timeout(handoff, HANDOFF_RETRY) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(back))
                | Err(SendTimeoutError::Disconnected(back)) => {
                    handoff = back;
                }
            }
        }
    }

    fn try_reserve_worker(&self) -> bool {
        let max = self.max_workers;
        self.ctx
            .counters
            .workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    fn spawn_worker(&mut self, first: Handoff) {
        self.next_worker += 1;
        let worker = self.next_worker;
        let rx = self.rx.clone();
        let ctx = self.ctx.clone();

        // The closure owns `first`; recover it through a slot if spawning fails.
        let slot = Arc::new(std::sync::Mutex::new(Some(first)));
        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("serialbridge-worker-{worker}"))
            .spawn(move || {
                let first = worker_slot
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take();
                worker_loop(worker, first, rx, ctx);
            });

        match spawned {
            Ok(_) => debug!(worker, "worker started"),
            Err(err) => {
                self.ctx.counters.workers.fetch_sub(1, Ordering::AcqRel);
                error!(worker, error = %err, "failed to spawn worker; running task on drainer");
                let pending = slot
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take();
                if let Some(handoff) = pending {
                    execute(handoff, &self.ctx);
                }
            }
        }
    }
}

fn worker_loop(worker: u64, first: Option<Handoff>, rx: Receiver<Handoff>, ctx: WorkerContext) {
    let mut next = first;
    while let Some(handoff) = next.take() {
        // A hand-off that lands after the halt is discarded, never started.
        if ctx.halted.load(Ordering::Acquire) {
            discard(handoff, &ctx);
            break;
        }
        execute(handoff, &ctx);
        if ctx.halted.load(Ordering::Acquire) {
            break;
        }
        next = rx.recv_timeout(ctx.keep_alive).ok();
    }
    ctx.counters.workers.fetch_sub(1, Ordering::AcqRel);
    debug!(worker, "worker retired");
}

fn discard(handoff: Handoff, ctx: &WorkerContext) {
    debug!(task_id = %handoff.queued.id, "discarding task during halt");
    ctx.counters.discarded.fetch_add(1, Ordering::AcqRel);
    drop(handoff);
}

fn execute(handoff: Handoff, ctx: &WorkerContext) {
    let Handoff { queued, guard } = handoff;
    let QueuedTask {
        id,
        submitted_at,
        task,
    } = queued;
    let label = task.label();
    let correlation_id = task.correlation_id().map(str::to_owned);
    let waited = submitted_at.elapsed();
    let started = Instant::now();

    trace!(task_id = %id, label, waited_us = waited.as_micros() as u64, "task started");

    let outcome = catch_unwind(AssertUnwindSafe(|| task.run(&ctx.cancel)));
    let elapsed_us = started.elapsed().as_micros() as u64;

    match outcome {
        Ok(Ok(())) => {
            ctx.counters.completed.fetch_add(1, Ordering::AcqRel);
            trace!(task_id = %id, label, elapsed_us, "task completed");
        }
        Ok(Err(err)) => {
            ctx.counters.failed.fetch_add(1, Ordering::AcqRel);
            warn!(
                task_id = %id,
                label,
                correlation_id = correlation_id.as_deref().unwrap_or("-"),
                elapsed_us,
                error = %err,
                "task failed"
            );
        }
        Err(panic) => {
            ctx.counters.failed.fetch_add(1, Ordering::AcqRel);
            error!(
                task_id = %id,
                label,
                correlation_id = correlation_id.as_deref().unwrap_or("-"),
                panic = panic_message(panic.as_ref()),
                "task panicked"
            );
        }
    }

    drop(guard);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
