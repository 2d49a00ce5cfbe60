use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::debug;

use crate::error::{DispatchError, Result};
use crate::stats::{LoadGauge, LoadSnapshot};

type SampleHook = Box<dyn FnMut(&LoadSnapshot) + Send + 'static>;

/// Background thread sampling dispatcher load at a fixed interval.
///
/// Each sample is logged at debug level and kept as [`LoadMonitor::latest`].
/// Dropping the monitor stops the thread.
pub struct LoadMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    latest: Arc<Mutex<Option<LoadSnapshot>>>,
    samples: Arc<AtomicU64>,
}

impl LoadMonitor {
    /// Start sampling `gauge` every `interval`.
    pub fn spawn(gauge: LoadGauge, interval: Duration) -> Result<Self> {
        Self::spawn_with(gauge, interval, |_| {})
    }

    /// Start sampling and call `on_sample` with every snapshot.
    pub fn spawn_with<F>(gauge: LoadGauge, interval: Duration, on_sample: F) -> Result<Self>
    where
        F: FnMut(&LoadSnapshot) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(DispatchError::InvalidConfig(
                "monitor interval must be non-zero".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let latest = Arc::new(Mutex::new(None));
        let samples = Arc::new(AtomicU64::new(0));

        let thread_latest = Arc::clone(&latest);
        let thread_samples = Arc::clone(&samples);
        let mut hook: SampleHook = Box::new(on_sample);

        let handle = thread::Builder::new()
            .name("serialbridge-monitor".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let snapshot = gauge.snapshot();
                        debug!(
                            active = snapshot.active_tasks,
                            queued = snapshot.queue_depth,
                            submitted = snapshot.total_submitted,
                            completed = snapshot.completed,
                            failed = snapshot.failed,
                            workers = snapshot.workers,
                            "dispatcher load"
                        );
                        hook(&snapshot);
                        *thread_latest.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(snapshot);
                        thread_samples.fetch_add(1, Ordering::AcqRel);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| DispatchError::Spawn {
                name: "monitor",
                source,
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            latest,
            samples,
        })
    }

    /// Most recent sample, if one has been taken.
    pub fn latest(&self) -> Option<LoadSnapshot> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of samples taken so far.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    /// Stop the thread and return the last sample.
    pub fn stop(mut self) -> Option<LoadSnapshot> {
        self.halt();
        self.latest()
    }

    fn halt(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoadMonitor {
    fn drop(&mut self) {
        self.halt();
    }
}

impl std::fmt::Debug for LoadMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadMonitor")
            .field("samples", &self.samples())
            .field("latest", &self.latest())
            .finish()
    }
}
