use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serialbridge_dispatch::{
    AdmissionPolicy, DispatchError, Dispatcher, DispatcherConfig, LoadSnapshot, Task,
};

fn wait_for(dispatcher: &Dispatcher, condition: impl Fn(&LoadSnapshot) -> bool) -> LoadSnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = dispatcher.snapshot();
        if condition(&snapshot) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "timed out; last {snapshot}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn single_worker_runs_in_submission_order() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_workers(1)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..50 {
        let order = Arc::clone(&order);
        dispatcher
            .submit(Task::new(move || {
                order.lock().unwrap().push(n);
                Ok(())
            }))
            .unwrap();
    }

    let report = dispatcher.shutdown(Duration::from_secs(5));
    assert!(!report.timed_out);
    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn slow_task_does_not_block_others() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let release = Arc::new(AtomicBool::new(false));
    let fast_done = Arc::new(AtomicUsize::new(0));

    let gate = Arc::clone(&release);
    dispatcher
        .submit(Task::new(move || {
            while !gate.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }))
        .unwrap();

    for _ in 0..5 {
        let fast_done = Arc::clone(&fast_done);
        dispatcher
            .submit(Task::new(move || {
                fast_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    let snapshot = wait_for(&dispatcher, |s| s.completed == 5);
    assert_eq!(snapshot.active_tasks, 1);
    assert_eq!(fast_done.load(Ordering::SeqCst), 5);

    release.store(true, Ordering::SeqCst);
    assert!(dispatcher.shutdown(Duration::from_secs(5)).into_result().is_ok());
}

#[test]
fn failures_and_panics_are_isolated() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_workers(2)).unwrap();

    dispatcher.submit(Task::new(|| Err("sink offline".into()))).unwrap();
    dispatcher
        .submit(Task::new(|| panic!("sink bug")).with_label("sensor"))
        .unwrap();
    for _ in 0..3 {
        dispatcher.submit(Task::new(|| Ok(()))).unwrap();
    }

    let snapshot = wait_for(&dispatcher, |s| s.completed + s.failed == 5);
    assert_eq!(snapshot.failed, 2);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.total_submitted, 5);
    assert_eq!(snapshot.active_tasks, 0);
    assert!(dispatcher.is_accepting());
}

#[test]
fn concurrent_submitters_are_all_counted() {
    let dispatcher = Arc::new(Dispatcher::with_defaults().unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..25 {
                    dispatcher.submit(Task::new(|| Ok(()))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = wait_for(&dispatcher, |s| s.completed == 100);
    assert_eq!(snapshot.total_submitted, 100);
    assert_eq!(snapshot.queue_depth, 0);
}

#[test]
fn bounded_queue_rejects_when_full() {
    let config = DispatcherConfig::default()
        .with_queue_capacity(2, AdmissionPolicy::Reject)
        .with_max_workers(1);
    let dispatcher = Dispatcher::new(config).unwrap();
    let release = Arc::new(AtomicBool::new(false));

    // Occupy the only worker.
    let gate = Arc::clone(&release);
    dispatcher
        .submit(Task::new(move || {
            while !gate.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }))
        .unwrap();
    wait_for(&dispatcher, |s| s.active_tasks == 1 && s.queue_depth == 0);

    // The drainer holds one task while it waits for the worker; two more fill the queue.
    let mut rejected = None;
    for _ in 0..4 {
        match dispatcher.submit(Task::new(|| Ok(()))) {
            Ok(_) => {}
            Err(err) => {
                rejected = Some(err);
                break;
            }
        }
    }
    assert!(matches!(
        rejected,
        Some(DispatchError::QueueFull { capacity: 2 })
    ));
    let before = dispatcher.snapshot();
    assert!(before.queue_depth <= 2);

    release.store(true, Ordering::SeqCst);
    let after = wait_for(&dispatcher, |s| s.completed == s.total_submitted);
    assert_eq!(after.failed, 0);
}

#[test]
fn shutdown_waits_for_queued_work() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_workers(1)).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let ran = Arc::clone(&ran);
        dispatcher
            .submit(Task::new(move || {
                thread::sleep(Duration::from_millis(5));
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    let report = dispatcher.shutdown(Duration::from_secs(5));
    assert!(!report.timed_out);
    assert_eq!(report.abandoned(), 0);
    assert_eq!(ran.load(Ordering::SeqCst), 5);
}

#[test]
fn shutdown_timeout_abandons_and_cancels() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_max_workers(1)).unwrap();
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let ran_queued = Arc::new(AtomicUsize::new(0));

    let flag = Arc::clone(&saw_cancel);
    dispatcher
        .submit(Task::cancellable(move |cancel| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !cancel.is_cancelled() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(cancel.is_cancelled(), Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
    for _ in 0..3 {
        let ran_queued = Arc::clone(&ran_queued);
        dispatcher
            .submit(Task::new(move || {
                ran_queued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    let report = dispatcher.shutdown(Duration::from_millis(50));
    assert!(report.timed_out);
    assert_eq!(report.abandoned_queued, 3);
    assert!(report.abandoned_running <= 1);
    assert!(report.elapsed < Duration::from_secs(2));
    assert!(matches!(
        report.into_result(),
        Err(DispatchError::ShutdownTimeout { .. })
    ));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !saw_cancel.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "task never observed cancellation");
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(ran_queued.load(Ordering::SeqCst), 0);
    assert!(matches!(
        dispatcher.submit(Task::new(|| Ok(()))),
        Err(DispatchError::ShutDown)
    ));
}
