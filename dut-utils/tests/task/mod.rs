//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dut_utils::Error;
use dut_utils::task::{FailureKind, Worker, WorkerHandle, join_all};
use dut_utils::test::setup;

#[derive(Debug, Eq, PartialEq)]
struct ValueError(String);

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValueError {}

//
// Helper functions.
//

fn sleeper(name: &str, duration: Duration) -> WorkerHandle<()> {
    Worker::new(name, move || {
        thread::sleep(duration);
        Ok::<_, ValueError>(())
    })
    .start()
    .unwrap()
}

fn failing_after(name: &str, delay: Duration, message: &str) -> WorkerHandle<()> {
    let message = message.to_owned();
    Worker::new(name, move || {
        thread::sleep(delay);
        Err(ValueError(message))
    })
    .start()
    .unwrap()
}

fn failing(name: &str, message: &str) -> Worker<()> {
    let message = message.to_owned();
    Worker::new(name, move || Err(ValueError(message)))
}

//
// Tests.
//

#[test]
fn join_reraises_failure() {
    setup();

    let mut worker = failing("failing", "x").start().unwrap();
    let failure = worker.join(None).unwrap_err();

    assert_eq!(failure.worker(), "failing");
    assert_eq!(failure.kind(), FailureKind::Error);
    assert!(failure.type_name().ends_with("ValueError"));
    assert_eq!(failure.message(), "x");
    assert_eq!(failure.downcast_ref::<ValueError>(), Some(&ValueError("x".to_owned())));

    // Every later join replays the same failure.
    let failure = worker.join(Some(Duration::ZERO)).unwrap_err();
    assert_eq!(failure.message(), "x");
}

#[test]
fn join_suppressed_returns_failure() {
    setup();

    let mut worker = failing("failing", "x").start().unwrap();
    let failure = worker.join_suppressed(None).unwrap();

    assert_eq!(failure.downcast_ref::<ValueError>(), Some(&ValueError("x".to_owned())));
    assert!(!worker.is_alive());
}

#[test]
fn panic_is_captured() {
    setup();

    let mut worker = Worker::new("panicky", || -> Result<(), ValueError> {
        panic!("boom");
    })
    .start()
    .unwrap();
    let failure = worker.join(None).unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Panic);
    assert_eq!(failure.message(), "boom");
    assert!(failure.downcast_ref::<ValueError>().is_none());
}

#[test]
fn exit_handler_runs_once() {
    setup();

    let exits = Arc::new(AtomicUsize::new(0));

    let mut worker = Worker::new("ok", || Ok::<_, ValueError>(()));
    let exits_child = exits.clone();
    worker.set_exit_handler(move || {
        exits_child.fetch_add(1, Ordering::SeqCst);
    });
    let mut worker = worker.start().unwrap();
    assert!(worker.join(None).is_ok());
    assert!(worker.join(None).is_ok());
    assert_eq!(exits.load(Ordering::SeqCst), 1);

    let mut worker = failing("failing", "x");
    let exits_child = exits.clone();
    worker.set_exit_handler(move || {
        exits_child.fetch_add(1, Ordering::SeqCst);
    });
    let mut worker = worker.start().unwrap();
    assert!(worker.join(None).is_err());
    assert!(worker.join(None).is_err());
    assert_eq!(exits.load(Ordering::SeqCst), 2);
}

#[test]
fn handlers_run_before_join_returns() {
    setup();

    let events = Arc::new(Mutex::new(Vec::new()));

    let mut worker = failing("failing", "x");
    let events_child = events.clone();
    worker.set_error_handler(move |failure| {
        events_child
            .lock()
            .unwrap()
            .push(format!("error: {}", failure.message()));
    });
    let events_child = events.clone();
    worker.set_exit_handler(move || {
        events_child.lock().unwrap().push("exit".to_owned());
    });
    let mut worker = worker.start().unwrap();
    assert!(worker.join(None).is_err());

    assert_eq!(*events.lock().unwrap(), vec!["error: x", "exit"]);
}

#[test]
fn error_handler_skipped_on_success() {
    setup();

    let errors = Arc::new(AtomicUsize::new(0));

    let mut worker = Worker::new("ok", || Ok::<_, ValueError>(42));
    let errors_child = errors.clone();
    worker.set_error_handler(move |_| {
        errors_child.fetch_add(1, Ordering::SeqCst);
    });
    let mut worker = worker.start().unwrap();
    assert!(worker.join(None).is_ok());

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(worker.take_output(), Some(42));
    assert_eq!(worker.take_output(), None);
}

#[test]
fn panicking_handler_does_not_hang_joiner() {
    setup();

    let mut worker = failing("failing", "x");
    worker.set_error_handler(|_| panic!("handler exploded"));
    let mut worker = worker.start().unwrap();

    let failure = worker.join(Some(Duration::from_secs(5))).unwrap_err();
    assert_eq!(failure.message(), "x");
    assert!(!worker.is_alive());
}

#[test]
fn join_timeout_leaves_worker_running() {
    setup();

    let (tx, rx) = mpsc::channel::<()>();
    let mut worker = Worker::new("blocked", move || rx.recv()).start().unwrap();

    assert!(worker.join(Some(Duration::from_millis(100))).is_ok());
    assert!(worker.is_alive());

    tx.send(()).unwrap();
    assert!(worker.join(None).is_ok());
    assert!(!worker.is_alive());
}

#[test]
fn join_all_waits_for_every_worker() {
    setup();

    let mut workers = vec![
        sleeper("w1", Duration::from_millis(300)),
        sleeper("w2", Duration::from_millis(100)),
        sleeper("w3", Duration::from_millis(200)),
    ];
    assert!(join_all(&mut workers, Duration::from_secs(5)).is_ok());
    assert!(workers.iter().all(|worker| !worker.is_alive()));
}

#[test]
fn join_all_names_outstanding_workers() {
    setup();

    let timeout = Duration::from_millis(500);
    let (tx, rx) = mpsc::channel::<()>();
    let mut workers = vec![
        sleeper("quick", Duration::from_millis(50)),
        Worker::new("stuck", move || rx.recv()).start().unwrap(),
    ];

    let start = Instant::now();
    let result = join_all(&mut workers, timeout);
    let elapsed = start.elapsed();

    match result {
        Err(Error::JoinTimeout(outstanding)) => {
            assert_eq!(outstanding, vec!["stuck".to_owned()]);
        }
        result => panic!("unexpected result: {result:?}"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(500));

    // The barrier doesn't cancel anything.
    assert!(workers[1].is_alive());
    tx.send(()).unwrap();
    assert!(workers[1].join(None).is_ok());
}

#[test]
fn join_all_aborts_on_failure() {
    setup();

    let mut workers = vec![
        sleeper("slow", Duration::from_millis(200)),
        failing("failing", "x").start().unwrap(),
    ];
    match join_all(&mut workers, Duration::from_secs(5)) {
        Err(Error::WorkerFailed(failure)) => {
            assert_eq!(failure.worker(), "failing");
        }
        result => panic!("unexpected result: {result:?}"),
    }
}

#[test]
fn join_all_unbounded_timeout() {
    setup();

    let mut workers = vec![sleeper("w1", Duration::from_millis(10))];
    assert!(join_all(&mut workers, Duration::MAX).is_ok());
    assert!(!workers[0].is_alive());
}

#[test]
fn join_all_unbounded_timeout_aborts_on_failure() {
    setup();

    let mut workers = vec![
        sleeper("slow", Duration::from_millis(300)),
        failing_after("failing", Duration::from_millis(50), "x"),
    ];
    match join_all(&mut workers, Duration::MAX) {
        Err(Error::WorkerFailed(failure)) => {
            assert_eq!(failure.worker(), "failing");
        }
        result => panic!("unexpected result: {result:?}"),
    }
}

#[test]
fn join_all_catches_failure_published_mid_pass() {
    setup();

    // Failures land at staggered times while the barrier is polling, so
    // some of them are published in the middle of a pass.
    for delay in [0, 1, 5, 20, 99, 100, 101, 150] {
        let mut workers = vec![
            sleeper("slow", Duration::from_millis(400)),
            failing_after("failing", Duration::from_millis(delay), "x"),
            sleeper("quick", Duration::from_millis(delay / 2)),
        ];
        match join_all(&mut workers, Duration::from_secs(5)) {
            Err(Error::WorkerFailed(failure)) => {
                assert_eq!(failure.worker(), "failing");
                assert_eq!(failure.message(), "x");
            }
            result => panic!("delay {delay}ms: unexpected result: {result:?}"),
        }
    }
}
