//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use derive_new::new;
use tracing::{debug, warn};

use crate::error::Error;
use crate::{panic_message, with_source};

// Pause between two consecutive passes of `join_all`.
const JOIN_ALL_PASS_INTERVAL: Duration = Duration::from_millis(100);

type Body<T> = Box<dyn FnOnce() -> Result<T, Failure> + Send>;
type ErrorHandler = Box<dyn FnOnce(&Failure) + Send>;
type ExitHandler = Box<dyn FnOnce() + Send>;

/// A unit of work that runs on its own thread and whose failure is replayed
/// to whoever joins it.
///
/// Handlers can only be attached before the worker is started, since
/// [`Worker::start`] consumes the worker and hands back a [`WorkerHandle`].
pub struct Worker<T> {
    name: String,
    body: Body<T>,
    error_handler: Option<ErrorHandler>,
    exit_handler: Option<ExitHandler>,
}

/// A handle to a started [`Worker`].
///
/// Dropping the handle doesn't stop the worker; its thread keeps running
/// detached.
#[derive(Debug)]
pub struct WorkerHandle<T> {
    name: String,
    shared: Arc<Shared<T>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Failure captured on a worker thread.
///
/// Holds everything needed to report the original error on the joining
/// thread: the error type, its message, the backtrace taken where the
/// failure was captured and, for returned errors, the error value itself.
#[derive(Clone, Debug)]
pub struct Failure {
    worker: String,
    kind: FailureKind,
    type_name: &'static str,
    message: String,
    backtrace: Arc<Backtrace>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    // The body returned an error.
    Error,
    // The body panicked.
    Panic,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    finished: Condvar,
}

#[derive(Debug)]
enum State<T> {
    Running,
    Finished(Result<Option<T>, Failure>),
}

// Publishes the worker outcome when dropped, including while unwinding from
// a panicking handler.
#[derive(new)]
struct Completion<T> {
    shared: Arc<Shared<T>>,
    result: Option<Result<Option<T>, Failure>>,
}

// ===== impl Worker =====

impl<T> Worker<T>
where
    T: Send + 'static,
{
    /// Creates a new idle worker. The body doesn't run until
    /// [`Worker::start`] is called.
    pub fn new<F, E>(name: impl Into<String>, body: F) -> Worker<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let name = name.into();
        let worker = name.clone();
        let body = Box::new(move || {
            body().map_err(|error| Failure::from_error(&worker, error))
        });
        Worker {
            name,
            body,
            error_handler: None,
            exit_handler: None,
        }
    }

    /// Returns the worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the callback invoked on the worker thread when the body fails.
    ///
    /// The handler runs before the exit handler. Replaces any handler set
    /// previously.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: FnOnce(&Failure) + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
    }

    /// Sets the callback invoked on the worker thread once the body is done,
    /// whether it succeeded or not. Replaces any handler set previously.
    pub fn set_exit_handler<F>(&mut self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.exit_handler = Some(Box::new(handler));
    }

    /// Starts running the worker on a new thread.
    pub fn start(self) -> Result<WorkerHandle<T>, Error> {
        let Worker {
            name,
            body,
            error_handler,
            exit_handler,
        } = self;

        let shared = Arc::new(Shared {
            state: Mutex::new(State::Running),
            finished: Condvar::new(),
        });
        let shared_child = shared.clone();
        let worker = name.clone();

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(%worker, "worker started");
                let result = match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(result) => result.map(Some),
                    Err(payload) => Err(Failure::from_panic(&worker, payload)),
                };
                let completion = Completion::new(shared_child, Some(result));

                if let Some(Err(failure)) = &completion.result {
                    debug!(%worker, error = %failure, "worker failed");
                    if let Some(handler) = error_handler {
                        (handler)(failure);
                    }
                }
                if let Some(handler) = exit_handler {
                    (handler)();
                }
                debug!(%worker, "worker finished");
            })
            .map_err(|error| Error::SpawnError(name.clone(), error))?;

        Ok(WorkerHandle {
            name,
            shared,
            thread: Some(thread),
        })
    }
}

impl<T> std::fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("error_handler", &self.error_handler.is_some())
            .field("exit_handler", &self.exit_handler.is_some())
            .finish()
    }
}

// ===== impl WorkerHandle =====

impl<T> WorkerHandle<T> {
    /// Returns the worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the worker is still running, handlers included.
    pub fn is_alive(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        matches!(*state, State::Running)
    }

    /// Waits for the worker to finish, re-raising its failure.
    ///
    /// A `None` timeout blocks until the worker finishes. When the timeout
    /// expires first, this returns `Ok(())` and the worker keeps running;
    /// use [`WorkerHandle::is_alive`] to tell both cases apart.
    pub fn join(&mut self, timeout: Option<Duration>) -> Result<(), Failure> {
        match self.join_suppressed(timeout) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Waits for the worker to finish, returning its failure (if any) instead
    /// of raising it.
    pub fn join_suppressed(
        &mut self,
        timeout: Option<Duration>,
    ) -> Option<Failure> {
        let state = self.shared.state.lock().unwrap();
        let running = |state: &mut State<T>| matches!(state, State::Running);
        let state = match timeout {
            Some(timeout) => {
                self.shared
                    .finished
                    .wait_timeout_while(state, timeout, running)
                    .unwrap()
                    .0
            }
            None => self.shared.finished.wait_while(state, running).unwrap(),
        };

        let failure = match &*state {
            State::Running => return None,
            State::Finished(result) => result.as_ref().err().cloned(),
        };
        drop(state);

        self.reap();
        failure
    }

    /// Takes the value produced by a successful body.
    ///
    /// Returns `None` if the worker is still running, if it failed, or if the
    /// value was already taken.
    pub fn take_output(&mut self) -> Option<T> {
        let mut state = self.shared.state.lock().unwrap();
        match &mut *state {
            State::Finished(Ok(output)) => output.take(),
            _ => None,
        }
    }

    // Checks the outcome under a single lock acquisition. Returns `None` while
    // the worker is still running.
    fn try_finish(&mut self) -> Option<Result<(), Failure>> {
        let state = self.shared.state.lock().unwrap();
        let result = match &*state {
            State::Running => return None,
            State::Finished(Ok(_)) => Ok(()),
            State::Finished(Err(failure)) => Err(failure.clone()),
        };
        drop(state);

        self.reap();
        Some(result)
    }

    // Joins the underlying thread once the outcome is published.
    fn reap(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = %self.name, "worker handler panicked");
            }
        }
    }
}

// ===== impl Failure =====

impl Failure {
    fn from_error<E>(worker: &str, error: E) -> Failure
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Failure {
            worker: worker.to_owned(),
            kind: FailureKind::Error,
            type_name: std::any::type_name::<E>(),
            message: with_source(&error),
            backtrace: Arc::new(Backtrace::force_capture()),
            source: Some(Arc::new(error)),
        }
    }

    fn from_panic(worker: &str, payload: Box<dyn Any + Send>) -> Failure {
        Failure {
            worker: worker.to_owned(),
            kind: FailureKind::Panic,
            type_name: "panic",
            message: panic_message(&*payload),
            backtrace: Arc::new(Backtrace::force_capture()),
            source: None,
        }
    }

    /// Returns the name of the worker that failed.
    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the type name of the original error, or `"panic"`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns a reference to the original error if it's of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.source.as_deref().and_then(|error| error.downcast_ref::<E>())
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FailureKind::Error => {
                write!(f, "worker {} failed: {}", self.worker, self.message)
            }
            FailureKind::Panic => {
                write!(f, "worker {} panicked: {}", self.worker, self.message)
            }
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|error| error as &(dyn std::error::Error + 'static))
    }
}

// ===== impl Completion =====

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(result) = self.result.take() {
            let mut state = self.shared.state.lock().unwrap();
            *state = State::Finished(result);
            self.shared.finished.notify_all();
        }
    }
}

// ===== global functions =====

/// Waits for all workers to finish, with a global deadline.
///
/// Workers are checked without blocking in rotating order; a worker still
/// running goes to the back of the queue. Whether a worker is still running
/// and how it finished are read from the same snapshot of its state. Between two passes the
/// calling thread sleeps for 100ms.
///
/// The first failure observed aborts the wait and is returned. When the
/// deadline expires, [`Error::JoinTimeout`] names every worker still running.
/// A timeout too large to be represented as a deadline means no deadline.
/// Workers are never cancelled.
pub fn join_all<T>(
    workers: &mut [WorkerHandle<T>],
    timeout: Duration,
) -> Result<(), Error> {
    let deadline = Instant::now().checked_add(timeout);
    let mut pending = workers.iter_mut().collect::<VecDeque<_>>();

    loop {
        for _ in 0..pending.len() {
            let Some(worker) = pending.pop_front() else {
                break;
            };
            match worker.try_finish() {
                None => pending.push_back(worker),
                Some(result) => result?,
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        thread::sleep(JOIN_ALL_PASS_INTERVAL);
        if deadline.is_some_and(|deadline| Instant::now() > deadline) {
            break;
        }
    }

    let outstanding = pending
        .iter()
        .map(|worker| worker.name().to_owned())
        .collect();
    Err(Error::JoinTimeout(outstanding))
}
