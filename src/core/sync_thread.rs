//! Persistent worker thread driven by explicit start/complete/available
//! handshakes
//!
//! The boss hands a task to an idle worker with
//! [`SyncThread::signal_work_to_start`], then blocks in
//! [`SyncThread::wait_for_work_to_complete`]. The worker loops:
//!
//! ```text
//! mark_as_available -> wait_for_start_signal -> run task -> signal_parent_work_is_complete
//! ```
//!
//! The exit flag is only examined when the worker wakes from the start
//! signal, so a running task always finishes.

use crate::types::{GridError, GridResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Lifecycle of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    WaitingForStart,
    Running,
    Complete,
    Available,
    Exiting,
}

/// Outcome of one task: the body's result, or the panic message
pub type TaskOutcome<R> = Result<R, String>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // task bodies run outside every lock, so a poisoned lock holds no broken state
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Boolean flag with its own mutex and condition variable
#[derive(Debug, Default)]
struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn raise(&self) {
        let mut flag = lock(&self.flag);
        *flag = true;
        self.cond.notify_all();
    }

    fn clear(&self) {
        *lock(&self.flag) = false;
    }

    fn is_raised(&self) -> bool {
        *lock(&self.flag)
    }

    fn wait(&self) {
        let mut flag = lock(&self.flag);
        while !*flag {
            flag = self.cond.wait(flag).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_and_clear(&self) {
        let mut flag = lock(&self.flag);
        while !*flag {
            flag = self.cond.wait(flag).unwrap_or_else(PoisonError::into_inner);
        }
        *flag = false;
    }
}

/// State shared between the boss and one worker
struct Handshake<T, R> {
    start: Signal,
    complete: Signal,
    available: Signal,
    exit: AtomicBool,
    task: Mutex<Option<T>>,
    outcome: Mutex<Option<TaskOutcome<R>>>,
    state: Mutex<ThreadState>,
}

impl<T, R> Handshake<T, R> {
    fn new() -> Self {
        Self {
            start: Signal::default(),
            complete: Signal::default(),
            available: Signal::default(),
            exit: AtomicBool::new(false),
            task: Mutex::new(None),
            outcome: Mutex::new(None),
            state: Mutex::new(ThreadState::WaitingForStart),
        }
    }

    fn set_state(&self, state: ThreadState) {
        *lock(&self.state) = state;
    }

    /// Worker side: publish availability for the next task
    fn mark_as_available(&self) {
        self.set_state(ThreadState::Available);
        self.available.raise();
    }

    /// Worker side: block until started. Returns false when woken to exit.
    fn wait_for_start_signal(&self) -> bool {
        self.start.wait_and_clear();
        if self.exit.load(Ordering::SeqCst) {
            self.set_state(ThreadState::Exiting);
            return false;
        }
        true
    }

    /// Worker side: hand the outcome back and wake the boss
    fn signal_parent_work_is_complete(&self, outcome: TaskOutcome<R>) {
        *lock(&self.outcome) = Some(outcome);
        self.set_state(ThreadState::Complete);
        self.complete.raise();
    }
}

/// One named OS thread that runs tasks of type `T` and yields `R`
pub struct SyncThread<T, R> {
    name: String,
    shared: Arc<Handshake<T, R>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static, R: Send + 'static> SyncThread<T, R> {
    /// Spawn the worker. It becomes available as soon as it is running.
    pub fn spawn<F>(name: &str, body: F) -> GridResult<Self>
    where
        F: FnMut(T) -> R + Send + 'static,
    {
        let shared = Arc::new(Handshake::new());
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(worker, body))
            .map_err(|e| GridError::ThreadLifecycle(format!("Failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            shared,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand a task to the worker and wake it. Call only while it is available.
    pub fn signal_work_to_start(&self, task: T) {
        *lock(&self.shared.task) = Some(task);
        self.shared.available.clear();
        self.shared.complete.clear();
        self.shared.start.raise();
    }

    /// Block until the current task finishes and take its outcome
    pub fn wait_for_work_to_complete(&self) -> TaskOutcome<R> {
        self.shared.complete.wait_and_clear();
        lock(&self.shared.outcome)
            .take()
            .unwrap_or_else(|| Err(format!("{} completed without an outcome", self.name)))
    }

    /// Block until the worker is idle and waiting for a task
    pub fn wait_to_be_available(&self) {
        self.shared.available.wait();
    }

    pub fn avail_flag(&self) -> bool {
        self.shared.available.is_raised()
    }

    pub fn set_exit_flag(&self, exit: bool) {
        self.shared.exit.store(exit, Ordering::SeqCst);
    }

    pub fn exit_flag(&self) -> bool {
        self.shared.exit.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ThreadState {
        *lock(&self.shared.state)
    }

    /// Set the exit flag, wake the worker and join it
    pub fn shutdown(&mut self) -> GridResult<()> {
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return Ok(()),
        };
        self.set_exit_flag(true);
        self.shared.start.raise();
        handle
            .join()
            .map_err(|_| GridError::ThreadLifecycle(format!("Failed to join {}", self.name)))?;
        log::trace!("{} exited", self.name);
        Ok(())
    }
}

impl<T, R> Drop for SyncThread<T, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.exit.store(true, Ordering::SeqCst);
            self.shared.start.raise();
            if handle.join().is_err() {
                log::warn!("{} did not exit cleanly", self.name);
            }
        }
    }
}

fn run_worker<T, R, F>(shared: Arc<Handshake<T, R>>, mut body: F)
where
    F: FnMut(T) -> R,
{
    loop {
        shared.mark_as_available();
        if !shared.wait_for_start_signal() {
            break;
        }
        let task = match lock(&shared.task).take() {
            Some(task) => task,
            None => continue,
        };
        shared.set_state(ThreadState::Running);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(task))).map_err(panic_message);
        shared.signal_parent_work_is_complete(outcome);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
