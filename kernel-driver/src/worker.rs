//! The single consumer of the task queue.
//!
//! Every scan, repair and report runs on exactly one thread, one task at a
//! time, so table access needs no lock of its own. The thread waits on two
//! events, "work available" and "stop requested"; on work it drains the
//! queue until it reports empty and goes back to waiting.
//!
//! Key responsibilities:
//! - Own the lifetime of the worker thread (spawn, stop, join on drop).
//! - Turn a queue fault into a hard failure for every pending and future task.
//! - Offer an in-process [`InlineScheduler`] with the same contract for tests.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use log::Level;

use crate::drv_log;
use crate::error::{DrvError, DrvResult};
use crate::queue::TaskQueue;

/*──────────────────────────── state ─────────────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    WaitingForWork = 0,
    Draining = 1,
    Stopped = 2,
    /// The queue failed; nothing will ever run again.
    Faulted = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::WaitingForWork,
            1 => WorkerState::Draining,
            2 => WorkerState::Stopped,
            _ => WorkerState::Faulted,
        }
    }
}

#[derive(Debug, Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/*──────────────────────────── scheduler seam ────────────────────────────*/

/// Something that eventually drains the queue after being notified.
pub trait Scheduler: Send + Sync {
    /// Signal "work available".
    fn notify(&self);

    fn state(&self) -> WorkerState;
}

/// Pop and execute until the queue reports empty.
///
/// Returns how many tasks ran. A pop failure or a panicking job is
/// returned as-is; the caller decides how to fault.
pub fn drain(queue: &TaskQueue) -> DrvResult<usize> {
    let mut executed = 0;
    loop {
        let (task, empty) = queue.pop_first()?;
        if let Some(task) = task {
            drv_log!(Level::Debug, "worker", "running {} #{}", task.name(), task.seq());
            task.run()?;
            executed += 1;
        }
        if empty {
            return Ok(executed);
        }
    }
}

/// Fail everything queued and refuse new work.
fn fault(queue: &TaskQueue, state: &SharedState, err: DrvError) {
    state.set(WorkerState::Faulted);
    let stranded = queue.close(DrvError::QueueFailure);
    drv_log!(
        Level::Error,
        "worker",
        "worker fault ({}); worker stopped, {} pending task(s) failed",
        err,
        stranded
    );
}

/*──────────────────────────── worker thread ─────────────────────────────*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub thread_name: String,
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { thread_name: "unhooker-worker".into(), stack_size: None }
    }
}

/// One long-lived background thread. Dropping it signals stop and waits
/// for the thread to exit.
pub struct WorkerThread {
    work_tx: Sender<()>,
    stop_tx: Sender<()>,
    state: Arc<SharedState>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn(queue: Arc<TaskQueue>, config: &WorkerConfig) -> DrvResult<Self> {
        // capacity 1: repeated notifications coalesce like an auto-reset event
        let (work_tx, work_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let state = Arc::new(SharedState::default());

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let thread_state = Arc::clone(&state);
        let handle = builder
            .spawn(move || worker_loop(&queue, &thread_state, &work_rx, &stop_rx))
            .map_err(|e| {
                drv_log!(Level::Error, "worker", "failed to start worker thread: {}", e);
                DrvError::AllocationFailure
            })?;

        drv_log!(Level::Info, "worker", "started {:?}", config.thread_name);
        Ok(Self { work_tx, stop_tx, state, handle: Some(handle) })
    }
}

fn worker_loop(queue: &TaskQueue, state: &SharedState, work_rx: &Receiver<()>, stop_rx: &Receiver<()>) {
    loop {
        // A pending wake-up wins over stop; `select!` alone picks at random.
        let woken = work_rx.try_recv().is_ok()
            || crossbeam::select! {
                recv(work_rx) -> signal => signal.is_ok(),
                recv(stop_rx) -> _ => false,
            };
        if !woken {
            break;
        }

        state.set(WorkerState::Draining);
        match drain(queue) {
            Ok(n) => {
                drv_log!(Level::Debug, "worker", "drained {} task(s)", n);
                state.set(WorkerState::WaitingForWork);
            }
            Err(e) => {
                fault(queue, state, e);
                return;
            }
        }
    }

    let leftover = queue.close(DrvError::QueueFailure);
    if leftover > 0 {
        drv_log!(Level::Warn, "worker", "stopped with {} task(s) still queued", leftover);
    }
    state.set(WorkerState::Stopped);
    drv_log!(Level::Info, "worker", "stopped");
}

impl Scheduler for WorkerThread {
    fn notify(&self) {
        // Full means a wake-up is already pending.
        let _ = self.work_tx.try_send(());
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                drv_log!(Level::Error, "worker", "worker thread panicked");
            }
        }
    }
}

/*──────────────────────────── inline scheduler ──────────────────────────*/

/// Runs the drain on the notifying thread. A lock keeps concurrent
/// notifiers from executing tasks side by side.
pub struct InlineScheduler {
    queue: Arc<TaskQueue>,
    state: SharedState,
    exclusive: Mutex<()>,
}

impl InlineScheduler {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue, state: SharedState::default(), exclusive: Mutex::new(()) }
    }
}

impl Scheduler for InlineScheduler {
    fn notify(&self) {
        let _guard = self.exclusive.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state.get() == WorkerState::Faulted {
            return;
        }
        self.state.set(WorkerState::Draining);
        match drain(&self.queue) {
            Ok(_) => self.state.set(WorkerState::WaitingForWork),
            Err(e) => fault(&self.queue, &self.state, e),
        }
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }
}
