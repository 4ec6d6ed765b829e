//! Shared tasks: the unit of work passed from a submitter to the worker.
//!
//! A task is created by the submitter, handed to the queue as a type-erased
//! [`TaskHandle`], executed once on the worker thread, and then signalled
//! complete. Both sides hold an `Arc`; the task is freed when the submitter
//! has read the result and the worker has dropped its handle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::Level;

use crate::drv_log;
use crate::error::{DrvError, DrvResult};

/// Work executed on the worker thread.
pub trait Job: Send + 'static {
    fn execute(&mut self) -> DrvResult<()>;

    /// Short label for log lines.
    fn name(&self) -> &'static str {
        "job"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Running,
    Completed,
}

/// Queue/worker side of a task.
pub trait Runnable: Send + Sync {
    /// Record acceptance into the queue under sequence number `seq`.
    fn mark_queued(&self, seq: u64);

    /// Execute and signal completion. Called at most once.
    ///
    /// The task is always completed on return. `Err` means the job panicked
    /// and the consumer must stop taking work.
    fn run(&self) -> DrvResult<()>;

    /// Complete without executing.
    fn abort(&self, err: DrvError);

    fn seq(&self) -> u64;

    fn name(&self) -> &'static str;
}

pub type TaskHandle = Arc<dyn Runnable>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Progress {
    state: TaskState,
    seq: u64,
    status: Option<DrvResult<()>>,
}

pub struct Task<J: Job> {
    job: Mutex<J>,
    name: &'static str,
    progress: Mutex<Progress>,
    completed: Condvar,
}

impl<J: Job> Task<J> {
    pub fn new(job: J) -> Arc<Self> {
        let name = job.name();
        Arc::new(Self {
            job: Mutex::new(job),
            name,
            progress: Mutex::new(Progress { state: TaskState::Created, seq: 0, status: None }),
            completed: Condvar::new(),
        })
    }

    pub fn state(&self) -> TaskState {
        lock(&self.progress).state
    }

    /// Block until the worker has finished with this task, then return its
    /// status. There is no timeout: a submitted task always runs to the end.
    pub fn wait(&self) -> DrvResult<()> {
        let mut progress = lock(&self.progress);
        while progress.state != TaskState::Completed {
            progress = self
                .completed
                .wait(progress)
                .unwrap_or_else(PoisonError::into_inner);
        }
        progress.status.clone().unwrap_or(Err(DrvError::QueueFailure))
    }

    /// Access the job, typically after [`wait`](Self::wait) to pull out results.
    pub fn with_job<R>(&self, f: impl FnOnce(&mut J) -> R) -> R {
        f(&mut lock(&self.job))
    }

    fn complete(&self, status: DrvResult<()>) {
        let mut progress = lock(&self.progress);
        progress.state = TaskState::Completed;
        progress.status = Some(status);
        self.completed.notify_all();
    }
}

impl<J: Job> Runnable for Task<J> {
    fn mark_queued(&self, seq: u64) {
        let mut progress = lock(&self.progress);
        progress.state = TaskState::Queued;
        progress.seq = seq;
    }

    fn run(&self) -> DrvResult<()> {
        {
            let mut progress = lock(&self.progress);
            if progress.state == TaskState::Completed {
                return Ok(());
            }
            progress.state = TaskState::Running;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| lock(&self.job).execute())) {
            Ok(status) => {
                if let Err(e) = &status {
                    drv_log!(Level::Debug, "task", "{} #{} failed: {}", self.name, self.seq(), e);
                }
                self.complete(status);
                Ok(())
            }
            Err(_) => {
                drv_log!(Level::Error, "task", "{} #{} panicked", self.name, self.seq());
                self.complete(Err(DrvError::QueueFailure));
                Err(DrvError::QueueFailure)
            }
        }
    }

    fn abort(&self, err: DrvError) {
        self.complete(Err(err));
    }

    fn seq(&self) -> u64 {
        lock(&self.progress).seq
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
