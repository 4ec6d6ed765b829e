//! Thread-safe FIFO of pending tasks.
//!
//! Push and pop share one lock, so every accepted task is observed exactly
//! once and in acceptance order. A queue whose lock was poisoned, or which
//! the worker closed after a fault, refuses all further pushes.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use log::Level;

use crate::drv_log;
use crate::error::{DrvError, DrvResult};
use crate::task::TaskHandle;

struct Inner {
    tasks: VecDeque<TaskHandle>,
    next_seq: u64,
    closed: bool,
}

pub struct TaskQueue {
    inner: Mutex<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { tasks: VecDeque::new(), next_seq: 1, closed: false }),
        }
    }

    fn guard(&self) -> DrvResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| DrvError::QueueFailure)
    }

    /// Append `task` and return the sequence number it was accepted under.
    pub fn push_back(&self, task: TaskHandle) -> DrvResult<u64> {
        let mut inner = self.guard()?;
        if inner.closed {
            return Err(DrvError::QueueFailure);
        }
        inner
            .tasks
            .try_reserve(1)
            .map_err(|_| DrvError::AllocationFailure)?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        task.mark_queued(seq);
        inner.tasks.push_back(task);
        drv_log!(Level::Debug, "queue", "accepted task #{} ({} pending)", seq, inner.tasks.len());
        Ok(seq)
    }

    /// Remove the head. Returns the task (if any) and whether the queue is
    /// empty afterwards.
    pub fn pop_first(&self) -> DrvResult<(Option<TaskHandle>, bool)> {
        let mut inner = self.guard()?;
        let task = inner.tasks.pop_front();
        Ok((task, inner.tasks.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.tasks.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue for good and fail every task still in it with `err`.
    /// Works on a poisoned queue too. Returns how many tasks were failed.
    pub fn close(&self, err: DrvError) -> usize {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.closed = true;
        let stranded: Vec<TaskHandle> = inner.tasks.drain(..).collect();
        drop(inner);

        for task in &stranded {
            task.abort(err.clone());
        }
        stranded.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.closed)
            .unwrap_or(true)
    }

    /// Poison the queue lock, as a panic inside a critical section would.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = self.inner.lock();
                panic!("poisoning task queue");
            })
            .join()
        });
    }
}
