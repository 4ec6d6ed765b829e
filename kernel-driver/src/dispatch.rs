//! Control-code dispatcher.
//!
//! Turns a device control request into a task, queues it, and blocks the
//! calling thread until the worker has finished it. Callers never time out
//! and cannot cancel: once a table operation is queued it runs to the end.

use std::sync::Arc;

use log::Level;
use shared::constants::{IOCTL_UNHOOKER_GET_STATUS, IOCTL_UNHOOKER_UNHOOK};
use shared::report::REPORT_HEADER_SIZE;

use crate::drv_log;
use crate::error::{DrvError, DrvResult};
use crate::hooks::{Repair, RepairJob, ReportJob, Reporter, ScanSummary};
use crate::queue::TaskQueue;
use crate::report::ReportPacker;
use crate::table::Collaborators;
use crate::task::{Job, Task};
use crate::worker::{Scheduler, WorkerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    GetStatus,
    Unhook,
}

impl TryFrom<u32> for ControlCode {
    type Error = DrvError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            IOCTL_UNHOOKER_GET_STATUS => Ok(ControlCode::GetStatus),
            IOCTL_UNHOOKER_UNHOOK => Ok(ControlCode::Unhook),
            other => Err(DrvError::InvalidRequest(other)),
        }
    }
}

pub struct Dispatcher {
    queue: Arc<TaskQueue>,
    scheduler: Box<dyn Scheduler>,
    collaborators: Collaborators,
    unknown_module: String,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<TaskQueue>,
        scheduler: Box<dyn Scheduler>,
        collaborators: Collaborators,
        unknown_module: impl Into<String>,
    ) -> Self {
        Self { queue, scheduler, collaborators, unknown_module: unknown_module.into() }
    }

    /// Queue `job`, wake the worker and wait for it to finish.
    ///
    /// The returned task is complete; its job holds any results.
    pub fn submit<J: Job>(&self, job: J) -> DrvResult<Arc<Task<J>>> {
        let task = Task::new(job);
        let seq = self.queue.push_back(task.clone())?;
        self.scheduler.notify();
        task.wait()?;
        drv_log!(Level::Debug, "dispatch", "{} #{} completed", task.with_job(|j| j.name()), seq);
        Ok(task)
    }

    /// Scan and pack a report into `out`. Returns the packed size.
    pub fn get_status(&self, out: &mut [u8]) -> DrvResult<usize> {
        if out.len() < REPORT_HEADER_SIZE {
            return Err(DrvError::BufferTooSmall { needed: REPORT_HEADER_SIZE, available: out.len() });
        }
        let reporter = Reporter::new(ReportPacker::new(out.len())?, self.unknown_module.as_str());
        let task = self.submit(ReportJob::new(self.collaborators.clone(), reporter))?;

        Ok(task.with_job(|job| {
            let packed = job.handler().packer().packed();
            out[..packed.len()].copy_from_slice(packed);
            packed.len()
        }))
    }

    /// Scan and restore every modified slot.
    pub fn unhook(&self) -> DrvResult<ScanSummary> {
        let task = self.submit(RepairJob::new(self.collaborators.clone(), Repair::default()))?;
        Ok(task.with_job(|job| job.summary().unwrap_or_default()))
    }

    /// Route a raw control code. Returns the number of output bytes written.
    pub fn device_control(&self, code: u32, out: &mut [u8]) -> DrvResult<usize> {
        match ControlCode::try_from(code)? {
            ControlCode::GetStatus => self.get_status(out),
            ControlCode::Unhook => self.unhook().map(|_| 0),
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        self.scheduler.state()
    }

    /// Tasks accepted but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
