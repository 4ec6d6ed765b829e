//! Unhooker device: request routing and lifetime.
//!
//!  * Create/Close are acknowledged without touching the engine.
//!  * DeviceControl goes through the [`Dispatcher`].
//!  * Anything else is `STATUS_INVALID_DEVICE_REQUEST`.
//!
//! Dropping the device stops the worker and waits for it to exit, so the
//! worker never outlives the device.

use std::sync::Arc;

use log::Level;
use shared::constants::DEVICE_NAME;

use crate::consts::{NtStatus, STATUS_INVALID_DEVICE_REQUEST, STATUS_SUCCESS};
use crate::dispatch::Dispatcher;
use crate::drv_log;
use crate::error::DrvResult;
use crate::hooks::UNKNOWN_MODULE;
use crate::queue::TaskQueue;
use crate::table::Collaborators;
use crate::worker::{Scheduler, WorkerConfig, WorkerThread};

pub const IRP_MJ_CREATE: u8 = 0x00;
pub const IRP_MJ_CLOSE: u8 = 0x02;
pub const IRP_MJ_DEVICE_CONTROL: u8 = 0x0e;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub worker: WorkerConfig,
    /// Name packed for hooks that resolve to no module.
    pub unknown_module: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { worker: WorkerConfig::default(), unknown_module: UNKNOWN_MODULE.into() }
    }
}

/// One I/O request as seen by the device.
#[derive(Debug)]
pub enum IrpRequest<'a> {
    Create,
    Close,
    DeviceControl { code: u32, output: &'a mut [u8] },
    Other { major: u8 },
}

impl IrpRequest<'_> {
    pub fn major(&self) -> u8 {
        match self {
            IrpRequest::Create => IRP_MJ_CREATE,
            IrpRequest::Close => IRP_MJ_CLOSE,
            IrpRequest::DeviceControl { .. } => IRP_MJ_DEVICE_CONTROL,
            IrpRequest::Other { major } => *major,
        }
    }
}

/// Final status and `Information` (bytes returned) of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrpCompletion {
    pub status: NtStatus,
    pub information: usize,
}

/// Finish a request with the given status.
pub fn complete(status: NtStatus, information: usize) -> IrpCompletion {
    IrpCompletion { status, information }
}

pub struct UnhookerDevice {
    dispatcher: Dispatcher,
}

impl UnhookerDevice {
    /// Allocate the queue and start the worker thread.
    pub fn create(collaborators: Collaborators, config: DeviceConfig) -> DrvResult<Self> {
        let queue = Arc::new(TaskQueue::new());
        let worker = WorkerThread::spawn(Arc::clone(&queue), &config.worker)?;
        drv_log!(Level::Info, "device", "{} ready", DEVICE_NAME);
        Ok(Self::assemble(queue, Box::new(worker), collaborators, config))
    }

    /// Build a device over a caller-supplied scheduler, e.g. an
    /// [`InlineScheduler`](crate::worker::InlineScheduler) in tests.
    pub fn with_scheduler(
        collaborators: Collaborators,
        config: DeviceConfig,
        make_scheduler: impl FnOnce(Arc<TaskQueue>) -> Box<dyn Scheduler>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let scheduler = make_scheduler(Arc::clone(&queue));
        Self::assemble(queue, scheduler, collaborators, config)
    }

    fn assemble(
        queue: Arc<TaskQueue>,
        scheduler: Box<dyn Scheduler>,
        collaborators: Collaborators,
        config: DeviceConfig,
    ) -> Self {
        Self { dispatcher: Dispatcher::new(queue, scheduler, collaborators, config.unknown_module) }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatch(&self, request: IrpRequest<'_>) -> IrpCompletion {
        match request {
            IrpRequest::Create | IrpRequest::Close => complete(STATUS_SUCCESS, 0),
            IrpRequest::DeviceControl { code, output } => {
                match self.dispatcher.device_control(code, output) {
                    Ok(written) => complete(STATUS_SUCCESS, written),
                    Err(e) => {
                        drv_log!(Level::Warn, "device", "control code {:#010x} failed: {}", code, e);
                        complete(e.status(), 0)
                    }
                }
            }
            IrpRequest::Other { major } => {
                drv_log!(Level::Debug, "device", "unsupported major function {:#04x}", major);
                complete(STATUS_INVALID_DEVICE_REQUEST, 0)
            }
        }
    }
}

impl Drop for UnhookerDevice {
    fn drop(&mut self) {
        drv_log!(Level::Info, "device", "{} unloading", DEVICE_NAME);
    }
}
