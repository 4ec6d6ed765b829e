//! Service table unhooker.
//!
//! Detects and repairs modified entries of the system service dispatch
//! table. Every table access (report or repair) is funnelled through one
//! task queue and executed by a single worker thread, so concurrent callers
//! always see a consistent table and never race a repair in progress.
//!
//! Layout:
//! - [`queue`] / [`task`] / [`worker`]: the serialized execution engine.
//! - [`hooks`]: the scan and its repair/report handlers.
//! - [`report`]: bounds-checked report packing.
//! - [`dispatch`] / [`device`]: control codes in, statuses out.
//! - [`table`]: the collaborators the platform layer must provide.

mod macros;

pub mod consts;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod queue;
pub mod report;
pub mod table;
pub mod task;
pub mod worker;

pub use device::{DeviceConfig, IrpCompletion, IrpRequest, UnhookerDevice};
pub use dispatch::{ControlCode, Dispatcher};
pub use error::{DrvError, DrvResult, InitStage};
pub use hooks::{ScanSummary, UNKNOWN_MODULE};
pub use table::{
    Address, BaselineContext, BaselineProvider, Collaborators, DispatchTableAccessor, ModuleInfo,
    SymbolResolver,
};
pub use worker::{InlineScheduler, Scheduler, WorkerConfig, WorkerState, WorkerThread};
