//! Contract between the unhooker device and user-mode consumers.
//!
//! Everything here must stay in lock-step on both sides of the device
//! boundary: control codes, device names, and the packed report layout.

pub mod constants;
pub mod report;

pub use constants::*;
pub use report::{Report, ReportEntry, ReportError, ReportHeader, EntryHeader};
