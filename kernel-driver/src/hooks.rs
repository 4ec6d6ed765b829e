//! Service table scan and the two things a scan can do about a hook.
//!
//! One loop compares every slot with its baseline; what happens on a
//! mismatch is decided by the [`HookHandler`] the job was built with:
//! - [`Repair`] writes the baseline value back.
//! - [`Reporter`] resolves the hooking module and packs a report record.
//!
//! The baseline context is scoped to one scan and released on every exit
//! path. Setup failures surface as `InitFailure` before any slot is read.

use log::Level;

use crate::drv_log;
use crate::error::{DrvError, DrvResult, InitStage};
use crate::report::ReportPacker;
use crate::table::{Collaborators, SnapshotEntry};
use crate::task::Job;

/// What a handler wants after dealing with one hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFlow {
    Continue,
    Stop,
}

pub trait HookHandler: Send + 'static {
    const NAME: &'static str;

    /// Runs after the baseline is acquired and before the first slot.
    fn prepare(&mut self, _collaborators: &Collaborators) -> DrvResult<()> {
        Ok(())
    }

    fn on_hook(&mut self, collaborators: &Collaborators, entry: &SnapshotEntry) -> DrvResult<ScanFlow>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub mismatched: usize,
}

/// Walk the table once, handing every mismatch to `handler`.
///
/// Stops at the first handler error, which becomes the scan result.
pub fn scan<H: HookHandler>(collaborators: &Collaborators, handler: &mut H) -> DrvResult<ScanSummary> {
    let baseline = collaborators.baseline.acquire().map_err(|status| {
        drv_log!(Level::Error, "scan", "baseline unavailable (status {:#010x})", status);
        DrvError::InitFailure { stage: InitStage::Baseline, status }
    })?;

    handler.prepare(collaborators)?;

    let table = &collaborators.table;
    let mut summary = ScanSummary::default();
    for index in 0..table.size() {
        let entry = SnapshotEntry {
            index,
            current: table.current_value(index),
            baseline: baseline.baseline_value(index),
        };
        summary.scanned += 1;
        if !entry.is_hooked() {
            continue;
        }

        summary.mismatched += 1;
        if handler.on_hook(collaborators, &entry)? == ScanFlow::Stop {
            break;
        }
    }

    drv_log!(
        Level::Debug,
        "scan",
        "{}: {} slot(s) scanned, {} modified",
        H::NAME,
        summary.scanned,
        summary.mismatched
    );
    Ok(summary)
}

/// A scan bound to its collaborators and handler; runs as a task.
pub struct ScanJob<H: HookHandler> {
    collaborators: Collaborators,
    handler: H,
    summary: Option<ScanSummary>,
}

impl<H: HookHandler> ScanJob<H> {
    pub fn new(collaborators: Collaborators, handler: H) -> Self {
        Self { collaborators, handler, summary: None }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Outcome of the last successful execution.
    pub fn summary(&self) -> Option<ScanSummary> {
        self.summary
    }
}

impl<H: HookHandler> Job for ScanJob<H> {
    fn execute(&mut self) -> DrvResult<()> {
        self.summary = Some(scan(&self.collaborators, &mut self.handler)?);
        Ok(())
    }

    fn name(&self) -> &'static str {
        H::NAME
    }
}

/*──────────────────────────── repair ────────────────────────────────────*/

/// Restores every modified slot to its baseline value.
#[derive(Debug, Default)]
pub struct Repair {
    pub restored: usize,
}

impl HookHandler for Repair {
    const NAME: &'static str = "repair";

    fn on_hook(&mut self, collaborators: &Collaborators, entry: &SnapshotEntry) -> DrvResult<ScanFlow> {
        drv_log!(
            Level::Warn,
            "scan",
            "restoring slot {}: {:#x} -> {:#x}",
            entry.index,
            entry.current,
            entry.baseline
        );
        collaborators.table.write(entry.index, entry.baseline);
        self.restored += 1;
        Ok(ScanFlow::Continue)
    }
}

pub type RepairJob = ScanJob<Repair>;

/*──────────────────────────── report ────────────────────────────────────*/

/// Name packed when the hooking address belongs to no known module.
pub const UNKNOWN_MODULE: &str = "-unknown-";

/// Resolves each hook to its module and packs it into the report.
pub struct Reporter {
    packer: ReportPacker,
    unknown_module: String,
}

impl Reporter {
    pub fn new(packer: ReportPacker, unknown_module: impl Into<String>) -> Self {
        Self { packer, unknown_module: unknown_module.into() }
    }

    pub fn packer(&self) -> &ReportPacker {
        &self.packer
    }
}

impl HookHandler for Reporter {
    const NAME: &'static str = "report";

    fn prepare(&mut self, collaborators: &Collaborators) -> DrvResult<()> {
        collaborators.resolver.init().map_err(|status| {
            drv_log!(Level::Error, "scan", "symbol resolver unavailable (status {:#010x})", status);
            DrvError::InitFailure { stage: InitStage::Resolver, status }
        })
    }

    fn on_hook(&mut self, collaborators: &Collaborators, entry: &SnapshotEntry) -> DrvResult<ScanFlow> {
        let module = collaborators.resolver.lookup_module(entry.current);
        let name = match &module {
            Some(m) => {
                drv_log!(
                    Level::Warn,
                    "scan",
                    "slot {} hooked: {:#x} (expected {:#x}) in {}+{:#x}",
                    entry.index,
                    entry.current,
                    entry.baseline,
                    m.name,
                    m.offset_of(entry.current)
                );
                m.name.as_str()
            }
            None => {
                drv_log!(
                    Level::Warn,
                    "scan",
                    "slot {} hooked: {:#x} (expected {:#x}) outside any module",
                    entry.index,
                    entry.current,
                    entry.baseline
                );
                self.unknown_module.as_str()
            }
        };

        self.packer.count_modified();
        self.packer.append(entry.index, entry.baseline, entry.current, name.as_bytes());
        Ok(ScanFlow::Continue)
    }
}

pub type ReportJob = ScanJob<Reporter>;
