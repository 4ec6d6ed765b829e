// src/sim.rs

//! In-process stand-ins for the platform collaborators.
//!
//! Lets the agent drive the real engine (queue, worker, scan, packer)
//! against a service table described in the config file, without a kernel.
//!
//! Key responsibilities:
//! - Hold the mutable "live" table and apply repairs to it.
//! - Hand out baseline snapshots and count outstanding ones.
//! - Resolve addresses against configured module ranges.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use unhooker_driver::consts::NtStatus;
use unhooker_driver::{
    Address, BaselineContext, BaselineProvider, Collaborators, DispatchTableAccessor, ModuleInfo,
    SymbolResolver,
};

use crate::config::model::{ModuleRange, TableConfig};

/// Live table; slot values change when the engine repairs them.
pub struct SimulatedTable {
    slots: Mutex<Vec<Address>>,
}

impl SimulatedTable {
    pub fn new(values: Vec<Address>) -> Self {
        Self { slots: Mutex::new(values) }
    }

    pub fn snapshot(&self) -> Vec<Address> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Overwrite a slot from outside the engine, the way a rootkit would.
    pub fn hook(&self, index: usize, value: Address) {
        if let Some(slot) = self.slots.lock().unwrap_or_else(PoisonError::into_inner).get_mut(index) {
            *slot = value;
        }
    }
}

impl DispatchTableAccessor for SimulatedTable {
    fn size(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn current_value(&self, index: usize) -> Address {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
            .unwrap_or_default()
    }

    fn write(&self, index: usize, value: Address) {
        self.hook(index, value);
    }
}

/// Baseline taken from the config; every context borrows the same values.
pub struct SnapshotBaseline {
    values: Vec<Address>,
    outstanding: AtomicUsize,
}

impl SnapshotBaseline {
    pub fn new(values: Vec<Address>) -> Self {
        Self { values, outstanding: AtomicUsize::new(0) }
    }

    /// Contexts acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

struct SnapshotContext<'a> {
    owner: &'a SnapshotBaseline,
}

impl BaselineContext for SnapshotContext<'_> {
    fn baseline_value(&self, index: usize) -> Address {
        self.owner.values.get(index).copied().unwrap_or_default()
    }
}

impl Drop for SnapshotContext<'_> {
    fn drop(&mut self) {
        self.owner.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BaselineProvider for SnapshotBaseline {
    fn acquire(&self) -> Result<Box<dyn BaselineContext + '_>, NtStatus> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(SnapshotContext { owner: self }))
    }
}

/// Resolves addresses by configured `[base, base + size)` ranges.
pub struct ModuleMap {
    modules: Vec<ModuleRange>,
}

impl ModuleMap {
    pub fn new(mut modules: Vec<ModuleRange>) -> Self {
        modules.sort_by_key(|m| m.base);
        Self { modules }
    }
}

impl SymbolResolver for ModuleMap {
    fn init(&self) -> Result<(), NtStatus> {
        Ok(())
    }

    fn lookup_module(&self, address: Address) -> Option<ModuleInfo> {
        let idx = self.modules.partition_point(|m| m.base <= address);
        let candidate = self.modules.get(idx.checked_sub(1)?)?;
        (address - candidate.base < candidate.size).then(|| ModuleInfo {
            base_address: candidate.base,
            name: candidate.name.clone(),
        })
    }
}

/// Everything the agent needs to run the engine against a simulated table.
pub struct Simulation {
    pub table: Arc<SimulatedTable>,
    pub baseline: Arc<SnapshotBaseline>,
    pub collaborators: Collaborators,
}

impl Simulation {
    pub fn from_config(cfg: &TableConfig) -> Self {
        let table = Arc::new(SimulatedTable::new(cfg.current.clone()));
        let baseline = Arc::new(SnapshotBaseline::new(cfg.baseline.clone()));
        let resolver = Arc::new(ModuleMap::new(cfg.modules.clone()));
        let collaborators = Collaborators::new(table.clone(), baseline.clone(), resolver);
        Self { table, baseline, collaborators }
    }
}
