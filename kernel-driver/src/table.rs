//! Collaborators the engine consumes but does not own.
//!
//! The platform layer supplies three pieces:
//! - [`DispatchTableAccessor`]: enumerates and physically reads/writes the
//!   service table slots.
//! - [`BaselineProvider`]: hands out a scoped [`BaselineContext`] holding the
//!   trusted original value of every slot.
//! - [`SymbolResolver`]: maps an address back to its owning module.
//!
//! They are only ever invoked from the worker thread, one task at a time, so
//! implementations need no locking beyond what `Send + Sync` demands.

use std::sync::Arc;

use crate::consts::NtStatus;

/// Raw value held by a table slot (a handler address).
pub type Address = usize;

pub trait DispatchTableAccessor: Send + Sync {
    /// Number of slots in the table.
    fn size(&self) -> usize;

    fn current_value(&self, index: usize) -> Address;

    /// Overwrite slot `index`.
    fn write(&self, index: usize, value: Address);
}

/// Trusted copy of every table value; released when dropped.
pub trait BaselineContext {
    fn baseline_value(&self, index: usize) -> Address;
}

pub trait BaselineProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn BaselineContext + '_>, NtStatus>;
}

/// A loaded module an address falls into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub base_address: Address,
    pub name: String,
}

impl ModuleInfo {
    /// Offset of `address` from the module base.
    pub fn offset_of(&self, address: Address) -> Address {
        address.wrapping_sub(self.base_address)
    }
}

pub trait SymbolResolver: Send + Sync {
    /// Refresh whatever module list the lookups run against.
    fn init(&self) -> Result<(), NtStatus>;

    fn lookup_module(&self, address: Address) -> Option<ModuleInfo>;
}

/// The set of collaborators a device is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub table: Arc<dyn DispatchTableAccessor>,
    pub baseline: Arc<dyn BaselineProvider>,
    pub resolver: Arc<dyn SymbolResolver>,
}

impl Collaborators {
    pub fn new(
        table: Arc<dyn DispatchTableAccessor>,
        baseline: Arc<dyn BaselineProvider>,
        resolver: Arc<dyn SymbolResolver>,
    ) -> Self {
        Self { table, baseline, resolver }
    }
}

/// Transient view of one slot during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub index: usize,
    pub current: Address,
    pub baseline: Address,
}

impl SnapshotEntry {
    pub fn is_hooked(&self) -> bool {
        self.current != self.baseline
    }
}
