//! Engine tests against in-memory collaborators.
//!
//! Direct testing against a live service table is impractical, so these
//! tests wire the device to mock table/baseline/resolver implementations
//! and drive it through the same control codes user-mode tools use.
//!
//! Key responsibilities:
//! - Check report contents, truncation and buffer bounds.
//! - Check repair correctness and idempotence.
//! - Check FIFO order and single-task exclusivity under concurrent callers.
//! - Check rejection paths (small buffer, unknown code, failed setup).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use shared::constants::{IOCTL_UNHOOKER_GET_STATUS, IOCTL_UNHOOKER_UNHOOK};
use shared::report::{Report, REPORT_ENTRY_SIZE, REPORT_HEADER_SIZE};
use unhooker_driver::consts::{
    NtStatus, STATUS_BUFFER_OVERFLOW, STATUS_INTERNAL_ERROR, STATUS_INVALID_DEVICE_REQUEST, STATUS_SUCCESS,
    STATUS_UNSUCCESSFUL,
};
use unhooker_driver::task::{Job, Runnable};
use unhooker_driver::{
    Address, BaselineContext, BaselineProvider, Collaborators, DeviceConfig, DispatchTableAccessor, DrvError,
    DrvResult, InitStage, InlineScheduler, IrpRequest, ModuleInfo, SymbolResolver, UnhookerDevice,
    WorkerState, UNKNOWN_MODULE,
};

/*──────────────────────────── mocks ─────────────────────────────────────*/

const A: Address = 0x1000;
const B: Address = 0x1010;
const C: Address = 0x1020;
const D: Address = 0x1030;
const E: Address = 0x1040;
const X: Address = 0x9000;
const Y: Address = 0x9100;

struct MockTable {
    values: Mutex<Vec<Address>>,
    writes: AtomicUsize,
}

impl MockTable {
    fn new(values: &[Address]) -> Arc<Self> {
        Arc::new(Self { values: Mutex::new(values.to_vec()), writes: AtomicUsize::new(0) })
    }

    fn snapshot(&self) -> Vec<Address> {
        self.values.lock().unwrap().clone()
    }

    fn hook(&self, index: usize, value: Address) {
        self.values.lock().unwrap()[index] = value;
    }
}

impl DispatchTableAccessor for MockTable {
    fn size(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    fn current_value(&self, index: usize) -> Address {
        self.values.lock().unwrap()[index]
    }

    fn write(&self, index: usize, value: Address) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values.lock().unwrap()[index] = value;
    }
}

struct MockBaseline {
    values: Vec<Address>,
    status: Option<NtStatus>,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl MockBaseline {
    fn new(values: &[Address]) -> Arc<Self> {
        Arc::new(Self {
            values: values.to_vec(),
            status: None,
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn failing(status: NtStatus) -> Arc<Self> {
        Arc::new(Self {
            values: Vec::new(),
            status: Some(status),
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }
}

struct MockContext<'a> {
    values: &'a [Address],
    released: &'a AtomicUsize,
}

impl BaselineContext for MockContext<'_> {
    fn baseline_value(&self, index: usize) -> Address {
        self.values[index]
    }
}

impl Drop for MockContext<'_> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl BaselineProvider for MockBaseline {
    fn acquire(&self) -> Result<Box<dyn BaselineContext + '_>, NtStatus> {
        if let Some(status) = self.status {
            return Err(status);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext { values: &self.values, released: &self.released }))
    }
}

struct MockResolver {
    modules: Vec<(Address, usize, &'static str)>,
    init_status: Option<NtStatus>,
}

impl MockResolver {
    fn new() -> Arc<Self> {
        Arc::new(Self { modules: vec![(0x9000, 0x1000, "rootkit.sys")], init_status: None })
    }
}

impl SymbolResolver for MockResolver {
    fn init(&self) -> Result<(), NtStatus> {
        self.init_status.map_or(Ok(()), Err)
    }

    fn lookup_module(&self, address: Address) -> Option<ModuleInfo> {
        self.modules
            .iter()
            .find(|(base, size, _)| (*base..*base + *size).contains(&address))
            .map(|(base, _, name)| ModuleInfo { base_address: *base, name: (*name).to_owned() })
    }
}

struct Fixture {
    table: Arc<MockTable>,
    baseline: Arc<MockBaseline>,
    collaborators: Collaborators,
}

fn fixture(current: &[Address], baseline: &[Address]) -> Fixture {
    let table = MockTable::new(current);
    let baseline = MockBaseline::new(baseline);
    let collaborators = Collaborators::new(table.clone(), baseline.clone(), MockResolver::new());
    Fixture { table, baseline, collaborators }
}

fn scenario_a() -> Fixture {
    fixture(&[A, X, C, Y, E], &[A, B, C, D, E])
}

fn threaded(f: &Fixture) -> UnhookerDevice {
    UnhookerDevice::create(f.collaborators.clone(), DeviceConfig::default()).unwrap()
}

fn inline(f: &Fixture) -> UnhookerDevice {
    UnhookerDevice::with_scheduler(f.collaborators.clone(), DeviceConfig::default(), |queue| {
        Box::new(InlineScheduler::new(queue))
    })
}

fn get_status(device: &UnhookerDevice, capacity: usize) -> (NtStatus, Vec<u8>) {
    let mut out = vec![0u8; capacity];
    let done = device.dispatch(IrpRequest::DeviceControl { code: IOCTL_UNHOOKER_GET_STATUS, output: &mut out });
    out.truncate(done.information);
    (done.status, out)
}

fn unhook(device: &UnhookerDevice) -> NtStatus {
    let done = device.dispatch(IrpRequest::DeviceControl { code: IOCTL_UNHOOKER_UNHOOK, output: &mut [] });
    assert_eq!(done.information, 0);
    done.status
}

/*──────────────────────────── scenarios ─────────────────────────────────*/

#[test]
fn scenario_a_report_then_unhook() {
    let f = scenario_a();
    let device = threaded(&f);

    let (status, bytes) = get_status(&device, 4096);
    assert_eq!(status, STATUS_SUCCESS);
    let report = Report::parse(&bytes).unwrap();
    assert_eq!(report.header.modified_count, 2);
    assert_eq!(report.header.entry_count, 2);
    assert_eq!(report.entries[0].table_index, 1);
    assert_eq!(report.entries[0].current_address, X);
    assert_eq!(report.entries[0].baseline_address, B);
    assert_eq!(report.entries[0].module_name, "rootkit.sys");
    assert_eq!(report.entries[1].table_index, 3);
    assert_eq!(report.entries[1].current_address, Y);
    assert_eq!(f.table.snapshot(), vec![A, X, C, Y, E], "report must not modify the table");

    assert_eq!(unhook(&device), STATUS_SUCCESS);
    assert_eq!(f.table.snapshot(), vec![A, B, C, D, E]);
}

#[test]
fn scenario_b_small_buffer_is_rejected_before_scanning() {
    let f = scenario_a();
    let device = inline(&f);

    let (status, bytes) = get_status(&device, REPORT_HEADER_SIZE - 1);
    assert_eq!(status, STATUS_BUFFER_OVERFLOW);
    assert!(bytes.is_empty());
    assert_eq!(f.baseline.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(f.table.snapshot(), vec![A, X, C, Y, E]);
    assert_eq!(
        device.dispatcher().get_status(&mut [0u8; 4]),
        Err(DrvError::BufferTooSmall { needed: REPORT_HEADER_SIZE, available: 4 })
    );
}

#[test]
fn scenario_c_report_truncates_silently() {
    let f = scenario_a();
    let device = threaded(&f);
    let capacity = REPORT_HEADER_SIZE + REPORT_ENTRY_SIZE + "rootkit.sys".len();

    let (status, bytes) = get_status(&device, capacity);
    assert_eq!(status, STATUS_SUCCESS);
    assert_eq!(bytes.len(), capacity);
    let report = Report::parse(&bytes).unwrap();
    assert_eq!(report.header.modified_count, 2);
    assert_eq!(report.header.entry_count, 1);
    assert!(report.is_truncated());
    assert_eq!(report.entries[0].table_index, 1);
}

#[test]
fn scenario_d_unknown_code_queues_nothing() {
    let f = scenario_a();
    let device = inline(&f);
    let mut out = [0u8; 64];

    let done = device.dispatch(IrpRequest::DeviceControl { code: 0x0022_2008, output: &mut out });
    assert_eq!(done.status, STATUS_INVALID_DEVICE_REQUEST);
    assert_eq!(done.information, 0);
    assert_eq!(device.dispatcher().pending(), 0);
    assert_eq!(f.baseline.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(
        device.dispatcher().device_control(0x0022_2008, &mut out),
        Err(DrvError::InvalidRequest(0x0022_2008))
    );
}

/*──────────────────────────── properties ────────────────────────────────*/

#[test]
fn unhook_is_idempotent() {
    let f = scenario_a();
    let device = inline(&f);

    let first = device.dispatcher().unhook().unwrap();
    assert_eq!(first.mismatched, 2);
    let second = device.dispatcher().unhook().unwrap();
    assert_eq!(second.mismatched, 0);
    assert_eq!(f.table.writes.load(Ordering::SeqCst), 2);
}

#[test]
fn report_never_exceeds_caller_capacity() {
    let current: Vec<Address> = (0..64).map(|i| if i % 3 == 0 { X + i } else { A + i }).collect();
    let baseline: Vec<Address> = (0..64).map(|i| A + i).collect();
    let f = fixture(&current, &baseline);
    let device = inline(&f);

    for capacity in (REPORT_HEADER_SIZE..REPORT_HEADER_SIZE + 6 * REPORT_ENTRY_SIZE).step_by(5) {
        let mut out = vec![0u8; capacity];
        let written = device.dispatcher().get_status(&mut out).unwrap();
        assert!(written <= capacity);
        let report = Report::parse(&out[..written]).unwrap();
        assert_eq!(report.header.modified_count, 22);
        assert!(report.entries.windows(2).all(|w| w[0].table_index < w[1].table_index));
    }
}

#[test]
fn baseline_is_released_after_every_scan() {
    let f = scenario_a();
    let device = threaded(&f);

    get_status(&device, 512);
    unhook(&device);
    get_status(&device, 512);

    assert_eq!(f.baseline.acquired.load(Ordering::SeqCst), 3);
    assert_eq!(f.baseline.released.load(Ordering::SeqCst), 3);
}

#[test]
fn unresolved_hook_gets_placeholder_name() {
    let f = fixture(&[A, 0x4242], &[A, B]);
    let device = inline(&f);

    let (_, bytes) = get_status(&device, 512);
    let report = Report::parse(&bytes).unwrap();
    assert_eq!(report.entries[0].module_name, UNKNOWN_MODULE);
}

#[test]
fn baseline_failure_is_reported_and_table_untouched() {
    let table = MockTable::new(&[A, X]);
    let collaborators =
        Collaborators::new(table.clone(), MockBaseline::failing(STATUS_UNSUCCESSFUL), MockResolver::new());
    let device = UnhookerDevice::create(collaborators, DeviceConfig::default()).unwrap();

    assert_eq!(unhook(&device), STATUS_UNSUCCESSFUL);
    assert_eq!(
        device.dispatcher().unhook(),
        Err(DrvError::InitFailure { stage: InitStage::Baseline, status: STATUS_UNSUCCESSFUL })
    );
    assert_eq!(table.snapshot(), vec![A, X]);
}

#[test]
fn resolver_failure_fails_get_status() {
    let table = MockTable::new(&[A, X]);
    let resolver = Arc::new(MockResolver { modules: Vec::new(), init_status: Some(STATUS_UNSUCCESSFUL) });
    let collaborators = Collaborators::new(table, MockBaseline::new(&[A, B]), resolver);
    let device = UnhookerDevice::create(collaborators, DeviceConfig::default()).unwrap();

    let mut out = [0u8; 256];
    assert_eq!(
        device.dispatcher().get_status(&mut out),
        Err(DrvError::InitFailure { stage: InitStage::Resolver, status: STATUS_UNSUCCESSFUL })
    );
}

#[test]
fn lifecycle_requests_are_acknowledged() {
    let f = scenario_a();
    let device = inline(&f);

    assert_eq!(device.dispatch(IrpRequest::Create).status, STATUS_SUCCESS);
    assert_eq!(device.dispatch(IrpRequest::Close).status, STATUS_SUCCESS);
    assert_eq!(device.dispatch(IrpRequest::Other { major: 0x03 }).status, STATUS_INVALID_DEVICE_REQUEST);
}

/*──────────────────────────── concurrency ───────────────────────────────*/

/// Records when it ran and how many tasks were running alongside it.
struct Probe {
    id: usize,
    running: Arc<AtomicUsize>,
    overlap: Arc<AtomicUsize>,
    order: Arc<Mutex<Vec<usize>>>,
}

impl Job for Probe {
    fn execute(&mut self) -> DrvResult<()> {
        if self.running.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlap.fetch_add(1, Ordering::SeqCst);
        }
        self.order.lock().unwrap().push(self.id);
        thread::yield_now();
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn concurrent_callers_run_once_in_acceptance_order() {
    const CALLERS: usize = 8;
    const PER_CALLER: usize = 25;

    let f = scenario_a();
    let device = threaded(&f);
    let running = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));
    let accepted = Mutex::new(Vec::new());

    thread::scope(|s| {
        for caller in 0..CALLERS {
            let (device, running, overlap, order, accepted) = (&device, &running, &overlap, &order, &accepted);
            s.spawn(move || {
                for n in 0..PER_CALLER {
                    let probe = Probe {
                        id: caller * PER_CALLER + n,
                        running: Arc::clone(running),
                        overlap: Arc::clone(overlap),
                        order: Arc::clone(order),
                    };
                    let task = device.dispatcher().submit(probe).unwrap();
                    accepted.lock().unwrap().push((task.seq(), caller * PER_CALLER + n));
                }
            });
        }
    });

    let executed = order.lock().unwrap().clone();
    let mut accepted = accepted.into_inner().unwrap();
    accepted.sort();
    let by_seq: Vec<usize> = accepted.into_iter().map(|(_, id)| id).collect();

    assert_eq!(executed.len(), CALLERS * PER_CALLER);
    assert_eq!(executed, by_seq, "tasks must run in the order their pushes were accepted");
    assert_eq!(overlap.load(Ordering::SeqCst), 0, "two tasks ran at once");
}

#[test]
fn concurrent_reports_and_repairs_stay_consistent() {
    let f = scenario_a();
    let device = threaded(&f);

    thread::scope(|s| {
        for i in 0..6 {
            let device = &device;
            let table = &f.table;
            s.spawn(move || {
                for _ in 0..10 {
                    if i % 2 == 0 {
                        table.hook(1, X);
                        device.dispatcher().unhook().unwrap();
                    } else {
                        let mut out = [0u8; 1024];
                        let written = device.dispatcher().get_status(&mut out).unwrap();
                        let report = Report::parse(&out[..written]).unwrap();
                        assert_eq!(report.header.entry_count, report.header.modified_count);
                    }
                }
            });
        }
    });

    device.dispatcher().unhook().unwrap();
    assert_eq!(f.table.snapshot(), vec![A, B, C, D, E]);
}

/// A table whose reads blow up, as a faulting collaborator would.
struct ExplodingTable;

impl DispatchTableAccessor for ExplodingTable {
    fn size(&self) -> usize {
        2
    }

    fn current_value(&self, _index: usize) -> Address {
        panic!("service table read faulted");
    }

    fn write(&self, _index: usize, _value: Address) {}
}

#[test]
fn panicking_collaborator_fails_callers_instead_of_hanging() {
    let collaborators =
        Collaborators::new(Arc::new(ExplodingTable), MockBaseline::new(&[A, B]), MockResolver::new());
    let device = UnhookerDevice::create(collaborators, DeviceConfig::default()).unwrap();

    assert_eq!(device.dispatcher().unhook(), Err(DrvError::QueueFailure));
    let deadline = Instant::now() + Duration::from_secs(5);
    while device.dispatcher().worker_state() != WorkerState::Faulted {
        assert!(Instant::now() < deadline, "worker never faulted");
        thread::sleep(Duration::from_millis(1));
    }

    // Later requests are refused outright.
    assert_eq!(unhook(&device), STATUS_INTERNAL_ERROR);
    let (status, bytes) = get_status(&device, 512);
    assert_eq!(status, STATUS_INTERNAL_ERROR);
    assert!(bytes.is_empty());
    assert_eq!(device.dispatcher().pending(), 0);
}

#[test]
fn dropping_device_stops_worker() {
    let f = scenario_a();
    let device = threaded(&f);
    assert_eq!(unhook(&device), STATUS_SUCCESS);
    drop(device);
    assert_eq!(Arc::strong_count(&f.table), 2, "only the fixture should still hold the table");
}
