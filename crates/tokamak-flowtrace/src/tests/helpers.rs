//! Shared end-to-end test fixtures: in-memory collaborator fakes and a
//! harness that wires a [`PluginBoundary`] to a real socket pair on each
//! side, the same way the crate's unit tests use [`UnixStream::pair`]
//! instead of a live viewer process.

use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

use crate::collaborators::{Executor, GuestMemory, Module, ModuleMap, Searcher, Section};
use crate::config::FlowtraceConfig;
use crate::identity::HostStateId;
use crate::plugin::PluginBoundary;
use crate::transport::{split, IpcReader, IpcWriter};

pub const TRACKED_PATH: &str = "./tracked-module";
pub const TRACKED_PID: u64 = 42;
pub const MODULE_BASE: u64 = 0x1000;

pub struct FakeModule {
    pub path: String,
    pub pid: u64,
    pub base: u64,
    pub sections: Vec<Section>,
}

impl FakeModule {
    pub fn tracked() -> Self {
        Self {
            path: TRACKED_PATH.to_string(),
            pid: TRACKED_PID,
            base: MODULE_BASE,
            sections: vec![Section {
                name: ".text".to_string(),
                native_load_base: MODULE_BASE,
                size: 0x8000,
            }],
        }
    }

    pub fn other() -> Self {
        Self {
            path: "./unrelated-module".to_string(),
            pid: 7,
            base: 0,
            sections: vec![],
        }
    }
}

impl Module for FakeModule {
    fn path(&self) -> &str {
        &self.path
    }
    fn pid(&self) -> u64 {
        self.pid
    }
    fn sections(&self) -> &[Section] {
        &self.sections
    }
    fn to_native_base(&self, pc: u64) -> Option<u64> {
        pc.checked_sub(self.base)
    }
}

/// Hands out a fixed module for every state, regardless of host id — enough
/// for tests that only exercise one guest module.
pub struct FakeModuleMap {
    pub module: Arc<dyn Fn() -> FakeModule + Send + Sync>,
}

impl FakeModuleMap {
    pub fn always(module: fn() -> FakeModule) -> Self {
        Self {
            module: Arc::new(module),
        }
    }
}

impl ModuleMap for FakeModuleMap {
    fn get_module(&self, _state: HostStateId) -> Option<Box<dyn Module>> {
        Some(Box::new((self.module)()))
    }
}

/// Returns `len` bytes of filler, simulating a successful guest memory read.
pub struct FakeGuestMemory;

impl GuestMemory for FakeGuestMemory {
    fn read(&self, _state: HostStateId, _vaddr: u64, len: u64) -> Option<Vec<u8>> {
        Some(vec![0xC3; len as usize])
    }
}

/// Always reports a failed read, for the empty-bytes degradation path.
pub struct FailingGuestMemory;

impl GuestMemory for FailingGuestMemory {
    fn read(&self, _state: HostStateId, _vaddr: u64, _len: u64) -> Option<Vec<u8>> {
        None
    }
}

/// Reports a fixed live-state set and counts searcher installations — the
/// `Searcher` trait has no introspection, so content-level prioritisation
/// assertions live in `prioritisation.rs`'s unit tests; this fixture only
/// observes that the hand-off round trip happened.
pub struct FakeExecutor {
    pub live: Mutex<Vec<HostStateId>>,
    pub install_count: Mutex<usize>,
}

impl FakeExecutor {
    pub fn new(live: Vec<HostStateId>) -> Self {
        Self {
            live: Mutex::new(live),
            install_count: Mutex::new(0),
        }
    }
}

impl Executor for FakeExecutor {
    fn live_states(&self) -> Vec<HostStateId> {
        self.live.lock().unwrap().clone()
    }
    fn set_searcher(&self, mut searcher: Box<dyn Searcher>) {
        searcher.update(&[], &[]);
        *self.install_count.lock().unwrap() += 1;
    }
}

/// A fully wired [`PluginBoundary`] plus the two socket halves a real viewer
/// process would own: `viewer_reader` observes outbound `EDGE_BATCH`es,
/// `viewer_writer` sends inbound `PRIORITISE_STATES` requests.
pub struct Harness {
    pub boundary: PluginBoundary,
    pub viewer_reader: IpcReader,
    pub viewer_writer: IpcWriter,
    pub executor: Arc<FakeExecutor>,
}

/// Installs a test-scoped `tracing` subscriber so `tracing::warn!`/`debug!`
/// output from the boundary under test is visible with `cargo test --
/// --nocapture`. Safe to call from every test: `try_init` is a no-op if a
/// subscriber is already installed.
fn init_test_tracing() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}

pub fn harness_with(module_map: FakeModuleMap, guest_memory: Box<dyn GuestMemory>) -> Harness {
    init_test_tracing();

    let (engine_out, viewer_in) = UnixStream::pair().unwrap();
    let (engine_writer, _unused) = split(engine_out).unwrap();
    let (_unused, viewer_reader) = split(viewer_in).unwrap();

    let (viewer_out, engine_in) = UnixStream::pair().unwrap();
    let (viewer_writer, _unused) = split(viewer_out).unwrap();
    let (_unused, engine_reader) = split(engine_in).unwrap();

    let config = FlowtraceConfig {
        module_path: TRACKED_PATH.to_string(),
        prioritisation_poll_interval_ms: 10,
        ..Default::default()
    };
    let executor = Arc::new(FakeExecutor::new(vec![1, 2, 3]));

    let boundary = PluginBoundary::new(
        config,
        Box::new(module_map),
        guest_memory,
        Arc::clone(&executor) as Arc<dyn Executor>,
        engine_writer,
        engine_reader,
    );

    Harness {
        boundary,
        viewer_reader,
        viewer_writer,
        executor,
    }
}

pub fn default_harness() -> Harness {
    harness_with(
        FakeModuleMap::always(FakeModule::tracked),
        Box::new(FakeGuestMemory),
    )
}
