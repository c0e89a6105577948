//! Per-instance state carried in the wasmtime store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{info, warn};
use wasmtime::{Memory, StoreLimits, StoreLimitsBuilder, TypedFunc};

use crate::error::{BridgeError, BridgeResult};
use crate::globals;
use crate::options::BridgeOptions;
use crate::scheduler::Scheduler;
use crate::shim::HostShim;
use crate::table::ValueTable;
use crate::value::HostValue;

/// Bytes per wasm page.
const PAGE_SIZE: usize = 64 * 1024;

/// Guest exports the bridge drives.
#[derive(Clone)]
pub(crate) struct GuestExports {
    pub(crate) memory: Memory,
    pub(crate) getsp: TypedFunc<(), i32>,
    pub(crate) run: TypedFunc<(i32, i32), ()>,
    pub(crate) resume: TypedFunc<(), ()>,
}

/// Monotonic guest clock anchored to wall time at bridge creation.
///
/// Elapsed time comes from tokio's clock, so a paused test runtime moves it
/// too.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GuestClock {
    origin: Instant,
    wall_origin_nanos: i64,
}

impl GuestClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin_nanos: chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default(),
        }
    }

    /// Nanoseconds since the Unix epoch, monotonic for the bridge's life.
    pub(crate) fn nanotime(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX);
        self.wall_origin_nanos.saturating_add(elapsed)
    }
}

/// Everything host functions need while the guest runs.
pub struct BridgeState {
    pub(crate) table: Option<ValueTable>,
    pub(crate) scheduler: Scheduler,
    pub(crate) shim: Arc<HostShim>,
    pub(crate) global: HostValue,
    pub(crate) bridge: HostValue,
    pub(crate) guest: Option<GuestExports>,
    pub(crate) limits: StoreLimits,
    pub(crate) clock: GuestClock,
    pub(crate) argv: Vec<String>,
    pub(crate) env: BTreeMap<String, String>,
}

impl BridgeState {
    /// Fresh state for one bridge instance.
    pub(crate) fn new(options: &BridgeOptions, runtime: Handle) -> Self {
        let shim = options
            .shim
            .clone()
            .unwrap_or_else(|| Arc::new(HostShim::new()));
        let global = globals::global_object(&shim);
        let bridge = globals::bridge_object();

        let mut limits = StoreLimitsBuilder::new();
        if let Some(pages) = options.max_memory_pages {
            limits = limits.memory_size((pages as usize).saturating_mul(PAGE_SIZE));
        }

        Self {
            table: Some(ValueTable::new(global.clone(), bridge.clone())),
            scheduler: Scheduler::new(runtime, options.max_timer_refires),
            shim,
            global,
            bridge,
            guest: None,
            limits: limits.build(),
            clock: GuestClock::new(),
            argv: options.argv.clone(),
            env: options.env.clone(),
        }
    }

    /// The value table, or `AlreadyExited` once it has been torn down.
    pub(crate) fn table(&self) -> BridgeResult<&ValueTable> {
        let code = self.scheduler.exit_code().unwrap_or_default();
        self.table.as_ref().ok_or(BridgeError::AlreadyExited(code))
    }

    /// Mutable access to the value table.
    pub(crate) fn table_mut(&mut self) -> BridgeResult<&mut ValueTable> {
        let code = self.scheduler.exit_code().unwrap_or_default();
        self.table.as_mut().ok_or(BridgeError::AlreadyExited(code))
    }

    /// Terminal transition on `wasmExit`.
    pub(crate) fn exit(&mut self, code: i32) {
        self.shim.flush();
        self.table = None;
        self.scheduler.exit(code);
        if code == 0 {
            info!(code, "guest program exited");
        } else {
            warn!(code, "guest program exited with non-zero code");
        }
    }

    /// The global context object.
    #[must_use]
    pub fn global(&self) -> &HostValue {
        &self.global
    }

    /// The OS shim instance.
    #[must_use]
    pub fn shim(&self) -> &Arc<HostShim> {
        &self.shim
    }

    /// Number of non-reserved values the guest holds handles to.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.table.as_ref().map_or(0, ValueTable::live_handles)
    }
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("state", &self.scheduler.state())
            .field("live_handles", &self.live_handles())
            .field("pending_timers", &self.scheduler.pending_timers())
            .field("has_guest", &self.guest.is_some())
            .field("argv", &self.argv)
            .finish_non_exhaustive()
    }
}
