//! One guest module instance and the loop that drives it.

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use wasmtime::{Engine, Instance, Linker, Module, Store};

use crate::argv;
use crate::context::{self, GuestContext, from_wasm};
use crate::dispatch::register_host_functions;
use crate::error::{BridgeError, BridgeResult};
use crate::options::BridgeOptions;
use crate::scheduler::{ExitSignal, GuestState, TimerOutcome};
use crate::shim::HostShim;
use crate::state::{BridgeState, GuestExports};
use crate::value::HostValue;

/// A loaded guest module plus everything the host keeps on its behalf.
///
/// The bridge owns the guest's memory and value table exclusively. Guest
/// code only ever runs while a `&mut ModuleBridge` is held, so there is at
/// most one active guest call stack per instance.
pub struct ModuleBridge {
    store: Store<BridgeState>,
}

impl ModuleBridge {
    /// Compile and instantiate `wasm` (binary or text) with the bridge's
    /// imports linked in.
    ///
    /// Must be called from inside a tokio runtime; guest timers are armed on
    /// it.
    pub fn load(wasm: &[u8], options: BridgeOptions) -> BridgeResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| BridgeError::LoadFailure(format!("no tokio runtime: {e}")))?;
        let engine = Engine::default();
        let module = Module::new(&engine, wasm).map_err(load_failure)?;

        let mut linker = Linker::new(&engine);
        register_host_functions(&mut linker, &module, options.namespaces())?;

        let mut store = Store::new(&engine, BridgeState::new(&options, runtime));
        store.limiter(|state| &mut state.limits);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(load_failure)?;
        let exports = bind_exports(&mut store, &instance)?;
        store.data_mut().guest = Some(exports);

        info!(
            namespace = %options.namespace,
            imports = module.imports().len(),
            "guest module loaded"
        );
        Ok(Self { store })
    }

    /// Encode process arguments and run the guest's entry point until it
    /// first yields.
    ///
    /// Arguments that do not fit below the guest's data segment fail with
    /// [`BridgeError::ArgvOverflow`] before any guest code runs.
    pub fn start(&mut self) -> BridgeResult<()> {
        self.store.data().scheduler.check_startable()?;
        let (argc, argv_ptr) = {
            let (mut mem, state) = self.store.parts()?;
            argv::encode_args(&mut mem, &state.argv, &state.env)?
        };
        let run = self.exports()?.run;

        debug!(argc, "starting guest");
        self.store.data_mut().scheduler.enter()?;
        let result = run.call(&mut self.store, (argc, argv_ptr));
        self.store.data_mut().scheduler.leave();
        result.map_err(from_wasm)
    }

    /// Start the guest if needed, then service its timers until it exits.
    ///
    /// A guest that parks itself with no timers armed never exits, and this
    /// future never resolves. Library guests are driven with [`start`] and
    /// [`call_global`] instead.
    ///
    /// [`start`]: ModuleBridge::start
    /// [`call_global`]: ModuleBridge::call_global
    pub async fn run(&mut self) -> BridgeResult<i32> {
        if self.state() == GuestState::NotStarted {
            self.start()?;
        }
        while self.exit_code().is_none() && self.next_timer().await?.is_some() {}

        let mut exit = self.exit_signal();
        exit.wait()
            .await
            .ok_or_else(|| BridgeError::Trap("bridge dropped before the guest exited".to_owned()))
    }

    /// Resume the guest for a timer that has fired. Fails with
    /// [`BridgeError::AlreadyExited`] once the guest has exited, as do the
    /// other timer methods.
    ///
    /// If the guest still holds the timer after resuming, it is resumed
    /// again, up to the configured re-fire cap. Past the cap the timer is
    /// dropped and reported as [`TimerOutcome::Exhausted`].
    pub fn fire_timer(&mut self, id: i32) -> BridgeResult<TimerOutcome> {
        self.ensure_not_exited()?;
        if !self.store.data().scheduler.is_pending(id) {
            return Ok(TimerOutcome::Canceled { id });
        }
        self.store.resume()?;

        let max = self.store.data().scheduler.max_refires();
        let mut refires = 0;
        while self.store.data().scheduler.is_pending(id) {
            if refires >= max {
                error!(timer_id = id, refires, "timer never cleared by guest; dropping it");
                self.store.data_mut().scheduler.clear_timeout(id);
                return Ok(TimerOutcome::Exhausted { id, refires });
            }
            refires += 1;
            warn!(timer_id = id, attempt = refires, "missed timeout event");
            self.store.resume()?;
        }
        Ok(TimerOutcome::Fired { id, refires })
    }

    /// Fire every timer that has already expired, without waiting.
    pub fn service_timers(&mut self) -> BridgeResult<Vec<TimerOutcome>> {
        self.ensure_not_exited()?;
        let mut outcomes = Vec::new();
        // A fired timer may exit the guest; stop there.
        while self.exit_code().is_none() {
            let Some(id) = self.store.data_mut().scheduler.try_next_fired() else {
                break;
            };
            outcomes.push(self.fire_timer(id)?);
        }
        Ok(outcomes)
    }

    /// Wait for the next armed timer and fire it. `None` once nothing is
    /// armed.
    pub async fn next_timer(&mut self) -> BridgeResult<Option<TimerOutcome>> {
        self.ensure_not_exited()?;
        let Some(id) = self.store.data_mut().scheduler.next_fired().await else {
            return Ok(None);
        };
        self.fire_timer(id).map(Some)
    }

    /// Call a function the guest published on the global object, with the
    /// global object as receiver.
    ///
    /// The outer result carries bridge faults; the inner one is the value
    /// returned or thrown.
    pub fn call_global(
        &mut self,
        name: &str,
        args: &[HostValue],
    ) -> BridgeResult<Result<HostValue, HostValue>> {
        self.ensure_not_exited()?;
        let global = self.global().clone();
        let func = global.get(name);
        if !matches!(func, HostValue::Function(_)) {
            return Err(BridgeError::MissingExport(name.to_owned()));
        }
        context::call_function(&mut self.store, &func, &global, args)
    }

    /// Call any host value as a function.
    pub fn invoke(
        &mut self,
        func: &HostValue,
        this: &HostValue,
        args: &[HostValue],
    ) -> BridgeResult<Result<HostValue, HostValue>> {
        self.ensure_not_exited()?;
        context::call_function(&mut self.store, func, this, args)
    }

    fn ensure_not_exited(&self) -> BridgeResult<()> {
        match self.exit_code() {
            Some(code) => Err(BridgeError::AlreadyExited(code)),
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GuestState {
        self.store.data().scheduler.state()
    }

    /// Exit code once the guest has called `wasmExit`.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.store.data().scheduler.exit_code()
    }

    /// A handle that resolves when the guest exits.
    #[must_use]
    pub fn exit_signal(&self) -> ExitSignal {
        self.store.data().scheduler.exit_signal()
    }

    /// The global context object.
    #[must_use]
    pub fn global(&self) -> &HostValue {
        self.store.data().global()
    }

    /// The OS shim this bridge writes guest output through.
    #[must_use]
    pub fn shim(&self) -> &std::sync::Arc<HostShim> {
        self.store.data().shim()
    }

    /// Number of values the guest currently holds handles to.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.store.data().live_handles()
    }

    /// Timers the guest has armed and not cleared.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.store.data().scheduler.pending_timers()
    }

    fn exports(&self) -> BridgeResult<GuestExports> {
        self.store
            .data()
            .guest
            .clone()
            .ok_or_else(|| BridgeError::LoadFailure("guest exports are not bound".to_owned()))
    }
}

impl std::fmt::Debug for ModuleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBridge")
            .field("state", self.store.data())
            .finish()
    }
}

fn bind_exports(store: &mut Store<BridgeState>, instance: &Instance) -> BridgeResult<GuestExports> {
    let memory = instance
        .get_memory(&mut *store, "mem")
        .or_else(|| instance.get_memory(&mut *store, "memory"))
        .ok_or_else(|| BridgeError::LoadFailure("guest module does not export `mem`".to_owned()))?;
    let export_failure =
        |name: &str, err: wasmtime::Error| BridgeError::LoadFailure(format!("export `{name}`: {err:#}"));
    Ok(GuestExports {
        memory,
        getsp: instance
            .get_typed_func(&mut *store, "getsp")
            .map_err(|e| export_failure("getsp", e))?,
        run: instance
            .get_typed_func(&mut *store, "run")
            .map_err(|e| export_failure("run", e))?,
        resume: instance
            .get_typed_func(&mut *store, "resume")
            .map_err(|e| export_failure("resume", e))?,
    })
}

fn load_failure(err: wasmtime::Error) -> BridgeError {
    BridgeError::LoadFailure(format!("{err:#}"))
}
