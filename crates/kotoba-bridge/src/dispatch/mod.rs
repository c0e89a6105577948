//! Host functions the guest imports.
//!
//! Every import takes the guest stack pointer as its only argument and reads
//! and writes a fixed layout of arguments and results relative to it. Host
//! failures inside `valueCall`, `valueInvoke` and `valueNew` come back to the
//! guest as `(thrown value, false)`. Only bridge faults (bad handles,
//! out-of-bounds memory, use after exit) trap the guest.

/// `syscall/js.*` value operations.
pub mod js;
/// `runtime.*` process, clock and timer operations.
pub mod runtime;

use tracing::{debug, warn};
use wasmtime::{Caller, Linker, Module};

use crate::context::GuestContext;
use crate::error::{BridgeError, BridgeResult};
use crate::state::BridgeState;

/// Every stack-pointer import the bridge provides. Variants are named after
/// the import they implement; see [`GojsImport::name`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GojsImport {
    WasmExit,
    WasmWrite,
    ResetMemoryDataView,
    Nanotime1,
    Walltime,
    ScheduleTimeoutEvent,
    ClearTimeoutEvent,
    GetRandomData,
    FinalizeRef,
    StringVal,
    ValueGet,
    ValueSet,
    ValueDelete,
    ValueIndex,
    ValueSetIndex,
    ValueCall,
    ValueInvoke,
    ValueNew,
    ValueLength,
    ValuePrepareString,
    ValueLoadString,
    ValueInstanceOf,
    CopyBytesToGo,
    CopyBytesToJs,
}

impl GojsImport {
    /// All imports, in registration order.
    pub const ALL: [Self; 24] = [
        Self::WasmExit,
        Self::WasmWrite,
        Self::ResetMemoryDataView,
        Self::Nanotime1,
        Self::Walltime,
        Self::ScheduleTimeoutEvent,
        Self::ClearTimeoutEvent,
        Self::GetRandomData,
        Self::FinalizeRef,
        Self::StringVal,
        Self::ValueGet,
        Self::ValueSet,
        Self::ValueDelete,
        Self::ValueIndex,
        Self::ValueSetIndex,
        Self::ValueCall,
        Self::ValueInvoke,
        Self::ValueNew,
        Self::ValueLength,
        Self::ValuePrepareString,
        Self::ValueLoadString,
        Self::ValueInstanceOf,
        Self::CopyBytesToGo,
        Self::CopyBytesToJs,
    ];

    /// The import's field name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WasmExit => "runtime.wasmExit",
            Self::WasmWrite => "runtime.wasmWrite",
            Self::ResetMemoryDataView => "runtime.resetMemoryDataView",
            Self::Nanotime1 => "runtime.nanotime1",
            Self::Walltime => "runtime.walltime",
            Self::ScheduleTimeoutEvent => "runtime.scheduleTimeoutEvent",
            Self::ClearTimeoutEvent => "runtime.clearTimeoutEvent",
            Self::GetRandomData => "runtime.getRandomData",
            Self::FinalizeRef => "syscall/js.finalizeRef",
            Self::StringVal => "syscall/js.stringVal",
            Self::ValueGet => "syscall/js.valueGet",
            Self::ValueSet => "syscall/js.valueSet",
            Self::ValueDelete => "syscall/js.valueDelete",
            Self::ValueIndex => "syscall/js.valueIndex",
            Self::ValueSetIndex => "syscall/js.valueSetIndex",
            Self::ValueCall => "syscall/js.valueCall",
            Self::ValueInvoke => "syscall/js.valueInvoke",
            Self::ValueNew => "syscall/js.valueNew",
            Self::ValueLength => "syscall/js.valueLength",
            Self::ValuePrepareString => "syscall/js.valuePrepareString",
            Self::ValueLoadString => "syscall/js.valueLoadString",
            Self::ValueInstanceOf => "syscall/js.valueInstanceOf",
            Self::CopyBytesToGo => "syscall/js.copyBytesToGo",
            Self::CopyBytesToJs => "syscall/js.copyBytesToJS",
        }
    }

    /// Older names the same import has been linked under.
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Walltime => &["runtime.walltime1"],
            _ => &[],
        }
    }

    /// Look up an import by any of its names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|import| import.name() == name || import.aliases().contains(&name))
    }

    /// Run the import against the guest.
    pub fn dispatch(self, cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
        match self {
            Self::WasmExit => runtime::wasm_exit(cx, sp),
            Self::WasmWrite => runtime::wasm_write(cx, sp),
            Self::ResetMemoryDataView => Ok(()),
            Self::Nanotime1 => runtime::nanotime(cx, sp),
            Self::Walltime => runtime::walltime(cx, sp),
            Self::ScheduleTimeoutEvent => runtime::schedule_timeout_event(cx, sp),
            Self::ClearTimeoutEvent => runtime::clear_timeout_event(cx, sp),
            Self::GetRandomData => runtime::get_random_data(cx, sp),
            Self::FinalizeRef => js::finalize_ref(cx, sp),
            Self::StringVal => js::string_val(cx, sp),
            Self::ValueGet => js::value_get(cx, sp),
            Self::ValueSet => js::value_set(cx, sp),
            Self::ValueDelete => js::value_delete(cx, sp),
            Self::ValueIndex => js::value_index(cx, sp),
            Self::ValueSetIndex => js::value_set_index(cx, sp),
            Self::ValueCall => js::value_call(cx, sp),
            Self::ValueInvoke => js::value_invoke(cx, sp),
            Self::ValueNew => js::value_new(cx, sp),
            Self::ValueLength => js::value_length(cx, sp),
            Self::ValuePrepareString => js::value_prepare_string(cx, sp),
            Self::ValueLoadString => js::value_load_string(cx, sp),
            Self::ValueInstanceOf => js::value_instance_of(cx, sp),
            Self::CopyBytesToGo => js::copy_bytes_to_go(cx, sp),
            Self::CopyBytesToJs => js::copy_bytes_to_js(cx, sp),
        }
    }
}

/// Register every import under each namespace, then link anything else the
/// module asks for as a trap.
pub fn register_host_functions<'a>(
    linker: &mut Linker<BridgeState>,
    module: &Module,
    namespaces: impl Iterator<Item = &'a str> + Clone,
) -> BridgeResult<()> {
    for namespace in namespaces.clone() {
        for import in GojsImport::ALL {
            for name in std::iter::once(import.name()).chain(import.aliases().iter().copied()) {
                linker
                    .func_wrap(
                        namespace,
                        name,
                        move |mut caller: Caller<'_, BridgeState>, sp: i32| -> wasmtime::Result<()> {
                            #[allow(clippy::cast_sign_loss)]
                            let sp = u64::from(sp as u32);
                            import.dispatch(&mut caller, sp).map_err(|err| {
                                warn!(import = import.name(), error = %err, "host import trapped");
                                wasmtime::Error::new(err)
                            })
                        },
                    )
                    .map_err(load_failure)?;
            }
        }
        linker
            .func_wrap(namespace, "debug", |value: i32| {
                debug!(value, "guest debug");
            })
            .map_err(load_failure)?;
    }

    let known: Vec<&str> = namespaces.collect();
    for import in module.imports() {
        let provided = known.contains(&import.module())
            && (import.name() == "debug" || GojsImport::from_name(import.name()).is_some());
        if !provided {
            warn!(
                module = import.module(),
                name = import.name(),
                "guest import has no host implementation; linking as trap"
            );
        }
    }
    linker
        .define_unknown_imports_as_traps(module)
        .map_err(load_failure)?;
    Ok(())
}

fn load_failure(err: wasmtime::Error) -> BridgeError {
    BridgeError::LoadFailure(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = GojsImport::ALL.iter().map(|i| i.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), GojsImport::ALL.len());
    }

    #[test]
    fn walltime_alias_resolves() {
        assert_eq!(
            GojsImport::from_name("runtime.walltime1"),
            Some(GojsImport::Walltime)
        );
        assert_eq!(
            GojsImport::from_name("syscall/js.copyBytesToJS"),
            Some(GojsImport::CopyBytesToJs)
        );
        assert_eq!(GojsImport::from_name("runtime.unknown"), None);
    }
}
