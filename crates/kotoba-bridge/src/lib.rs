//! Kotoba Bridge - host side of the Go `js/wasm` calling convention.
//!
//! A guest compiled for `GOOS=js GOARCH=wasm` expects a JavaScript host: a
//! table of host values it can name by handle, a set of stack-pointer based
//! imports to operate on them, timers, and a tiny OS surface. This crate
//! provides all of that on top of wasmtime and tokio:
//!
//! - [`ValueTable`]: handle allocation with reference counts and reuse
//! - [`GuestMemory`]: bounds-checked little-endian marshalling
//! - [`dispatch`]: the `runtime.*` and `syscall/js.*` imports
//! - [`Scheduler`]: guest lifecycle and host timers
//! - [`HostShim`]: per-bridge `fs`/`process`/`path` stand-ins
//! - [`ModuleBridge`]: load, start, resume and call into a guest
//!
//! # Example
//!
//! ```rust,no_run
//! use kotoba_bridge::{BridgeOptions, HostValue, ModuleBridge};
//!
//! # async fn demo(wasm: &[u8]) -> kotoba_bridge::BridgeResult<()> {
//! let mut bridge = ModuleBridge::load(wasm, BridgeOptions::default())?;
//! bridge.start()?;
//! let tokens = bridge.call_global("kagome_tokenize", &[HostValue::string("猫")])?;
//! # let _ = tokens;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod argv;
pub mod context;
pub mod dispatch;
pub mod error;
mod globals;
pub mod memory;
pub mod module;
pub mod options;
pub mod scheduler;
pub mod shim;
pub mod slot;
pub mod state;
pub mod table;
pub mod value;

pub use context::{GuestContext, call_function, construct};
pub use error::{BridgeError, BridgeResult};
pub use memory::GuestMemory;
pub use module::ModuleBridge;
pub use options::{BridgeOptions, DEFAULT_NAMESPACE};
pub use scheduler::{DEFAULT_MAX_TIMER_REFIRES, ExitSignal, GuestState, Scheduler, TimerOutcome};
pub use shim::HostShim;
pub use slot::{Slot, TypeTag};
pub use state::BridgeState;
pub use table::ValueTable;
pub use value::{Class, DynamicObject, FunctionKind, HostFunction, HostValue, Symbol};
