//! Access to a running guest from host code.
//!
//! Host functions run with a [`wasmtime::Caller`]; host code outside a guest
//! frame holds the [`wasmtime::Store`]. Both need the same three things: a
//! view of linear memory next to the bridge state, the current stack
//! pointer, and a way to resume the guest. [`GuestContext`] is that seam.

use wasmtime::{AsContext, AsContextMut, Caller, Store};

use crate::error::{BridgeError, BridgeResult, trap};
use crate::memory::GuestMemory;
use crate::state::{BridgeState, GuestExports};
use crate::value::HostValue;

/// A handle on a live guest.
pub trait GuestContext {
    /// Borrow linear memory and the bridge state together.
    fn parts(&mut self) -> BridgeResult<(GuestMemory<'_>, &mut BridgeState)>;

    /// Bridge state only.
    fn state(&mut self) -> &mut BridgeState;

    /// Ask the guest for its current stack pointer.
    fn stack_pointer(&mut self) -> BridgeResult<u64>;

    /// Re-enter the guest through its `resume` export.
    fn resume(&mut self) -> BridgeResult<()>;
}

fn exports<C: AsContextMut<Data = BridgeState>>(cx: &mut C) -> BridgeResult<GuestExports> {
    let ctx = cx.as_context();
    let state = ctx.data();
    if let Some(code) = state.scheduler.exit_code() {
        return Err(BridgeError::AlreadyExited(code));
    }
    state
        .guest
        .clone()
        .ok_or_else(|| BridgeError::LoadFailure("guest exports are not bound".to_owned()))
}

fn parts_of<C: AsContextMut<Data = BridgeState>>(
    cx: &mut C,
) -> BridgeResult<(GuestMemory<'_>, &mut BridgeState)> {
    let memory = exports(cx)?.memory;
    let (bytes, state) = memory.data_and_store_mut(cx.as_context_mut());
    Ok((GuestMemory::new(bytes), state))
}

#[allow(clippy::cast_sign_loss)]
fn stack_pointer_of<C: AsContextMut<Data = BridgeState>>(cx: &mut C) -> BridgeResult<u64> {
    let getsp = exports(cx)?.getsp;
    let sp = getsp.call(cx.as_context_mut(), ()).map_err(from_wasm)?;
    Ok(u64::from(sp as u32))
}

fn resume_of<C: AsContextMut<Data = BridgeState>>(cx: &mut C) -> BridgeResult<()> {
    let resume = exports(cx)?.resume;
    cx.as_context_mut().data_mut().scheduler.enter()?;
    let result = resume.call(cx.as_context_mut(), ());
    cx.as_context_mut().data_mut().scheduler.leave();
    result.map_err(from_wasm)
}

/// Recover a bridge error raised inside a host function, or wrap a guest
/// trap.
pub(crate) fn from_wasm(err: wasmtime::Error) -> BridgeError {
    match err.downcast::<BridgeError>() {
        Ok(err) => err,
        Err(err) => trap(format!("{err:#}")),
    }
}

impl GuestContext for Store<BridgeState> {
    fn parts(&mut self) -> BridgeResult<(GuestMemory<'_>, &mut BridgeState)> {
        parts_of(self)
    }

    fn state(&mut self) -> &mut BridgeState {
        self.data_mut()
    }

    fn stack_pointer(&mut self) -> BridgeResult<u64> {
        stack_pointer_of(self)
    }

    fn resume(&mut self) -> BridgeResult<()> {
        resume_of(self)
    }
}

impl GuestContext for Caller<'_, BridgeState> {
    fn parts(&mut self) -> BridgeResult<(GuestMemory<'_>, &mut BridgeState)> {
        parts_of(self)
    }

    fn state(&mut self) -> &mut BridgeState {
        self.data_mut()
    }

    fn stack_pointer(&mut self) -> BridgeResult<u64> {
        stack_pointer_of(self)
    }

    fn resume(&mut self) -> BridgeResult<()> {
        resume_of(self)
    }
}

/// Call `func` with receiver `this`.
///
/// Calling something that is not a function throws a `TypeError` in-band.
pub fn call_function(
    cx: &mut dyn GuestContext,
    func: &HostValue,
    this: &HostValue,
    args: &[HostValue],
) -> BridgeResult<Result<HostValue, HostValue>> {
    match func {
        HostValue::Function(f) => f.call(cx, this, args),
        other => Ok(Err(HostValue::type_error(format!(
            "{} is not a function",
            other.type_name()
        )))),
    }
}

/// Construct a new instance with `ctor`.
pub fn construct(
    cx: &mut dyn GuestContext,
    ctor: &HostValue,
    args: &[HostValue],
) -> BridgeResult<Result<HostValue, HostValue>> {
    match ctor {
        HostValue::Function(f) => f.construct(cx, args),
        other => Ok(Err(HostValue::type_error(format!(
            "{} is not a constructor",
            other.type_name()
        )))),
    }
}

/// Run guest callback `id` the way a wrapped guest function is invoked:
/// publish the event on the bridge object, resume the guest, and read back
/// the result the guest stored on the event.
pub(crate) fn invoke_guest(
    cx: &mut dyn GuestContext,
    id: u32,
    this: &HostValue,
    args: &[HostValue],
) -> BridgeResult<Result<HostValue, HostValue>> {
    let event = HostValue::object();
    event.set("id", HostValue::Number(f64::from(id)));
    event.set("this", this.clone());
    event.set("args", HostValue::array(args.to_vec()));

    let bridge = cx.state().bridge.clone();
    bridge.set("_pendingEvent", event.clone());
    cx.resume()?;
    Ok(Ok(event.get("result")))
}
