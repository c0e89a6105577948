use tracing::{debug, trace};

use crate::context::{self, GuestContext};
use crate::error::{BridgeError, BridgeResult};
use crate::value::HostValue;

/// Write a call outcome as `(value, ok)` at `offset` from a freshly read
/// stack pointer. The call may have re-entered the guest and moved its
/// stack, so the pointer passed in is stale.
fn store_outcome(
    cx: &mut dyn GuestContext,
    operation: &'static str,
    offset: u64,
    outcome: Result<HostValue, HostValue>,
) -> BridgeResult<()> {
    let (value, ok) = match outcome {
        Ok(value) => (value, true),
        Err(thrown) => {
            let failure = BridgeError::DispatchFailure {
                operation,
                message: thrown.to_js_string(),
            };
            debug!(error = %failure, "returning thrown value to guest");
            (thrown, false)
        },
    };
    let sp = cx.stack_pointer()?;
    let (mut mem, state) = cx.parts()?;
    mem.store_value(sp + offset, &value, state.table_mut()?)?;
    mem.set_u8(sp + offset + 8, u8::from(ok))
}

/// Store `value` at `offset` from a freshly read stack pointer.
fn store_result(cx: &mut dyn GuestContext, offset: u64, value: &HostValue) -> BridgeResult<()> {
    let sp = cx.stack_pointer()?;
    let (mut mem, state) = cx.parts()?;
    mem.store_value(sp + offset, value, state.table_mut()?)
}

// func finalizeRef(v ref)
pub(crate) fn finalize_ref(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let id = mem.get_u32(sp + 8)?;
    state.table_mut()?.release(id);
    Ok(())
}

// func stringVal(value string) ref
pub(crate) fn string_val(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let s = mem.load_string(sp + 8)?;
    mem.store_value(sp + 24, &HostValue::string(s), state.table_mut()?)
}

// func valueGet(v ref, p string) ref
pub(crate) fn value_get(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let result = {
        let (mem, state) = cx.parts()?;
        let target = mem.load_value(sp + 8, state.table()?)?;
        let name = mem.load_string(sp + 16)?;
        trace!(property = %name, "valueGet");
        target.get(&name)
    };
    store_result(cx, 32, &result)
}

// func valueSet(v ref, p string, x ref)
pub(crate) fn value_set(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let table = state.table()?;
    let target = mem.load_value(sp + 8, table)?;
    let name = mem.load_string(sp + 16)?;
    let value = mem.load_value(sp + 32, table)?;
    target.set(&name, value);
    Ok(())
}

// func valueDelete(v ref, p string)
pub(crate) fn value_delete(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let target = mem.load_value(sp + 8, state.table()?)?;
    target.delete(&mem.load_string(sp + 16)?);
    Ok(())
}

// func valueIndex(v ref, i int) ref
pub(crate) fn value_index(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let target = mem.load_value(sp + 8, state.table()?)?;
    let item = target.index(mem.get_i64(sp + 16)?);
    mem.store_value(sp + 24, &item, state.table_mut()?)
}

// func valueSetIndex(v ref, i int, x ref)
pub(crate) fn value_set_index(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let table = state.table()?;
    let target = mem.load_value(sp + 8, table)?;
    let value = mem.load_value(sp + 24, table)?;
    target.set_index(mem.get_i64(sp + 16)?, value);
    Ok(())
}

// func valueCall(v ref, m string, args []ref) (ref, bool)
pub(crate) fn value_call(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (receiver, name, args) = {
        let (mem, state) = cx.parts()?;
        let table = state.table()?;
        (
            mem.load_value(sp + 8, table)?,
            mem.load_string(sp + 16)?,
            mem.load_values(sp + 32, table)?,
        )
    };
    trace!(method = %name, argc = args.len(), "valueCall");
    let method = receiver.get(&name);
    let outcome = match method {
        HostValue::Function(_) => context::call_function(cx, &method, &receiver, &args)?,
        _ => Err(HostValue::type_error(format!(
            "{}.{name} is not a function",
            receiver.type_name()
        ))),
    };
    store_outcome(cx, "valueCall", 56, outcome)
}

// func valueInvoke(v ref, args []ref) (ref, bool)
pub(crate) fn value_invoke(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (func, args) = {
        let (mem, state) = cx.parts()?;
        let table = state.table()?;
        (mem.load_value(sp + 8, table)?, mem.load_values(sp + 16, table)?)
    };
    let outcome = context::call_function(cx, &func, &HostValue::Undefined, &args)?;
    store_outcome(cx, "valueInvoke", 40, outcome)
}

// func valueNew(v ref, args []ref) (ref, bool)
pub(crate) fn value_new(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (ctor, args) = {
        let (mem, state) = cx.parts()?;
        let table = state.table()?;
        (mem.load_value(sp + 8, table)?, mem.load_values(sp + 16, table)?)
    };
    let outcome = context::construct(cx, &ctor, &args)?;
    store_outcome(cx, "valueNew", 40, outcome)
}

// func valueLength(v ref) int
pub(crate) fn value_length(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let target = mem.load_value(sp + 8, state.table()?)?;
    let len = i64::try_from(target.length()).unwrap_or(i64::MAX);
    mem.set_i64(sp + 16, len)
}

// valuePrepareString(v ref) (ref, int)
pub(crate) fn value_prepare_string(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let text = mem.load_value(sp + 8, state.table()?)?.to_js_string();
    let len = i64::try_from(text.len()).unwrap_or(i64::MAX);
    mem.store_value(sp + 16, &HostValue::bytes(text.into_bytes()), state.table_mut()?)?;
    mem.set_i64(sp + 24, len)
}

// valueLoadString(v ref, b []byte)
pub(crate) fn value_load_string(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let staged = mem.load_value(sp + 8, state.table()?)?;
    let HostValue::Bytes(bytes) = staged else {
        return Err(BridgeError::DispatchFailure {
            operation: "valueLoadString",
            message: format!("expected staged string bytes, got {}", staged.type_name()),
        });
    };
    bytes.copy_into(mem.load_slice_mut(sp + 16)?);
    Ok(())
}

// func valueInstanceOf(v ref, t ref) bool
pub(crate) fn value_instance_of(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let table = state.table()?;
    let value = mem.load_value(sp + 8, table)?;
    let ctor = mem.load_value(sp + 16, table)?;
    mem.set_u8(sp + 24, u8::from(value.instance_of(&ctor)))
}

// func copyBytesToGo(dst []byte, src ref) (int, bool)
pub(crate) fn copy_bytes_to_go(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let HostValue::Bytes(src) = mem.load_value(sp + 32, state.table()?)? else {
        return mem.set_u8(sp + 48, 0);
    };
    let n = src.copy_into(mem.load_slice_mut(sp + 8)?);
    mem.set_i64(sp + 40, i64::try_from(n).unwrap_or(i64::MAX))?;
    mem.set_u8(sp + 48, 1)
}

// func copyBytesToJS(dst ref, src []byte) (int, bool)
pub(crate) fn copy_bytes_to_js(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let HostValue::Bytes(dst) = mem.load_value(sp + 8, state.table()?)? else {
        return mem.set_u8(sp + 48, 0);
    };
    let n = dst.copy_from(mem.load_slice(sp + 16)?);
    mem.set_i64(sp + 40, i64::try_from(n).unwrap_or(i64::MAX))?;
    mem.set_u8(sp + 48, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::FakeGuest;
    use crate::memory::GuestMemory;
    use crate::slot::Slot;
    use crate::table::reserved;

    const SP: u64 = 1024;
    const DATA: u64 = 2048;

    /// Write a string at `DATA + at` and its `(ptr, len)` header at `addr`.
    fn put_string(guest: &mut FakeGuest, addr: u64, at: u64, s: &str) {
        let mut mem = GuestMemory::new(&mut guest.memory);
        mem.write_bytes(DATA + at, s.as_bytes()).unwrap();
        mem.set_i64(addr, i64::try_from(DATA + at).unwrap()).unwrap();
        mem.set_i64(addr + 8, i64::try_from(s.len()).unwrap()).unwrap();
    }

    fn put_value(guest: &mut FakeGuest, addr: u64, value: &HostValue) {
        let (mut mem, state) = guest.parts().unwrap();
        mem.store_value(addr, value, state.table_mut().unwrap()).unwrap();
    }

    fn read_value(guest: &mut FakeGuest, addr: u64) -> HostValue {
        let (mem, state) = guest.parts().unwrap();
        mem.load_value(addr, state.table().unwrap()).unwrap()
    }

    fn put_global(guest: &mut FakeGuest, addr: u64) {
        let mut mem = GuestMemory::new(&mut guest.memory);
        mem.store_slot(
            addr,
            Slot::Ref {
                id: reserved::GLOBAL,
                tag: crate::slot::TypeTag::Object,
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn string_val_then_value_set_on_global() {
        let mut guest = FakeGuest::new();
        put_string(&mut guest, SP + 8, 0, "こんにちは");
        string_val(&mut guest, SP).unwrap();
        let greeting = read_value(&mut guest, SP + 24);
        assert_eq!(greeting, HostValue::string("こんにちは"));

        put_global(&mut guest, SP + 8);
        put_string(&mut guest, SP + 16, 64, "greeting");
        put_value(&mut guest, SP + 32, &greeting);
        value_set(&mut guest, SP).unwrap();
        assert_eq!(guest.state.global.get("greeting"), greeting);
    }

    #[tokio::test]
    async fn value_get_reads_fresh_stack_pointer() {
        let mut guest = FakeGuest::new();
        guest.state.global.set("answer", HostValue::Number(42.0));
        put_global(&mut guest, SP + 8);
        put_string(&mut guest, SP + 16, 0, "answer");
        guest.sp = SP + 256;
        value_get(&mut guest, SP).unwrap();
        assert_eq!(read_value(&mut guest, SP + 256 + 32), HostValue::Number(42.0));
        assert_eq!(read_value(&mut guest, SP + 32), HostValue::Undefined);
    }

    #[tokio::test]
    async fn value_call_catches_thrown_errors() {
        let mut guest = FakeGuest::new();
        guest.state.global.set(
            "boom",
            HostValue::native("boom", |_, _, _| Err(HostValue::error("kaboom"))),
        );
        put_global(&mut guest, SP + 8);
        put_string(&mut guest, SP + 16, 0, "boom");
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_i64(SP + 32, 0).unwrap();
            mem.set_i64(SP + 40, 0).unwrap();
        }
        value_call(&mut guest, SP).unwrap();
        let thrown = read_value(&mut guest, SP + 56);
        assert_eq!(thrown.to_js_string(), "Error: kaboom");
        assert_eq!(GuestMemory::new(&mut guest.memory).get_u8(SP + 64).unwrap(), 0);
    }

    #[tokio::test]
    async fn value_call_passes_receiver_and_args() {
        let mut guest = FakeGuest::new();
        guest.state.global.set(
            "sum",
            HostValue::native("sum", |_, this, args| {
                let base = this.get("base").as_f64().unwrap_or_default();
                Ok(HostValue::Number(
                    base + args.iter().filter_map(HostValue::as_f64).sum::<f64>(),
                ))
            }),
        );
        guest.state.global.set("base", HostValue::Number(100.0));
        put_global(&mut guest, SP + 8);
        put_string(&mut guest, SP + 16, 0, "sum");
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_f64(DATA + 512, 1.5).unwrap();
            mem.set_f64(DATA + 520, 2.5).unwrap();
            mem.set_i64(SP + 32, i64::try_from(DATA + 512).unwrap()).unwrap();
            mem.set_i64(SP + 40, 2).unwrap();
        }
        value_call(&mut guest, SP).unwrap();
        assert_eq!(read_value(&mut guest, SP + 56), HostValue::Number(104.0));
        assert_eq!(GuestMemory::new(&mut guest.memory).get_u8(SP + 64).unwrap(), 1);
    }

    #[tokio::test]
    async fn value_new_builds_arrays() {
        let mut guest = FakeGuest::new();
        let array_ctor = guest.state.global.get("Array");
        put_value(&mut guest, SP + 8, &array_ctor);
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_f64(DATA, 3.0).unwrap();
            mem.set_i64(SP + 16, i64::try_from(DATA).unwrap()).unwrap();
            mem.set_i64(SP + 24, 1).unwrap();
        }
        value_new(&mut guest, SP).unwrap();
        let arr = read_value(&mut guest, SP + 40);
        assert_eq!(arr.length(), 3);
        assert!(arr.instance_of(&array_ctor));
    }

    #[tokio::test]
    async fn value_new_rejects_huge_lengths_in_band() {
        let mut guest = FakeGuest::new();
        for class in ["Array", "Uint8Array"] {
            let ctor = guest.state.global.get(class);
            put_value(&mut guest, SP + 8, &ctor);
            {
                let mut mem = GuestMemory::new(&mut guest.memory);
                mem.set_f64(DATA, 4_294_967_295.0).unwrap();
                mem.set_i64(SP + 16, i64::try_from(DATA).unwrap()).unwrap();
                mem.set_i64(SP + 24, 1).unwrap();
            }
            value_new(&mut guest, SP).unwrap();
            let thrown = read_value(&mut guest, SP + 40);
            assert_eq!(thrown.get("name").as_str(), Some("RangeError"), "{class}");
            assert_eq!(GuestMemory::new(&mut guest.memory).get_u8(SP + 48).unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn value_set_index_drops_huge_indices() {
        let mut guest = FakeGuest::new();
        let arr = HostValue::array(vec![]);
        put_value(&mut guest, SP + 8, &arr);
        put_value(&mut guest, SP + 24, &HostValue::Bool(true));
        for index in [i64::MAX, 4_294_967_295, -1] {
            GuestMemory::new(&mut guest.memory).set_i64(SP + 16, index).unwrap();
            value_set_index(&mut guest, SP).unwrap();
        }
        assert_eq!(arr.length(), 0);

        GuestMemory::new(&mut guest.memory).set_i64(SP + 16, 2).unwrap();
        value_set_index(&mut guest, SP).unwrap();
        assert_eq!(arr.length(), 3);
        assert_eq!(arr.index(2), HostValue::Bool(true));
    }

    #[tokio::test]
    async fn value_set_drops_out_of_range_numeric_keys() {
        let mut guest = FakeGuest::new();
        let arr = HostValue::array(vec![HostValue::Null]);
        put_value(&mut guest, SP + 8, &arr);
        put_string(&mut guest, SP + 16, 0, "18446744073709551615");
        put_value(&mut guest, SP + 32, &HostValue::Bool(true));
        value_set(&mut guest, SP).unwrap();
        assert_eq!(arr.length(), 1);
    }

    #[tokio::test]
    async fn string_staging_is_two_phase() {
        let mut guest = FakeGuest::new();
        put_value(&mut guest, SP + 8, &HostValue::string("日本"));
        value_prepare_string(&mut guest, SP).unwrap();
        let len = GuestMemory::new(&mut guest.memory).get_i64(SP + 24).unwrap();
        assert_eq!(len, 6);

        let staged = read_value(&mut guest, SP + 16);
        put_value(&mut guest, SP + 8, &staged);
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_i64(SP + 16, i64::try_from(DATA).unwrap()).unwrap();
            mem.set_i64(SP + 24, len).unwrap();
        }
        value_load_string(&mut guest, SP).unwrap();
        let mem = GuestMemory::new(&mut guest.memory);
        assert_eq!(mem.slice(DATA, 6).unwrap(), "日本".as_bytes());
    }

    #[tokio::test]
    async fn copy_bytes_clamps_and_flags_non_bytes() {
        let mut guest = FakeGuest::new();
        let src = HostValue::bytes(b"abcdef".to_vec());
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_i64(SP + 8, i64::try_from(DATA).unwrap()).unwrap();
            mem.set_i64(SP + 16, 4).unwrap();
            mem.set_i64(SP + 24, 4).unwrap();
        }
        put_value(&mut guest, SP + 32, &src);
        copy_bytes_to_go(&mut guest, SP).unwrap();
        {
            let mem = GuestMemory::new(&mut guest.memory);
            assert_eq!(mem.slice(DATA, 4).unwrap(), b"abcd");
            assert_eq!(mem.get_i64(SP + 40).unwrap(), 4);
            assert_eq!(mem.get_u8(SP + 48).unwrap(), 1);
        }

        put_value(&mut guest, SP + 32, &HostValue::string("not bytes"));
        GuestMemory::new(&mut guest.memory).write_bytes(DATA, b"zzzz").unwrap();
        copy_bytes_to_go(&mut guest, SP).unwrap();
        let mem = GuestMemory::new(&mut guest.memory);
        assert_eq!(mem.get_u8(SP + 48).unwrap(), 0);
        assert_eq!(mem.slice(DATA, 4).unwrap(), b"zzzz");
    }

    #[tokio::test]
    async fn copy_bytes_to_js_fills_host_buffer() {
        let mut guest = FakeGuest::new();
        let dst = HostValue::bytes(vec![0; 2]);
        put_value(&mut guest, SP + 8, &dst);
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.write_bytes(DATA, b"xyz").unwrap();
            mem.set_i64(SP + 16, i64::try_from(DATA).unwrap()).unwrap();
            mem.set_i64(SP + 24, 3).unwrap();
        }
        copy_bytes_to_js(&mut guest, SP).unwrap();
        let HostValue::Bytes(buf) = dst else { unreachable!() };
        assert_eq!(buf.snapshot(), b"xy");
        assert_eq!(GuestMemory::new(&mut guest.memory).get_i64(SP + 40).unwrap(), 2);
    }

    #[tokio::test]
    async fn finalize_ref_frees_handle() {
        let mut guest = FakeGuest::new();
        let obj = HostValue::object();
        put_value(&mut guest, SP + 8, &obj);
        assert_eq!(guest.state.live_handles(), 1);
        finalize_ref(&mut guest, SP).unwrap();
        assert_eq!(guest.state.live_handles(), 0);
        let err = {
            let (mem, state) = guest.parts().unwrap();
            mem.load_value(SP + 8, state.table().unwrap()).unwrap_err()
        };
        assert!(matches!(err, BridgeError::InvalidHandle(_)));
    }

    #[tokio::test]
    async fn length_and_index_follow_container_semantics() {
        let mut guest = FakeGuest::new();
        let arr = HostValue::array(vec!["a".into(), "b".into()]);
        put_value(&mut guest, SP + 8, &arr);
        value_length(&mut guest, SP).unwrap();
        assert_eq!(GuestMemory::new(&mut guest.memory).get_i64(SP + 16).unwrap(), 2);

        GuestMemory::new(&mut guest.memory).set_i64(SP + 16, 5).unwrap();
        value_index(&mut guest, SP).unwrap();
        assert_eq!(read_value(&mut guest, SP + 24), HostValue::Undefined);
    }

    #[tokio::test]
    async fn operations_after_exit_fail() {
        let mut guest = FakeGuest::new();
        guest.state.exit(0);
        put_string(&mut guest, SP + 8, 0, "x");
        assert!(matches!(
            string_val(&mut guest, SP),
            Err(BridgeError::AlreadyExited(0))
        ));
    }
}
