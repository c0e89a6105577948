use rand::RngCore;
use tracing::{debug, trace};

use crate::context::GuestContext;
use crate::error::BridgeResult;

// func wasmExit(code int32)
pub(crate) fn wasm_exit(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let code = mem.get_i32(sp + 8)?;
    state.exit(code);
    Ok(())
}

// func wasmWrite(fd uintptr, p unsafe.Pointer, n int32)
#[allow(clippy::cast_sign_loss)]
pub(crate) fn wasm_write(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let fd = mem.get_i64(sp + 8)?;
    let ptr = mem.get_i64(sp + 16)?;
    let len = mem.get_i32(sp + 24)?;
    let buf = mem.slice(ptr as u64, u64::from(len as u32))?;
    if let Err(err) = state.shim.write_sync(fd, buf) {
        debug!(fd, error = %err, "dropping guest write");
    }
    Ok(())
}

// func nanotime1() int64
pub(crate) fn nanotime(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    mem.set_i64(sp + 8, state.clock.nanotime())
}

// func walltime() (sec int64, nsec int32)
pub(crate) fn walltime(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, _) = cx.parts()?;
    let now = chrono::Utc::now();
    mem.set_i64(sp + 8, now.timestamp())?;
    #[allow(clippy::cast_possible_wrap)]
    mem.set_i32(sp + 16, now.timestamp_subsec_nanos() as i32)
}

// func scheduleTimeoutEvent(delay int64) int32
pub(crate) fn schedule_timeout_event(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, state) = cx.parts()?;
    let delay = mem.get_i64(sp + 8)?;
    let id = state.scheduler.schedule_timeout(delay);
    trace!(timer_id = id, delay_ms = delay, "scheduled timeout event");
    mem.set_i32(sp + 16, id)
}

// func clearTimeoutEvent(id int32)
pub(crate) fn clear_timeout_event(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mem, state) = cx.parts()?;
    let id = mem.get_i32(sp + 8)?;
    if !state.scheduler.clear_timeout(id) {
        trace!(timer_id = id, "cleared timer was not pending");
    }
    Ok(())
}

// func getRandomData(r []byte)
pub(crate) fn get_random_data(cx: &mut dyn GuestContext, sp: u64) -> BridgeResult<()> {
    let (mut mem, _) = cx.parts()?;
    rand::thread_rng().fill_bytes(mem.load_slice_mut(sp + 8)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::tests::FakeGuest;
    use crate::error::BridgeError;
    use crate::memory::GuestMemory;
    use crate::options::BridgeOptions;
    use crate::scheduler::GuestState;
    use crate::shim::HostShim;
    use crate::state::BridgeState;

    const SP: u64 = 1024;

    #[tokio::test]
    async fn exit_records_code_and_drops_table() {
        let mut guest = FakeGuest::new();
        GuestMemory::new(&mut guest.memory).set_i32(SP + 8, 3).unwrap();
        wasm_exit(&mut guest, SP).unwrap();
        assert_eq!(guest.state.scheduler.state(), GuestState::Exited(3));
        assert!(matches!(
            guest.state.table(),
            Err(BridgeError::AlreadyExited(3))
        ));
    }

    #[tokio::test]
    async fn write_goes_through_shim() {
        let mut guest = FakeGuest::new();
        let shim = Arc::new(HostShim::capturing());
        let options = BridgeOptions {
            shim: Some(Arc::clone(&shim)),
            ..BridgeOptions::default()
        };
        guest.state = BridgeState::new(&options, tokio::runtime::Handle::current());
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.write_bytes(2048, b"hello\n").unwrap();
            mem.set_i64(SP + 8, 1).unwrap();
            mem.set_i64(SP + 16, 2048).unwrap();
            mem.set_i32(SP + 24, 6).unwrap();
        }
        wasm_write(&mut guest, SP).unwrap();
        assert_eq!(shim.captured(), vec![(1, "hello".to_owned())]);

        GuestMemory::new(&mut guest.memory).set_i64(SP + 8, 9).unwrap();
        wasm_write(&mut guest, SP).unwrap();
        assert_eq!(shim.captured().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nanotime_is_monotonic() {
        let mut guest = FakeGuest::new();
        nanotime(&mut guest, SP).unwrap();
        let first = GuestMemory::new(&mut guest.memory).get_i64(SP + 8).unwrap();
        tokio::time::advance(std::time::Duration::from_millis(1)).await;
        nanotime(&mut guest, SP).unwrap();
        let second = GuestMemory::new(&mut guest.memory).get_i64(SP + 8).unwrap();
        assert!(second - first >= 1_000_000);
    }

    #[tokio::test]
    async fn walltime_splits_seconds_and_nanos() {
        let mut guest = FakeGuest::new();
        let before = chrono::Utc::now().timestamp();
        walltime(&mut guest, SP).unwrap();
        let mem = GuestMemory::new(&mut guest.memory);
        let sec = mem.get_i64(SP + 8).unwrap();
        let nsec = mem.get_i32(SP + 16).unwrap();
        assert!(sec >= before);
        assert!((0..1_000_000_000).contains(&nsec));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_scheduled_and_cleared() {
        let mut guest = FakeGuest::new();
        GuestMemory::new(&mut guest.memory).set_i64(SP + 8, 50).unwrap();
        schedule_timeout_event(&mut guest, SP).unwrap();
        let id = GuestMemory::new(&mut guest.memory).get_i32(SP + 16).unwrap();
        assert!(guest.state.scheduler.is_pending(id));

        GuestMemory::new(&mut guest.memory).set_i32(SP + 8, id).unwrap();
        clear_timeout_event(&mut guest, SP).unwrap();
        assert!(!guest.state.scheduler.is_pending(id));
        clear_timeout_event(&mut guest, SP).unwrap();
    }

    #[tokio::test]
    async fn random_data_fills_slice() {
        let mut guest = FakeGuest::new();
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_i64(SP + 8, 2048).unwrap();
            mem.set_i64(SP + 16, 64).unwrap();
        }
        get_random_data(&mut guest, SP).unwrap();
        let mem = GuestMemory::new(&mut guest.memory);
        assert!(mem.slice(2048, 64).unwrap().iter().any(|b| *b != 0));
        assert!(mem.slice(2112, 16).unwrap().iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn random_data_out_of_bounds_traps() {
        let mut guest = FakeGuest::new();
        {
            let mut mem = GuestMemory::new(&mut guest.memory);
            mem.set_i64(SP + 8, 4000).unwrap();
            mem.set_i64(SP + 16, 200).unwrap();
        }
        assert!(matches!(
            get_random_data(&mut guest, SP),
            Err(BridgeError::MemoryAccess { .. })
        ));
    }
}
