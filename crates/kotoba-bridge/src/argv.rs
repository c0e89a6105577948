//! Encoding of process arguments and environment into guest memory.

use std::collections::BTreeMap;

use crate::error::{BridgeError, BridgeResult};
use crate::memory::GuestMemory;

/// Offset at which argument encoding starts.
pub const ARGV_BASE: u32 = 4096;

/// Lowest address the guest linker may place data at. Arguments must end
/// strictly below it.
pub const MIN_DATA_ADDR: u32 = 4096 + 8192;

fn write_cstr(mem: &mut GuestMemory<'_>, offset: &mut u64, s: &str) -> BridgeResult<u64> {
    let ptr = *offset;
    mem.write_bytes(ptr, s.as_bytes())?;
    mem.set_u8(ptr + s.len() as u64, 0)?;
    *offset += padded(s.len());
    Ok(ptr)
}

fn padded(len: usize) -> u64 {
    // One byte for the terminator, then round up to 8.
    (len as u64 + 1).next_multiple_of(8)
}

/// Write `argv` followed by sorted `KEY=VALUE` environment entries, then the
/// pointer table the guest's `run` expects. Returns `(argc, argv_ptr)`.
///
/// The full size is computed before anything is written, so an overflow
/// leaves memory untouched.
pub fn encode_args(
    mem: &mut GuestMemory<'_>,
    argv: &[String],
    env: &BTreeMap<String, String>,
) -> BridgeResult<(i32, i32)> {
    let env_entries: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let pointer_count = (argv.len() + env_entries.len()) as u64 + 2;
    let required = argv
        .iter()
        .chain(&env_entries)
        .map(|s| padded(s.len()))
        .sum::<u64>()
        + pointer_count * 8;
    let limit = MIN_DATA_ADDR - ARGV_BASE;
    if required >= u64::from(limit) {
        return Err(BridgeError::ArgvOverflow {
            base: ARGV_BASE,
            required: u32::try_from(required).unwrap_or(u32::MAX),
            limit,
        });
    }

    let mut offset = u64::from(ARGV_BASE);
    let mut pointers = Vec::with_capacity(argv.len() + env_entries.len() + 2);
    for arg in argv {
        pointers.push(write_cstr(mem, &mut offset, arg)?);
    }
    pointers.push(0);
    for entry in &env_entries {
        pointers.push(write_cstr(mem, &mut offset, entry)?);
    }
    pointers.push(0);

    let argv_ptr = offset;
    for ptr in pointers {
        mem.set_u32(offset, u32::try_from(ptr).unwrap_or(u32::MAX))?;
        mem.set_u32(offset + 4, 0)?;
        offset += 8;
    }

    let argc = i32::try_from(argv.len()).unwrap_or(i32::MAX);
    #[allow(clippy::cast_possible_truncation)]
    Ok((argc, argv_ptr as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Vec<u8> {
        vec![0u8; MIN_DATA_ADDR as usize + 64]
    }

    #[test]
    fn default_argv_layout() {
        let mut buf = memory();
        let mut mem = GuestMemory::new(&mut buf);
        let (argc, argv) = encode_args(&mut mem, &["js".to_owned()], &BTreeMap::new()).unwrap();
        assert_eq!(argc, 1);
        // "js\0" padded to 8 bytes.
        assert_eq!(argv, 4096 + 8);
        assert_eq!(mem.slice(4096, 3).unwrap(), b"js\0");
        assert_eq!(mem.get_i64(4104).unwrap(), 4096);
        assert_eq!(mem.get_i64(4112).unwrap(), 0);
        assert_eq!(mem.get_i64(4120).unwrap(), 0);
    }

    #[test]
    fn env_is_sorted_after_argv() {
        let mut buf = memory();
        let mut mem = GuestMemory::new(&mut buf);
        let env = BTreeMap::from([
            ("ZED".to_owned(), "1".to_owned()),
            ("ALPHA".to_owned(), "2".to_owned()),
        ]);
        let (argc, argv) = encode_args(&mut mem, &["js".to_owned()], &env).unwrap();
        assert_eq!(argc, 1);
        let argv = u64::try_from(argv).unwrap();

        let first_env = u64::try_from(mem.get_i64(argv + 16).unwrap()).unwrap();
        assert_eq!(mem.slice(first_env, 7).unwrap(), b"ALPHA=2");
        let second_env = u64::try_from(mem.get_i64(argv + 24).unwrap()).unwrap();
        assert_eq!(mem.slice(second_env, 5).unwrap(), b"ZED=1");
        assert_eq!(mem.get_i64(argv + 32).unwrap(), 0);
    }

    #[test]
    fn overflow_is_detected_before_writing() {
        let mut buf = memory();
        let mut mem = GuestMemory::new(&mut buf);
        let huge = vec!["x".repeat(9000)];
        let err = encode_args(&mut mem, &huge, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ArgvOverflow {
                base: 4096,
                limit: 8192,
                ..
            }
        ));
        assert_eq!(mem.get_u8(4096).unwrap(), 0);
    }

    #[test]
    fn exact_fit_still_overflows() {
        let mut buf = memory();
        let mut mem = GuestMemory::new(&mut buf);
        // 8167 bytes plus the terminator is 8168; three pointers bring the
        // total to exactly the limit, which does not fit.
        let arg = vec!["y".repeat(8167)];
        assert!(encode_args(&mut mem, &arg, &BTreeMap::new()).is_err());
        // 8160 + 24 = 8184 fits.
        let arg = vec!["y".repeat(8159)];
        assert!(encode_args(&mut mem, &arg, &BTreeMap::new()).is_ok());
    }
}
