//! Bounds-checked views of guest linear memory.
//!
//! Every scalar is little-endian. A 64-bit integer is split into a low
//! unsigned word and a high signed word, which is how the guest's toolchain
//! lays them out for the host.

use crate::error::{BridgeError, BridgeResult};
use crate::slot::{self, Slot};
use crate::table::ValueTable;
use crate::value::HostValue;

/// A mutable window onto the guest's linear memory.
///
/// The view borrows the memory for the duration of one host call; it must
/// be re-taken after anything that can grow memory, such as resuming the
/// guest.
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    /// Wrap a linear memory buffer.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Size of the memory in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the memory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn range(&self, addr: u64, len: u64) -> BridgeResult<std::ops::Range<usize>> {
        let fault = || BridgeError::MemoryAccess { addr, len };
        let start = usize::try_from(addr).map_err(|_| fault())?;
        let size = usize::try_from(len).map_err(|_| fault())?;
        let end = start.checked_add(size).ok_or_else(fault)?;
        if end > self.bytes.len() {
            return Err(fault());
        }
        Ok(start..end)
    }

    fn array<const N: usize>(&self, addr: u64) -> BridgeResult<[u8; N]> {
        let range = self.range(addr, N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    fn put(&mut self, addr: u64, data: &[u8]) -> BridgeResult<()> {
        let range = self.range(addr, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Read one byte.
    pub fn get_u8(&self, addr: u64) -> BridgeResult<u8> {
        Ok(self.array::<1>(addr)?[0])
    }

    /// Write one byte.
    pub fn set_u8(&mut self, addr: u64, v: u8) -> BridgeResult<()> {
        self.put(addr, &[v])
    }

    /// Read an unsigned 32-bit word.
    pub fn get_u32(&self, addr: u64) -> BridgeResult<u32> {
        self.array(addr).map(u32::from_le_bytes)
    }

    /// Write an unsigned 32-bit word.
    pub fn set_u32(&mut self, addr: u64, v: u32) -> BridgeResult<()> {
        self.put(addr, &v.to_le_bytes())
    }

    /// Read a signed 32-bit word.
    pub fn get_i32(&self, addr: u64) -> BridgeResult<i32> {
        self.array(addr).map(i32::from_le_bytes)
    }

    /// Write a signed 32-bit word.
    pub fn set_i32(&mut self, addr: u64, v: i32) -> BridgeResult<()> {
        self.put(addr, &v.to_le_bytes())
    }

    /// Read a 64-bit integer stored as a low `u32` and a high `i32`.
    pub fn get_i64(&self, addr: u64) -> BridgeResult<i64> {
        let low = self.get_u32(addr)?;
        let high = self.get_i32(addr.saturating_add(4))?;
        Ok(i64::from(low) + i64::from(high) * 0x1_0000_0000)
    }

    /// Write a 64-bit integer as a low `u32` and a high `i32`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_i64(&mut self, addr: u64, v: i64) -> BridgeResult<()> {
        self.set_u32(addr, v as u32)?;
        self.set_i32(addr.saturating_add(4), (v >> 32) as i32)
    }

    /// Read a double.
    pub fn get_f64(&self, addr: u64) -> BridgeResult<f64> {
        self.array(addr).map(f64::from_le_bytes)
    }

    /// Write a double.
    pub fn set_f64(&mut self, addr: u64, v: f64) -> BridgeResult<()> {
        self.put(addr, &v.to_le_bytes())
    }

    /// Read a raw slot.
    pub fn load_slot(&self, addr: u64) -> BridgeResult<Slot> {
        self.array(addr).map(|b| slot::decode(u64::from_le_bytes(b)))
    }

    /// Write a raw slot.
    pub fn store_slot(&mut self, addr: u64, slot: Slot) -> BridgeResult<()> {
        self.put(addr, &slot::encode(slot).to_le_bytes())
    }

    /// Borrow `len` bytes at `ptr`.
    pub fn slice(&self, ptr: u64, len: u64) -> BridgeResult<&[u8]> {
        let range = self.range(ptr, len)?;
        Ok(&self.bytes[range])
    }

    /// Mutably borrow `len` bytes at `ptr`.
    pub fn slice_mut(&mut self, ptr: u64, len: u64) -> BridgeResult<&mut [u8]> {
        let range = self.range(ptr, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Copy bytes into memory at `addr`.
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> BridgeResult<()> {
        self.put(addr, data)
    }

    /// Read a `(ptr, len)` pair of 64-bit integers at `addr`.
    #[allow(clippy::cast_sign_loss)]
    fn load_span(&self, addr: u64) -> BridgeResult<(u64, u64)> {
        let ptr = self.get_i64(addr)?;
        let len = self.get_i64(addr.saturating_add(8))?;
        if ptr < 0 || len < 0 {
            return Err(BridgeError::MemoryAccess {
                addr: ptr as u64,
                len: len as u64,
            });
        }
        Ok((ptr as u64, len as u64))
    }

    /// Read the `(ptr, len)` pair at `addr` and return the bytes it names.
    pub fn load_slice(&self, addr: u64) -> BridgeResult<&[u8]> {
        let (ptr, len) = self.load_span(addr)?;
        self.slice(ptr, len)
    }

    /// Read the `(ptr, len)` pair at `addr` and return the bytes it names,
    /// mutably.
    pub fn load_slice_mut(&mut self, addr: u64) -> BridgeResult<&mut [u8]> {
        let (ptr, len) = self.load_span(addr)?;
        self.slice_mut(ptr, len)
    }

    /// Read the `(ptr, len)` pair at `addr` as UTF-8, replacing invalid
    /// sequences.
    pub fn load_string(&self, addr: u64) -> BridgeResult<String> {
        self.load_slice(addr)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read the slot at `addr` and resolve it against the value table.
    pub fn load_value(&self, addr: u64, table: &ValueTable) -> BridgeResult<HostValue> {
        table.resolve(self.load_slot(addr)?)
    }

    /// Store `value` in the table and write its slot at `addr`.
    pub fn store_value(
        &mut self,
        addr: u64,
        value: &HostValue,
        table: &mut ValueTable,
    ) -> BridgeResult<()> {
        let slot = table.store(value);
        self.store_slot(addr, slot)
    }

    /// Read the `(ptr, len)` pair at `addr` as an array of slots and resolve
    /// each one.
    pub fn load_values(&self, addr: u64, table: &ValueTable) -> BridgeResult<Vec<HostValue>> {
        let (ptr, len) = self.load_span(addr)?;
        let bytes = len
            .checked_mul(8)
            .ok_or(BridgeError::MemoryAccess { addr: ptr, len })?;
        self.range(ptr, bytes)?;
        (0..len)
            .map(|i| self.load_value(ptr + i * 8, table))
            .collect()
    }
}
