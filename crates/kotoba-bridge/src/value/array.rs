use std::sync::Mutex;

use tracing::debug;

use super::facade::array_index;
use super::{DynamicObject, HostValue, lock};

/// Longest array the host will hold for the guest. Writes past it are
/// dropped and `Array(n)` beyond it throws a `RangeError`.
pub const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// Largest `Uint8Array` the host will allocate for the guest.
pub const MAX_BYTES_LENGTH: usize = 1 << 28;

#[derive(Debug, Default)]
struct Elements {
    /// Stored elements. May be shorter than `len`; the tail reads as
    /// `undefined`.
    items: Vec<HostValue>,
    len: usize,
}

/// A growable array of values.
#[derive(Debug, Default)]
pub struct HostArray {
    elements: Mutex<Elements>,
}

impl HostArray {
    /// An array holding `items`.
    #[must_use]
    pub fn new(items: Vec<HostValue>) -> Self {
        let len = items.len();
        Self {
            elements: Mutex::new(Elements { items, len }),
        }
    }

    /// A sparse array of `len` holes. Nothing is allocated for the holes.
    #[must_use]
    pub fn with_length(len: usize) -> Self {
        Self {
            elements: Mutex::new(Elements {
                items: Vec::new(),
                len: len.min(MAX_ARRAY_LENGTH),
            }),
        }
    }

    /// A copy of the current elements, holes filled with `undefined`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HostValue> {
        let elements = lock(&self.elements);
        let mut items = elements.items.clone();
        items.resize(elements.len, HostValue::Undefined);
        items
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.elements).len
    }

    /// Whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value. Dropped once the array is at [`MAX_ARRAY_LENGTH`].
    pub fn push(&self, value: HostValue) {
        let index = self.len();
        self.store(index, value);
    }

    fn store(&self, index: usize, value: HostValue) {
        if index >= MAX_ARRAY_LENGTH {
            debug!(index, "dropping array write past the length limit");
            return;
        }
        let mut elements = lock(&self.elements);
        if index >= elements.items.len() {
            elements.items.resize(index + 1, HostValue::Undefined);
        }
        elements.items[index] = value;
        elements.len = elements.len.max(index + 1);
    }

    fn load(&self, index: usize) -> HostValue {
        lock(&self.elements)
            .items
            .get(index)
            .cloned()
            .unwrap_or(HostValue::Undefined)
    }
}

impl DynamicObject for HostArray {
    #[allow(clippy::cast_precision_loss)]
    fn get(&self, key: &str) -> HostValue {
        if key == "length" {
            return HostValue::Number(self.len() as f64);
        }
        array_index(key).map_or(HostValue::Undefined, |i| self.load(i))
    }

    fn set(&self, key: &str, value: HostValue) {
        if let Some(i) = array_index(key) {
            self.store(i, value);
        }
    }

    fn delete(&self, key: &str) {
        if let Some(i) = array_index(key) {
            let mut elements = lock(&self.elements);
            if let Some(slot) = elements.items.get_mut(i) {
                *slot = HostValue::Undefined;
            }
        }
    }

    fn index(&self, index: i64) -> HostValue {
        usize::try_from(index).map_or(HostValue::Undefined, |i| self.load(i))
    }

    fn set_index(&self, index: i64, value: HostValue) {
        if let Ok(i) = usize::try_from(index) {
            self.store(i, value);
        }
    }

    fn length(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// A fixed-length byte buffer, the host side of a `Uint8Array`.
#[derive(Debug, Default)]
pub struct HostBytes {
    bytes: Mutex<Vec<u8>>,
}

impl HostBytes {
    /// A buffer holding `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    /// A copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        lock(&self.bytes).clone()
    }

    /// Buffer length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.bytes).len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.bytes).is_empty()
    }

    /// Overwrite the front of the buffer with `src`, returning how many bytes
    /// were copied.
    pub fn copy_from(&self, src: &[u8]) -> usize {
        let mut bytes = lock(&self.bytes);
        let n = bytes.len().min(src.len());
        bytes[..n].copy_from_slice(&src[..n]);
        n
    }

    /// Copy the front of the buffer into `dst`, returning how many bytes were
    /// copied.
    pub fn copy_into(&self, dst: &mut [u8]) -> usize {
        let bytes = lock(&self.bytes);
        let n = bytes.len().min(dst.len());
        dst[..n].copy_from_slice(&bytes[..n]);
        n
    }

    fn load(&self, index: usize) -> HostValue {
        lock(&self.bytes)
            .get(index)
            .map_or(HostValue::Undefined, |b| HostValue::Number(f64::from(*b)))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn store(&self, index: usize, value: &HostValue) {
        let mut bytes = lock(&self.bytes);
        if let Some(slot) = bytes.get_mut(index) {
            let n = value.as_f64().unwrap_or(0.0);
            *slot = if n.is_finite() {
                n.trunc().rem_euclid(256.0) as u8
            } else {
                0
            };
        }
    }
}

impl DynamicObject for HostBytes {
    #[allow(clippy::cast_precision_loss)]
    fn get(&self, key: &str) -> HostValue {
        match key {
            "length" | "byteLength" => HostValue::Number(self.len() as f64),
            _ => array_index(key).map_or(HostValue::Undefined, |i| self.load(i)),
        }
    }

    fn set(&self, key: &str, value: HostValue) {
        if let Some(i) = array_index(key) {
            self.store(i, &value);
        }
    }

    fn delete(&self, _key: &str) {}

    fn index(&self, index: i64) -> HostValue {
        usize::try_from(index).map_or(HostValue::Undefined, |i| self.load(i))
    }

    fn set_index(&self, index: i64, value: HostValue) {
        if let Ok(i) = usize::try_from(index) {
            self.store(i, &value);
        }
    }

    fn length(&self) -> Option<usize> {
        Some(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_grows_on_out_of_range_write() {
        let arr = HostArray::new(vec![]);
        arr.set_index(2, HostValue::Bool(true));
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.index(0), HostValue::Undefined);
        assert_eq!(arr.get("2"), HostValue::Bool(true));
        assert_eq!(arr.get("length"), HostValue::Number(3.0));
    }

    #[test]
    fn array_negative_index_is_undefined() {
        let arr = HostArray::new(vec![HostValue::Null]);
        assert_eq!(arr.index(-1), HostValue::Undefined);
        arr.set_index(-1, HostValue::Null);
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn huge_indices_are_dropped() {
        let arr = HostArray::new(vec![HostValue::Null]);
        arr.set_index(i64::MAX, HostValue::Bool(true));
        arr.set_index(i64::try_from(MAX_ARRAY_LENGTH).unwrap(), HostValue::Bool(true));
        arr.set(&usize::MAX.to_string(), HostValue::Null);
        arr.set("4294967295", HostValue::Null);
        assert_eq!(arr.len(), 1);
        assert_eq!(arr.index(i64::MAX), HostValue::Undefined);
    }

    #[test]
    fn last_slot_below_limit_is_writable() {
        let arr = HostArray::new(vec![]);
        let last = MAX_ARRAY_LENGTH - 1;
        arr.set(&last.to_string(), HostValue::Bool(true));
        assert_eq!(arr.len(), MAX_ARRAY_LENGTH);
        assert_eq!(arr.get(&last.to_string()), HostValue::Bool(true));
        arr.push(HostValue::Null);
        assert_eq!(arr.len(), MAX_ARRAY_LENGTH);
    }

    #[test]
    fn sparse_array_reads_holes_as_undefined() {
        let arr = HostArray::with_length(4);
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.index(3), HostValue::Undefined);
        arr.set_index(1, HostValue::Bool(false));
        assert_eq!(arr.len(), 4);
        assert_eq!(
            arr.snapshot(),
            vec![
                HostValue::Undefined,
                HostValue::Bool(false),
                HostValue::Undefined,
                HostValue::Undefined
            ]
        );
        arr.push(HostValue::Null);
        assert_eq!(arr.index(4), HostValue::Null);
    }

    #[test]
    fn bytes_truncate_written_numbers() {
        let buf = HostBytes::new(vec![0; 4]);
        buf.set_index(0, HostValue::Number(257.0));
        buf.set_index(1, HostValue::Number(-1.0));
        buf.set_index(2, HostValue::Number(12.9));
        buf.set_index(9, HostValue::Number(1.0));
        assert_eq!(buf.snapshot(), vec![1, 255, 12, 0]);
        assert_eq!(buf.get("byteLength"), HostValue::Number(4.0));
    }

    #[test]
    fn bytes_copy_is_bounded_by_shorter_side() {
        let buf = HostBytes::new(vec![0; 3]);
        assert_eq!(buf.copy_from(b"hello"), 3);
        assert_eq!(buf.snapshot(), b"hel");

        let mut out = [0u8; 8];
        assert_eq!(buf.copy_into(&mut out), 3);
        assert_eq!(&out[..3], b"hel");
    }
}
