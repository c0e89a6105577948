use std::sync::Arc;

use super::HostValue;

/// Property access over one container kind.
///
/// Every method is total: absent properties read as `undefined` and writes
/// a container cannot hold are dropped, matching how the guest's runtime
/// expects host containers to behave.
pub trait DynamicObject {
    /// Read a named property.
    fn get(&self, key: &str) -> HostValue;

    /// Write a named property.
    fn set(&self, key: &str, value: HostValue);

    /// Remove a named property.
    fn delete(&self, key: &str);

    /// Read an indexed element.
    fn index(&self, index: i64) -> HostValue {
        self.get(&index.to_string())
    }

    /// Write an indexed element.
    fn set_index(&self, index: i64, value: HostValue) {
        self.set(&index.to_string(), value);
    }

    /// The container's `length`, if it has one.
    fn length(&self) -> Option<usize>;
}

/// Parse a property key that names an array index. Indices stop at
/// `2^32 - 2`; larger numeric keys are plain property names.
pub(super) fn array_index(key: &str) -> Option<usize> {
    if !key.bytes().all(|b| b.is_ascii_digit()) || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    let index: u32 = key.parse().ok()?;
    if index == u32::MAX {
        return None;
    }
    usize::try_from(index).ok()
}

impl DynamicObject for Arc<str> {
    fn get(&self, key: &str) -> HostValue {
        if key == "length" {
            return HostValue::Number(utf16_len(self) as f64);
        }
        array_index(key).map_or(HostValue::Undefined, |i| char_at(self, i))
    }

    fn set(&self, _key: &str, _value: HostValue) {}

    fn delete(&self, _key: &str) {}

    fn index(&self, index: i64) -> HostValue {
        usize::try_from(index).map_or(HostValue::Undefined, |i| char_at(self, i))
    }

    fn length(&self) -> Option<usize> {
        Some(utf16_len(self))
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn char_at(s: &str, index: usize) -> HostValue {
    s.encode_utf16()
        .nth(index)
        .map_or(HostValue::Undefined, |unit| {
            HostValue::string(String::from_utf16_lossy(&[unit]))
        })
}
