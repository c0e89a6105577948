//! Handle table for host values the guest holds references to.
//!
//! Handles are dense `u32` indices. The first [`RESERVED_HANDLES`] are
//! immortal and pre-populated; every other handle is reference counted by
//! the guest and recycled through a LIFO free pool once its count drops to
//! zero. A value keeps the same handle for as long as it is live, so the
//! guest can compare references by handle.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{BridgeError, BridgeResult};
use crate::slot::{Slot, TypeTag};
use crate::value::{HostValue, IdentityKey};

/// Handles with fixed meaning.
pub mod reserved {
    /// `NaN`.
    pub const NAN: u32 = 0;
    /// The number `0`.
    pub const ZERO: u32 = 1;
    /// `null`.
    pub const NULL: u32 = 2;
    /// `true`.
    pub const TRUE: u32 = 3;
    /// `false`.
    pub const FALSE: u32 = 4;
    /// The global context object.
    pub const GLOBAL: u32 = 5;
    /// The bridge object the guest stores callback state on.
    pub const BRIDGE: u32 = 6;
}

/// Number of immortal handles at the bottom of the table.
pub const RESERVED_HANDLES: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefCount {
    Immortal,
    Live(u32),
}

#[derive(Debug)]
struct Entry {
    value: Option<HostValue>,
    refs: RefCount,
}

/// Bidirectional mapping between host values and guest handles.
#[derive(Debug)]
pub struct ValueTable {
    entries: Vec<Entry>,
    ids: HashMap<IdentityKey, u32>,
    free: Vec<u32>,
}

impl ValueTable {
    /// A table pre-populated with the reserved handles.
    #[must_use]
    pub fn new(global: HostValue, bridge: HostValue) -> Self {
        let fixed = [
            HostValue::Number(f64::NAN),
            HostValue::Number(0.0),
            HostValue::Null,
            HostValue::Bool(true),
            HostValue::Bool(false),
            global,
            bridge,
        ];
        let mut ids = HashMap::new();
        let entries = fixed
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                if let Some(key) = value.identity() {
                    #[allow(clippy::cast_possible_truncation)]
                    ids.insert(key, i as u32);
                }
                Entry {
                    value: Some(value),
                    refs: RefCount::Immortal,
                }
            })
            .collect();
        Self {
            entries,
            ids,
            free: Vec::new(),
        }
    }

    /// Store a value, returning the slot the guest should see.
    ///
    /// Numbers other than `NaN` and `0` are carried inline; everything else
    /// gets a handle, and each store of a non-reserved reference bumps its
    /// reference count by one.
    pub fn store(&mut self, value: &HostValue) -> Slot {
        let (id, tag) = match value {
            HostValue::Undefined => return Slot::Undefined,
            HostValue::Number(n) if n.is_nan() => (reserved::NAN, TypeTag::None),
            HostValue::Number(n) if *n == 0.0 => (reserved::ZERO, TypeTag::None),
            HostValue::Number(n) => return Slot::Number(*n),
            HostValue::Null => (reserved::NULL, TypeTag::None),
            HostValue::Bool(true) => (reserved::TRUE, TypeTag::None),
            HostValue::Bool(false) => (reserved::FALSE, TypeTag::None),
            _ => (self.intern(value), TypeTag::for_type_name(value.type_name())),
        };
        Slot::Ref { id, tag }
    }

    fn intern(&mut self, value: &HostValue) -> u32 {
        let key = value.identity();
        let existing = key.as_ref().and_then(|k| self.ids.get(k).copied());
        let id = match existing {
            Some(id) => id,
            None => {
                let entry = Entry {
                    value: Some(value.clone()),
                    refs: RefCount::Live(0),
                };
                let id = if let Some(id) = self.free.pop() {
                    self.entries[id as usize] = entry;
                    id
                } else {
                    self.entries.push(entry);
                    #[allow(clippy::cast_possible_truncation)]
                    let id = (self.entries.len() - 1) as u32;
                    id
                };
                if let Some(key) = key {
                    self.ids.insert(key, id);
                }
                trace!(handle = id, kind = value.type_name(), "allocated value handle");
                id
            },
        };
        self.retain(id);
        id
    }

    /// Look up a live handle.
    pub fn load(&self, id: u32) -> BridgeResult<HostValue> {
        self.entries
            .get(id as usize)
            .and_then(|e| e.value.clone())
            .ok_or(BridgeError::InvalidHandle(id))
    }

    /// Resolve a decoded slot to a value.
    pub fn resolve(&self, slot: Slot) -> BridgeResult<HostValue> {
        match slot {
            Slot::Undefined => Ok(HostValue::Undefined),
            Slot::Number(n) => Ok(HostValue::Number(n)),
            Slot::Ref { id, .. } => self.load(id),
        }
    }

    /// Add one reference to a non-reserved handle.
    pub fn retain(&mut self, id: u32) {
        if let Some(Entry {
            refs: RefCount::Live(n),
            ..
        }) = self.entries.get_mut(id as usize)
        {
            *n = n.saturating_add(1);
        }
    }

    /// Drop one reference. Reserved handles and handles already at zero are
    /// left untouched; reaching zero frees the handle for reuse.
    pub fn release(&mut self, id: u32) {
        let Some(entry) = self.entries.get_mut(id as usize) else {
            return;
        };
        let RefCount::Live(n) = &mut entry.refs else {
            return;
        };
        if *n == 0 {
            return;
        }
        *n -= 1;
        if *n > 0 {
            return;
        }
        if let Some(key) = entry.value.take().and_then(|v| v.identity()) {
            self.ids.remove(&key);
        }
        self.free.push(id);
        trace!(handle = id, "released value handle");
    }

    /// Current reference count of a handle; `None` for reserved or unknown
    /// handles.
    #[must_use]
    pub fn refcount(&self, id: u32) -> Option<u32> {
        match self.entries.get(id as usize)?.refs {
            RefCount::Live(n) => Some(n),
            RefCount::Immortal => None,
        }
    }

    /// Number of live, non-reserved handles.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.refs, RefCount::Live(_)) && e.value.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ValueTable {
        ValueTable::new(HostValue::object(), HostValue::object())
    }

    fn id_of(slot: Slot) -> u32 {
        match slot {
            Slot::Ref { id, .. } => id,
            other => panic!("expected ref, got {other:?}"),
        }
    }

    #[test]
    fn reserved_values_map_to_fixed_handles() {
        let mut t = table();
        assert_eq!(id_of(t.store(&HostValue::Number(f64::NAN))), reserved::NAN);
        assert_eq!(id_of(t.store(&HostValue::Number(0.0))), reserved::ZERO);
        assert_eq!(id_of(t.store(&HostValue::Number(-0.0))), reserved::ZERO);
        assert_eq!(id_of(t.store(&HostValue::Null)), reserved::NULL);
        assert_eq!(id_of(t.store(&HostValue::Bool(true))), reserved::TRUE);
        assert_eq!(id_of(t.store(&HostValue::Bool(false))), reserved::FALSE);
        assert_eq!(t.store(&HostValue::Undefined), Slot::Undefined);
        assert_eq!(t.store(&HostValue::Number(2.5)), Slot::Number(2.5));
    }

    #[test]
    fn global_is_found_by_identity() {
        let global = HostValue::object();
        let mut t = ValueTable::new(global.clone(), HostValue::object());
        assert_eq!(
            t.store(&global),
            Slot::Ref {
                id: reserved::GLOBAL,
                tag: TypeTag::Object
            }
        );
        assert_eq!(t.refcount(reserved::GLOBAL), None);
    }

    #[test]
    fn same_value_same_handle_and_counted() {
        let mut t = table();
        let obj = HostValue::object();
        let a = id_of(t.store(&obj));
        let b = id_of(t.store(&obj));
        assert_eq!(a, b);
        assert_eq!(a, RESERVED_HANDLES);
        assert_eq!(t.refcount(a), Some(2));
    }

    #[test]
    fn equal_strings_share_a_handle() {
        let mut t = table();
        let a = id_of(t.store(&HostValue::string("x")));
        let b = id_of(t.store(&HostValue::string("x")));
        assert_eq!(a, b);
    }

    #[test]
    fn release_frees_and_recycles_lifo() {
        let mut t = table();
        let a = id_of(t.store(&HostValue::object()));
        let b = id_of(t.store(&HostValue::object()));
        t.release(a);
        t.release(b);
        assert!(matches!(t.load(a), Err(BridgeError::InvalidHandle(_))));
        assert_eq!(t.live_handles(), 0);

        let c = id_of(t.store(&HostValue::object()));
        assert_eq!(c, b);
        let d = id_of(t.store(&HostValue::object()));
        assert_eq!(d, a);
    }

    #[test]
    fn released_value_gets_fresh_handle_on_restore() {
        let mut t = table();
        let s = HostValue::string("gone");
        let first = id_of(t.store(&s));
        t.release(first);
        let other = id_of(t.store(&HostValue::object()));
        assert_eq!(other, first);
        let again = id_of(t.store(&s));
        assert_ne!(again, first);
        assert_eq!(t.load(again).unwrap(), s);
    }

    #[test]
    fn release_is_a_noop_for_reserved_and_dead_handles() {
        let mut t = table();
        t.release(reserved::GLOBAL);
        assert!(t.load(reserved::GLOBAL).is_ok());

        let a = id_of(t.store(&HostValue::object()));
        t.release(a);
        t.release(a);
        t.release(9999);
        let b = id_of(t.store(&HostValue::object()));
        let c = id_of(t.store(&HostValue::object()));
        assert_eq!(b, a);
        assert_ne!(c, a);
    }

    #[test]
    fn resolve_reads_inline_and_ref_slots() {
        let mut t = table();
        let slot = t.store(&HostValue::string("v"));
        assert_eq!(t.resolve(slot).unwrap(), HostValue::string("v"));
        assert_eq!(t.resolve(Slot::Number(3.0)).unwrap(), HostValue::Number(3.0));
        assert_eq!(t.resolve(Slot::Undefined).unwrap(), HostValue::Undefined);
    }
}
