//! The two reserved objects the guest sees from the start: the global
//! context and the bridge instance.

use std::sync::Arc;

use tracing::trace;

use crate::shim::HostShim;
use crate::value::{Class, HostFunction, HostValue};

/// Build the global context: built-in constructors plus the OS shim.
pub(crate) fn global_object(shim: &Arc<HostShim>) -> HostValue {
    let global = HostValue::object();
    for class in [
        Class::Object,
        Class::Array,
        Class::Uint8Array,
        Class::Date,
        Class::Error,
    ] {
        global.set(
            class.name(),
            HostValue::Function(Arc::new(HostFunction::constructor(class))),
        );
    }
    shim.install(&global);
    global
}

/// Build the bridge instance object.
///
/// `_makeFuncWrapper(id)` hands the guest a host function that, when called,
/// re-enters the guest to run its callback `id`.
pub(crate) fn bridge_object() -> HostValue {
    let bridge = HostValue::object();
    bridge.set("_pendingEvent", HostValue::Null);
    bridge.set(
        "_makeFuncWrapper",
        HostValue::native("_makeFuncWrapper", |_, _, args| {
            let id = args
                .first()
                .and_then(HostValue::as_f64)
                .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX))
                .ok_or_else(|| HostValue::type_error("callback id must be a non-negative integer"))?;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let id = id as u32;
            trace!(callback_id = id, "wrapped guest callback");
            Ok(HostValue::Function(Arc::new(HostFunction::guest_callback(id))))
        }),
    );
    bridge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FunctionKind;

    #[test]
    fn global_exposes_constructors_and_shim() {
        let global = global_object(&Arc::new(HostShim::new()));
        for name in ["Object", "Array", "Uint8Array", "Date", "Error", "fs", "process", "path"] {
            assert!(!global.get(name).is_nullish(), "missing {name}");
        }
        let arr = HostValue::array(vec![]);
        assert!(arr.instance_of(&global.get("Array")));
        assert!(arr.instance_of(&global.get("Object")));
        assert!(!arr.instance_of(&global.get("Uint8Array")));
    }

    #[test]
    fn bridge_starts_without_pending_event() {
        let bridge = bridge_object();
        assert_eq!(bridge.get("_pendingEvent"), HostValue::Null);
        let HostValue::Function(f) = bridge.get("_makeFuncWrapper") else {
            panic!("wrapper factory missing");
        };
        assert!(matches!(f.kind(), FunctionKind::Native(_)));
    }
}
