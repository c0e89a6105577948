use std::fmt;
use std::sync::Arc;

use super::array::{MAX_ARRAY_LENGTH, MAX_BYTES_LENGTH};
use super::{Class, DynamicObject, HostArray, HostBytes, HostObject, HostValue};
use crate::context::{GuestContext, invoke_guest};
use crate::error::BridgeResult;

/// Signature of a host-implemented function.
///
/// `Ok` is the return value and `Err` is a thrown value. Both flow back to
/// the guest in-band.
pub type NativeFn = Box<
    dyn Fn(&mut dyn GuestContext, &HostValue, &[HostValue]) -> Result<HostValue, HostValue>
        + Send
        + Sync,
>;

/// What happens when a function is called.
pub enum FunctionKind {
    /// Host code.
    Native(NativeFn),
    /// A built-in class constructor.
    Constructor(Class),
    /// A guest function exported through `_makeFuncWrapper`, by callback id.
    GuestCallback(u32),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Constructor(class) => write!(f, "Constructor({})", class.name()),
            Self::GuestCallback(id) => write!(f, "GuestCallback({id})"),
        }
    }
}

/// A callable host value.
#[derive(Debug)]
pub struct HostFunction {
    name: String,
    kind: FunctionKind,
    props: HostObject,
}

impl HostFunction {
    fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            props: HostObject::new(Class::Object),
        }
    }

    /// A function backed by host code.
    #[must_use]
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn GuestContext, &HostValue, &[HostValue]) -> Result<HostValue, HostValue>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, FunctionKind::Native(Box::new(f)))
    }

    /// The constructor for a built-in class.
    #[must_use]
    pub fn constructor(class: Class) -> Self {
        Self::new(class.name(), FunctionKind::Constructor(class))
    }

    /// A host-side wrapper that calls back into the guest.
    #[must_use]
    pub fn guest_callback(id: u32) -> Self {
        Self::new(String::new(), FunctionKind::GuestCallback(id))
    }

    /// The function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the function runs.
    #[must_use]
    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    /// Call the function with an explicit receiver.
    ///
    /// The outer `Result` carries bridge faults (such as a guest trap during
    /// a callback); the inner one is the call's own return or throw.
    pub fn call(
        &self,
        cx: &mut dyn GuestContext,
        this: &HostValue,
        args: &[HostValue],
    ) -> BridgeResult<Result<HostValue, HostValue>> {
        match &self.kind {
            FunctionKind::Native(f) => Ok(f(cx, this, args)),
            FunctionKind::Constructor(Class::Uint8Array) => Ok(Err(HostValue::type_error(
                "Constructor Uint8Array requires 'new'",
            ))),
            FunctionKind::Constructor(class) => Ok(construct_builtin(*class, args)),
            FunctionKind::GuestCallback(id) => invoke_guest(cx, *id, this, args),
        }
    }

    /// Call the function as a constructor.
    pub fn construct(
        &self,
        cx: &mut dyn GuestContext,
        args: &[HostValue],
    ) -> BridgeResult<Result<HostValue, HostValue>> {
        match &self.kind {
            FunctionKind::Constructor(class) => Ok(construct_builtin(*class, args)),
            FunctionKind::Native(f) => {
                let this = HostValue::object();
                Ok(f(cx, &this, args).map(|ret| match ret {
                    HostValue::Object(_)
                    | HostValue::Array(_)
                    | HostValue::Bytes(_)
                    | HostValue::Function(_) => ret,
                    _ => this,
                }))
            },
            FunctionKind::GuestCallback(_) => Ok(Err(HostValue::type_error(format!(
                "{} is not a constructor",
                if self.name.is_empty() { "function" } else { self.name.as_str() }
            )))),
        }
    }
}

impl DynamicObject for HostFunction {
    fn get(&self, key: &str) -> HostValue {
        if key == "name" && !self.props.contains("name") {
            return HostValue::string(&self.name);
        }
        self.props.get(key)
    }

    fn set(&self, key: &str, value: HostValue) {
        self.props.set(key, value);
    }

    fn delete(&self, key: &str) {
        self.props.delete(key);
    }

    fn length(&self) -> Option<usize> {
        None
    }
}

/// Build a new instance of a built-in class.
pub(crate) fn construct_builtin(class: Class, args: &[HostValue]) -> Result<HostValue, HostValue> {
    let first = args.first().cloned().unwrap_or(HostValue::Undefined);
    match class {
        Class::Object => Ok(match first {
            HostValue::Object(_) | HostValue::Array(_) | HostValue::Bytes(_) | HostValue::Function(_) => {
                first
            },
            _ => HostValue::object(),
        }),
        Class::Array => match (args.len(), first.as_f64()) {
            (1, Some(n)) => {
                let len = array_length(n, MAX_ARRAY_LENGTH).ok_or_else(|| invalid_length("array"))?;
                Ok(HostValue::Array(Arc::new(HostArray::with_length(len))))
            },
            _ => Ok(HostValue::array(args.to_vec())),
        },
        Class::Uint8Array => new_bytes(&first),
        Class::Date => Ok(new_date(first.as_f64())),
        Class::Error => Ok(HostValue::error(if first.is_nullish() {
            String::new()
        } else {
            first.to_js_string()
        })),
    }
}

/// A valid length no greater than `max`. JS accepts up to `2^32 - 1`; the
/// host stops well before that so one guest call cannot exhaust memory.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn array_length(n: f64, max: usize) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= max as f64).then_some(n as usize)
}

fn invalid_length(kind: &str) -> HostValue {
    let err = HostValue::error(format!("Invalid {kind} length"));
    err.set("name", HostValue::string("RangeError"));
    err
}

fn new_bytes(source: &HostValue) -> Result<HostValue, HostValue> {
    let bytes = match source {
        HostValue::Undefined => Vec::new(),
        HostValue::Number(n) => {
            let len =
                array_length(*n, MAX_BYTES_LENGTH).ok_or_else(|| invalid_length("typed array"))?;
            vec![0; len]
        },
        HostValue::Bytes(b) => b.snapshot(),
        HostValue::Array(a) => {
            let out = HostBytes::new(vec![0; a.len()]);
            for (i, item) in a.snapshot().into_iter().enumerate() {
                out.set(&i.to_string(), item);
            }
            out.snapshot()
        },
        _ => Vec::new(),
    };
    Ok(HostValue::bytes(bytes))
}

#[allow(clippy::cast_precision_loss)]
fn new_date(millis: Option<f64>) -> HostValue {
    let time = millis.unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as f64);
    let date = Arc::new(HostObject::new(Class::Date));
    date.set(
        "getTime",
        HostValue::native("getTime", move |_, _, _| Ok(HostValue::Number(time))),
    );
    // The guest reads the local zone from here; the host always reports UTC.
    date.set(
        "getTimezoneOffset",
        HostValue::native("getTimezoneOffset", |_, _, _| Ok(HostValue::Number(0.0))),
    );
    HostValue::Object(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_constructor_with_length() {
        let arr = construct_builtin(Class::Array, &[HostValue::Number(3.0)]).unwrap();
        assert_eq!(arr.length(), 3);
        assert_eq!(arr.index(0), HostValue::Undefined);
    }

    #[test]
    fn array_constructor_with_items() {
        let arr = construct_builtin(Class::Array, &["a".into(), "b".into()]).unwrap();
        assert_eq!(arr.length(), 2);
        assert_eq!(arr.index(1), HostValue::string("b"));
    }

    #[test]
    fn array_constructor_rejects_bad_length() {
        let err = construct_builtin(Class::Array, &[HostValue::Number(-1.0)]).unwrap_err();
        assert_eq!(err.get("name").as_str(), Some("RangeError"));
    }

    #[test]
    fn array_constructor_does_not_fill_holes() {
        let arr = construct_builtin(Class::Array, &[HostValue::Number(1000.0)]).unwrap();
        let HostValue::Array(inner) = &arr else {
            panic!("expected array")
        };
        assert_eq!(inner.len(), 1000);
        assert_eq!(arr.index(999), HostValue::Undefined);
    }

    #[test]
    fn oversized_lengths_throw_range_error() {
        for class in [Class::Array, Class::Uint8Array] {
            let err = construct_builtin(class, &[HostValue::Number(4_294_967_295.0)]).unwrap_err();
            assert_eq!(err.get("name").as_str(), Some("RangeError"));
        }
        #[allow(clippy::cast_precision_loss)]
        let just_over = (MAX_ARRAY_LENGTH + 1) as f64;
        assert!(construct_builtin(Class::Array, &[HostValue::Number(just_over)]).is_err());
        let err = construct_builtin(Class::Uint8Array, &[HostValue::Number(f64::INFINITY)]).unwrap_err();
        assert_eq!(err.to_js_string(), "RangeError: Invalid typed array length");
    }

    #[test]
    fn uint8array_from_length_and_array() {
        let zeroed = construct_builtin(Class::Uint8Array, &[HostValue::Number(4.0)]).unwrap();
        assert!(zeroed.is_bytes());
        assert_eq!(zeroed.length(), 4);

        let src = HostValue::array(vec![1.0.into(), 2.0.into(), 300.0.into()]);
        let copied = construct_builtin(Class::Uint8Array, &[src]).unwrap();
        assert_eq!(copied.index(2), HostValue::Number(44.0));
    }

    #[test]
    fn date_reports_utc_offset() {
        let date = construct_builtin(Class::Date, &[HostValue::Number(1000.0)]).unwrap();
        assert!(matches!(date.get("getTimezoneOffset"), HostValue::Function(_)));
        let ctor = HostValue::Function(Arc::new(HostFunction::constructor(Class::Date)));
        assert!(date.instance_of(&ctor));
    }

    #[test]
    fn error_constructor_stringifies_message() {
        let err = construct_builtin(Class::Error, &[HostValue::Number(7.0)]).unwrap();
        assert_eq!(err.to_js_string(), "Error: 7");
    }

    #[test]
    fn function_name_property() {
        let f = HostFunction::constructor(Class::Array);
        assert_eq!(f.get("name"), HostValue::string("Array"));
        f.set("name", HostValue::string("Other"));
        assert_eq!(f.get("name"), HostValue::string("Other"));
    }
}
