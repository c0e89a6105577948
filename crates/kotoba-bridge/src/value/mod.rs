//! Host values held on behalf of the guest.
//!
//! The guest can name any host value through a handle, so the set of value
//! kinds is closed: primitives, strings, symbols, and four container kinds
//! (plain objects, arrays, byte arrays and functions). Every container kind
//! implements [`DynamicObject`], which is the only way the dispatcher touches
//! properties. There is no open-ended reflection.

mod array;
mod facade;
mod function;
mod object;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use array::{HostArray, HostBytes};
pub use facade::DynamicObject;
pub use function::{FunctionKind, HostFunction, NativeFn};
pub use object::HostObject;

use crate::context::GuestContext;

/// Built-in class tags used for `instanceof` checks and construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// `Object`; every container is an instance of it.
    Object,
    /// `Array`.
    Array,
    /// `Uint8Array`.
    Uint8Array,
    /// `Date`.
    Date,
    /// `Error`.
    Error,
}

impl Class {
    /// The global name of the class constructor.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Array => "Array",
            Self::Uint8Array => "Uint8Array",
            Self::Date => "Date",
            Self::Error => "Error",
        }
    }
}

/// A unique symbol value.
#[derive(Debug)]
pub struct Symbol {
    description: Option<String>,
}

impl Symbol {
    /// Create a new symbol with an optional description.
    #[must_use]
    pub fn new(description: Option<String>) -> Self {
        Self { description }
    }

    /// The description given at creation.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// A value living on the host side of the bridge.
///
/// Reference kinds are shared through `Arc`; cloning a `HostValue` clones
/// the reference, not the contents.
#[derive(Clone)]
pub enum HostValue {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// An IEEE-754 double.
    Number(f64),
    /// An immutable string.
    String(Arc<str>),
    /// A unique symbol.
    Symbol(Arc<Symbol>),
    /// A plain object (including the global context, dates and errors).
    Object(Arc<HostObject>),
    /// An array of values.
    Array(Arc<HostArray>),
    /// A `Uint8Array`-like byte buffer.
    Bytes(Arc<HostBytes>),
    /// A callable.
    Function(Arc<HostFunction>),
}

/// Key under which reference-like values are deduplicated in the value table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum IdentityKey {
    Str(Arc<str>),
    Ref(usize),
}

fn address<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value).cast::<()>() as usize
}

impl HostValue {
    /// Wrap a string.
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }

    /// A new empty plain object.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(Arc::new(HostObject::new(Class::Object)))
    }

    /// A new array holding `items`.
    #[must_use]
    pub fn array(items: Vec<HostValue>) -> Self {
        Self::Array(Arc::new(HostArray::new(items)))
    }

    /// A new byte array holding `bytes`.
    #[must_use]
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(HostBytes::new(bytes)))
    }

    /// A new native function.
    #[must_use]
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn GuestContext, &HostValue, &[HostValue]) -> Result<HostValue, HostValue>
            + Send
            + Sync
            + 'static,
    {
        Self::Function(Arc::new(HostFunction::native(name, f)))
    }

    /// A new `Error` object carrying `message`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let err = HostObject::new(Class::Error);
        err.set("name", Self::string("Error"));
        err.set("message", Self::string(message.into()));
        Self::Object(Arc::new(err))
    }

    /// A new `TypeError` object carrying `message`.
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        let err = Self::error(message);
        err.set("name", Self::string("TypeError"));
        err
    }

    /// An error object with an errno-style `code` property.
    #[must_use]
    pub fn errno(code: &str, message: impl Into<String>) -> Self {
        let err = Self::error(message);
        err.set("code", Self::string(code));
        err
    }

    /// The coarse `typeof` class used to tag encoded slots.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) | Self::Array(_) | Self::Bytes(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Function(_) => "function",
        }
    }

    pub(crate) fn identity(&self) -> Option<IdentityKey> {
        match self {
            Self::String(s) => Some(IdentityKey::Str(Arc::clone(s))),
            Self::Symbol(s) => Some(IdentityKey::Ref(address(s))),
            Self::Object(o) => Some(IdentityKey::Ref(address(o))),
            Self::Array(a) => Some(IdentityKey::Ref(address(a))),
            Self::Bytes(b) => Some(IdentityKey::Ref(address(b))),
            Self::Function(f) => Some(IdentityKey::Ref(address(f))),
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) => None,
        }
    }

    /// The container facade for this value, if it has one.
    #[must_use]
    pub fn facade(&self) -> Option<&dyn DynamicObject> {
        match self {
            Self::Object(o) => Some(o.as_ref()),
            Self::Array(a) => Some(a.as_ref()),
            Self::Bytes(b) => Some(b.as_ref()),
            Self::Function(f) => Some(f.as_ref()),
            Self::String(s) => Some(s),
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::Symbol(_) => {
                None
            },
        }
    }

    /// Read a named property. Missing properties and non-containers yield
    /// `undefined`.
    #[must_use]
    pub fn get(&self, key: &str) -> HostValue {
        self.facade()
            .map_or(Self::Undefined, |facade| facade.get(key))
    }

    /// Write a named property. Writes to primitives are ignored.
    pub fn set(&self, key: &str, value: HostValue) {
        if let Some(facade) = self.facade() {
            facade.set(key, value);
        }
    }

    /// Delete a named property. Deleting a missing property is a no-op.
    pub fn delete(&self, key: &str) {
        if let Some(facade) = self.facade() {
            facade.delete(key);
        }
    }

    /// Read an indexed element.
    #[must_use]
    pub fn index(&self, index: i64) -> HostValue {
        self.facade()
            .map_or(Self::Undefined, |facade| facade.index(index))
    }

    /// Write an indexed element.
    pub fn set_index(&self, index: i64, value: HostValue) {
        if let Some(facade) = self.facade() {
            facade.set_index(index, value);
        }
    }

    /// The `length` of a container, or 0 for values without one.
    #[must_use]
    pub fn length(&self) -> usize {
        self.facade()
            .and_then(|facade| facade.length())
            .unwrap_or(0)
    }

    /// Whether this value is an instance of the class a constructor builds.
    #[must_use]
    pub fn instance_of(&self, constructor: &HostValue) -> bool {
        let Self::Function(f) = constructor else {
            return false;
        };
        let FunctionKind::Constructor(class) = f.kind() else {
            return false;
        };
        let own = match self {
            Self::Object(o) => o.class(),
            Self::Array(_) => Class::Array,
            Self::Bytes(_) => Class::Uint8Array,
            Self::Function(_) => Class::Object,
            _ => return false,
        };
        *class == Class::Object || own == *class
    }

    /// Whether this value is a byte array.
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// The number, if this is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Convert to a string the way `String(value)` does.
    #[must_use]
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Symbol(s) => format!("Symbol({})", s.description().unwrap_or_default()),
            Self::Object(o) => match o.class() {
                Class::Error => {
                    let name = o.get("name");
                    let message = o.get("message");
                    let name = if name.is_nullish() {
                        "Error".to_owned()
                    } else {
                        name.to_js_string()
                    };
                    if message.is_nullish() {
                        name
                    } else {
                        format!("{name}: {}", message.to_js_string())
                    }
                },
                _ => "[object Object]".to_owned(),
            },
            Self::Array(a) => a
                .snapshot()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                .collect::<Vec<_>>()
                .join(","),
            Self::Bytes(b) => b
                .snapshot()
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Self::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
        }
    }
}

/// Format a number the way JavaScript prints it for common values.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbol(s) => write!(f, "Symbol({:?})", s.description()),
            Self::Object(o) => write!(f, "[object {}]", o.class().name()),
            Self::Array(a) => write!(f, "Array({})", a.len()),
            Self::Bytes(b) => write!(f, "Uint8Array({})", b.len()),
            Self::Function(func) => write!(f, "[function {}]", func.name()),
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_share_identity_by_content() {
        let a = HostValue::string("猫");
        let b = HostValue::string("猫");
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a, b);
    }

    #[test]
    fn objects_have_reference_identity() {
        let a = HostValue::object();
        let b = HostValue::object();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a.clone().identity());
        assert_ne!(a, b);
    }

    #[test]
    fn numbers_have_no_identity() {
        assert!(HostValue::Number(4.0).identity().is_none());
        assert!(HostValue::Undefined.identity().is_none());
    }

    #[test]
    fn js_string_conversion() {
        assert_eq!(HostValue::Number(42.0).to_js_string(), "42");
        assert_eq!(HostValue::Number(1.5).to_js_string(), "1.5");
        assert_eq!(HostValue::Number(-0.0).to_js_string(), "0");
        assert_eq!(HostValue::Bool(true).to_js_string(), "true");
        assert_eq!(HostValue::Undefined.to_js_string(), "undefined");
        assert_eq!(HostValue::object().to_js_string(), "[object Object]");
        assert_eq!(
            HostValue::array(vec![1.0.into(), HostValue::Null, "x".into()]).to_js_string(),
            "1,,x"
        );
        assert_eq!(HostValue::error("boom").to_js_string(), "Error: boom");
        assert_eq!(HostValue::type_error("bad").to_js_string(), "TypeError: bad");
    }

    #[test]
    fn errno_error_carries_code() {
        let err = HostValue::errno("ENOSYS", "not implemented");
        assert_eq!(err.get("code").as_str(), Some("ENOSYS"));
        assert_eq!(err.get("message").as_str(), Some("not implemented"));
    }

    #[test]
    fn primitives_ignore_writes() {
        let n = HostValue::Number(3.0);
        n.set("x", HostValue::Bool(true));
        assert_eq!(n.get("x"), HostValue::Undefined);
        assert_eq!(HostValue::Null.index(0), HostValue::Undefined);
    }
}
