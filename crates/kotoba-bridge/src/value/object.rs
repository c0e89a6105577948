use std::collections::HashMap;
use std::sync::Mutex;

use super::{Class, DynamicObject, HostValue, lock};

/// A plain keyed object.
///
/// The class tag only matters for `instanceof` and string conversion; the
/// property bag is the same for every class.
#[derive(Debug)]
pub struct HostObject {
    class: Class,
    props: Mutex<HashMap<String, HostValue>>,
}

impl HostObject {
    /// An empty object of the given class.
    #[must_use]
    pub fn new(class: Class) -> Self {
        Self {
            class,
            props: Mutex::new(HashMap::new()),
        }
    }

    /// An object of the given class pre-populated with `props`.
    #[must_use]
    pub fn with_props<K: Into<String>>(
        class: Class,
        props: impl IntoIterator<Item = (K, HostValue)>,
    ) -> Self {
        Self {
            class,
            props: Mutex::new(props.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// The class this object was built as.
    #[must_use]
    pub fn class(&self) -> Class {
        self.class
    }

    /// Whether the object holds `key` as an own property.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.props).contains_key(key)
    }
}

impl DynamicObject for HostObject {
    fn get(&self, key: &str) -> HostValue {
        lock(&self.props)
            .get(key)
            .cloned()
            .unwrap_or(HostValue::Undefined)
    }

    fn set(&self, key: &str, value: HostValue) {
        lock(&self.props).insert(key.to_owned(), value);
    }

    fn delete(&self, key: &str) {
        lock(&self.props).remove(key);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn length(&self) -> Option<usize> {
        self.get("length").as_f64().and_then(|n| {
            (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
        })
    }
}
