//! Logical request parameters.
//!
//! [`Params`] is a JSON object shared behind an [`Arc`]. Cloning a `Params`
//! never copies the map, and every mutating method goes through
//! [`Arc::make_mut`], so an edit made on a clone is never visible through the
//! original. Query keys hold `Params` by value, which makes this property what
//! keeps a cached key stable while the request path strips path parameters out
//! of the same object.
//!
//! ```
//! use fetchbox_core::params;
//!
//! let original = params! { "id": 5, "name": "x" };
//! let mut copy = original.clone();
//! assert!(copy.ptr_eq(&original));
//!
//! copy.remove("id");
//! assert!(!copy.ptr_eq(&original));
//! assert_eq!(original.len(), 2);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A shared, copy-on-write JSON object of request parameters.
#[derive(Clone, Default, PartialEq)]
pub struct Params(Arc<Map<String, Value>>);

impl Params {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts a value, copying the underlying map first if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    /// Removes a value, copying the underlying map first if it is shared.
    ///
    /// Remaining keys keep their order. Nothing is copied when `key` is absent.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).shift_remove(key)
    }

    /// Number of parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over parameters in insertion order.
    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.0.iter()
    }

    /// Returns the underlying JSON object.
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns `true` if both values share the same allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Params) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Converts into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Returns `true` if every entry of `subset` is contained in `self`.
    ///
    /// Nested objects are compared the same way, other values by equality.
    pub fn contains(&self, subset: &Params) -> bool {
        object_contains(&self.0, &subset.0)
    }
}

fn object_contains(whole: &Map<String, Value>, part: &Map<String, Value>) -> bool {
    part.iter().all(|(key, expected)| match (whole.get(key), expected) {
        (Some(Value::Object(actual)), Value::Object(expected)) => object_contains(actual, expected),
        (Some(actual), expected) => actual == expected,
        (None, _) => false,
    })
}

impl Eq for Params {}

impl Hash for Params {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_object(&self.0, state);
    }
}

/// Hashes an object independently of its key order, matching `PartialEq` on
/// `serde_json::Map`.
fn hash_object<H: Hasher>(map: &Map<String, Value>, state: &mut H) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries.len().hash(state);
    for (key, value) in entries {
        key.hash(state);
        hash_value(value, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            hash_object(map, state);
        }
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&*self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }
}

impl TryFrom<Value> for Params {
    type Error = Value;

    /// Accepts JSON objects and hands any other value back unchanged.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(other),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<Map<_, _>>()
            .into()
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Params::from)
    }
}
