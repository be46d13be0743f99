//! The dynamic value model carried by the standard codec.

use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

use num_bigint::BigInt;

use crate::error::CodecError;

/// A dynamically typed value, one variant per wire tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    BigInt(BigInt),
    Float64(f64),
    String(String),
    ByteArray(Vec<u8>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::BigInt(_) => "bigint",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::ByteArray(_) => "byte_array",
            Value::Int32Array(_) => "int32_array",
            Value::Int64Array(_) => "int64_array",
            Value::Float32Array(_) => "float32_array",
            Value::Float64Array(_) => "float64_array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer view over both `Int32` and `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(value) => Some(i64::from(*value)),
            Value::Int64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Take the string out of a `String` value.
    pub fn into_string(mut self) -> Option<String> {
        match &mut self {
            Value::String(text) => Some(std::mem::take(text)),
            _ => None,
        }
    }
}

// Nested lists and maps are unlinked onto a heap stack so that dropping a
// deeply nested value does not recurse once per level.
impl Drop for Value {
    fn drop(&mut self) {
        let mut pending = match self {
            Value::List(items) if !items.is_empty() => std::mem::take(items),
            Value::Map(map) if !map.is_empty() => {
                let mut pending = Vec::new();
                map.drain_into(&mut pending);
                pending
            }
            _ => return,
        };
        while let Some(mut value) = pending.pop() {
            match &mut value {
                Value::List(items) => pending.append(items),
                Value::Map(map) => map.drain_into(&mut pending),
                _ => {}
            }
        }
    }
}

/// Key/value pairs of a `Value::Map`.
///
/// Pairs keep insertion order for encoding, but equality ignores order: two
/// maps are equal when they hold the same set of pairs.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(Value, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Build a map from pairs in order; a repeated key keeps its first
    /// position and its last value.
    ///
    /// Runs in expected linear time, unlike repeated [`ValueMap::insert`].
    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Self {
        let mut index = KeyIndex::with_capacity(pairs.len());
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let hash = index.hash(&key);
            match index.find(&entries, &key, hash) {
                Some(slot) => entries[slot].1 = value,
                None => {
                    index.add(hash, entries.len());
                    entries.push((key, value));
                }
            }
        }
        Self { entries }
    }

    /// Insert a pair, returning the previous value for an equal key.
    ///
    /// The key lookup is a linear scan; use [`ValueMap::from_pairs`] or
    /// `collect` to build large maps.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Lookup by string key, the common case for argument maps.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&Value, &Value)> + ExactSizeIterator {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    fn drain_into(&mut self, out: &mut Vec<Value>) {
        out.reserve(self.entries.len() * 2);
        for (key, value) in self.entries.drain(..) {
            out.push(key);
            out.push(value);
        }
    }
}

/// Below this size a linear scan beats building an index.
const INDEXED_EQ_MIN_LEN: usize = 16;

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        if self.len() < INDEXED_EQ_MIN_LEN {
            return self
                .entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value));
        }
        let mut index = KeyIndex::with_capacity(other.len());
        for (slot, (key, _)) in other.entries.iter().enumerate() {
            let hash = index.hash(key);
            index.add(hash, slot);
        }
        self.entries.iter().all(|(key, value)| {
            index
                .find(&other.entries, key, index.hash(key))
                .is_some_and(|slot| other.entries[slot].1 == *value)
        })
    }
}

/// Hash buckets of entry positions, keyed by [`ShallowKey`].
struct KeyIndex {
    hasher: RandomState,
    buckets: HashMap<u64, Vec<usize>>,
}

impl KeyIndex {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            hasher: RandomState::new(),
            buckets: HashMap::with_capacity(capacity),
        }
    }

    fn hash(&self, key: &Value) -> u64 {
        self.hasher.hash_one(ShallowKey(key))
    }

    fn find(&self, entries: &[(Value, Value)], key: &Value, hash: u64) -> Option<usize> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&slot| entries[slot].0 == *key)
    }

    fn add(&mut self, hash: u64, slot: usize) {
        self.buckets.entry(hash).or_default().push(slot);
    }
}

/// Hashes a key without descending into lists or maps, which only
/// contribute their length. Equal values always hash equally.
struct ShallowKey<'a>(&'a Value);

impl Hash for ShallowKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self.0).hash(state);
        match self.0 {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::BigInt(v) => v.hash(state),
            // 0.0 and -0.0 compare equal.
            Value::Float64(v) => (if *v == 0.0 { 0 } else { v.to_bits() }).hash(state),
            Value::String(v) => v.hash(state),
            Value::ByteArray(v) => v.hash(state),
            Value::Int32Array(v) => v.hash(state),
            Value::Int64Array(v) => v.hash(state),
            Value::Float32Array(v) => v.len().hash(state),
            Value::Float64Array(v) => v.len().hash(state),
            Value::List(v) => v.len().hash(state),
            Value::Map(v) => v.len().hash(state),
        }
    }
}

impl IntoIterator for ValueMap {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ValueMap::from_pairs(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Float64(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::ByteArray(value) => write!(f, "<{} bytes>", value.len()),
            Value::Int32Array(value) => write!(f, "{value:?}"),
            Value::Int64Array(value) => write!(f, "{value:?}"),
            Value::Float32Array(value) => write!(f, "{value:?}"),
            Value::Float64Array(value) => write!(f, "{value:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

macro_rules! from_int32 {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int32(i32::from(value))
            }
        })*
    };
}

from_int32!(i8, i16, i32, u8, u16);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float64(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl TryFrom<u32> for Value {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match i32::try_from(value) {
            Ok(small) => Value::Int32(small),
            Err(_) => Value::Int64(i64::from(value)),
        })
    }
}

impl TryFrom<u64> for Value {
    type Error = CodecError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Value::Int64)
            .map_err(|_| CodecError::UnsupportedValue {
                type_name: "u64",
                value: value.to_string(),
            })
    }
}

impl TryFrom<usize> for Value {
    type Error = CodecError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Value::Int64)
            .map_err(|_| CodecError::UnsupportedValue {
                type_name: "usize",
                value: value.to_string(),
            })
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Value::BigInt(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::ByteArray(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::ByteArray(value.to_vec())
    }
}

impl From<Vec<i32>> for Value {
    fn from(value: Vec<i32>) -> Self {
        Value::Int32Array(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Value::Int64Array(value)
    }
}

impl From<Vec<f32>> for Value {
    fn from(value: Vec<f32>) -> Self {
        Value::Float32Array(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::Float64Array(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<K: Into<Value>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(value: HashMap<K, V>) -> Self {
        Value::Map(value.into_iter().collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(value: BTreeMap<K, V>) -> Self {
        Value::Map(value.into_iter().collect())
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::List(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_widen_to_int32() {
        assert_eq!(Value::from(7i8), Value::Int32(7));
        assert_eq!(Value::from(-3i16), Value::Int32(-3));
        assert_eq!(Value::from(200u8), Value::Int32(200));
        assert_eq!(Value::from(65535u16), Value::Int32(65535));
    }

    #[test]
    fn unsigned_conversions_widen_or_fail() {
        assert_eq!(Value::try_from(2u32).unwrap(), Value::Int32(2));
        assert_eq!(
            Value::try_from(u32::MAX).unwrap(),
            Value::Int64(i64::from(u32::MAX))
        );
        assert_eq!(Value::try_from(5u64).unwrap(), Value::Int64(5));

        let err = Value::try_from(u64::MAX).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedValue {
                type_name: "u64",
                ..
            }
        ));
    }

    #[test]
    fn floats_widen_to_float64() {
        assert_eq!(Value::from(2.5f32), Value::Float64(2.5));
    }

    #[test]
    fn map_equality_ignores_order() {
        let left: ValueMap = [("a", 1), ("b", 2)].into_iter().collect();
        let right: ValueMap = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(left, right);

        let different: ValueMap = [("a", 1), ("b", 3)].into_iter().collect();
        assert_ne!(left, different);
    }

    #[test]
    fn map_insert_replaces_equal_key() {
        let mut map = ValueMap::new();
        assert_eq!(map.insert("key", 1), None);
        assert_eq!(map.insert("key", "two"), Some(Value::Int32(1)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_str("key"), Some(&Value::from("two")));
    }

    #[test]
    fn from_pairs_keeps_first_position_and_last_value() {
        let map = ValueMap::from_pairs(vec![
            (Value::from("a"), Value::from(1)),
            (Value::from("b"), Value::from(2)),
            (Value::from("a"), Value::from(3)),
        ]);
        let keys: Vec<_> = map.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(map.get_str("a"), Some(&Value::Int32(3)));
    }

    #[test]
    fn from_pairs_matches_signed_zero_keys() {
        let map = ValueMap::from_pairs(vec![
            (Value::Float64(0.0), Value::from("pos")),
            (Value::Float64(-0.0), Value::from("neg")),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Value::Float64(0.0)), Some(&Value::from("neg")));
    }

    #[test]
    fn large_map_equality_ignores_order() {
        let forward: ValueMap = (0..1_000).map(|i| (i, i * 2)).collect();
        let backward: ValueMap = (0..1_000).rev().map(|i| (i, i * 2)).collect();
        assert_eq!(forward, backward);

        let changed: ValueMap = (0..1_000)
            .map(|i| (i, if i == 500 { -1 } else { i * 2 }))
            .collect();
        assert_ne!(forward, changed);
    }

    #[test]
    fn into_string_takes_only_strings() {
        assert_eq!(Value::from("name").into_string(), Some("name".to_string()));
        assert_eq!(Value::Int32(1).into_string(), None);
    }

    #[test]
    fn dropping_deep_nesting_does_not_recurse() {
        let mut value = Value::Null;
        for depth in 0..300_000 {
            value = if depth % 2 == 0 {
                Value::List(vec![value])
            } else {
                Value::Map(ValueMap::from_pairs(vec![(Value::Null, value)]))
            };
        }
        drop(value);
    }

    #[test]
    fn option_none_is_null() {
        assert_eq!(Value::from(Option::<i32>::None), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Int32(4).as_i64(), Some(4));
        assert_eq!(Value::Int64(-9).as_i64(), Some(-9));
        assert_eq!(Value::from("s").as_str(), Some("s"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("s").as_i64(), None);
        assert_eq!(Value::List(vec![]).type_name(), "list");
    }

    #[test]
    fn display_renders_nested_values() {
        let value = Value::List(vec![Value::from(1), Value::from("a"), Value::Null]);
        assert_eq!(value.to_string(), "[1, \"a\", null]");
    }
}
