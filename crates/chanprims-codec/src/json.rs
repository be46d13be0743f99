//! Conversions between [`Value`] and JSON, enabled by the `json` feature.
//!
//! JSON has no integer widths, byte arrays or non-string map keys, so the
//! mapping is lossy in the `Value` to JSON direction: typed arrays become JSON
//! arrays, big integers become decimal strings, and map keys must be strings
//! or integers.

use num_bigint::BigInt;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::value::{Value, ValueMap};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::BigInt(v) => serializer.serialize_str(&v.to_string()),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::ByteArray(v) => serializer.collect_seq(v),
            Value::Int32Array(v) => serializer.collect_seq(v),
            Value::Int64Array(v) => serializer.collect_seq(v),
            Value::Float32Array(v) => serializer.collect_seq(v),
            Value::Float64Array(v) => serializer.collect_seq(v),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(number) => {
                if let Some(v) = number.as_i64() {
                    match i32::try_from(v) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::Int64(v),
                    }
                } else if let Some(v) = number.as_u64() {
                    Value::BigInt(BigInt::from(v))
                } else {
                    Value::Float64(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(v) => Value::String(v),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (Value::String(key), Value::from(value)))
                    .collect::<ValueMap>(),
            ),
        }
    }
}

/// Convert a value to a JSON document.
pub fn to_json(value: &Value) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_pick_the_narrowest_variant() {
        assert_eq!(Value::from(json!(5)), Value::Int32(5));
        assert_eq!(Value::from(json!(5_000_000_000i64)), Value::Int64(5_000_000_000));
        assert_eq!(Value::from(json!(u64::MAX)), Value::BigInt(BigInt::from(u64::MAX)));
        assert_eq!(Value::from(json!(2.5)), Value::Float64(2.5));
    }

    #[test]
    fn json_objects_become_string_keyed_maps() {
        let value = Value::from(json!({"a": [1, null, "x"], "b": true}));
        let Value::Map(map) = &value else {
            panic!("expected map");
        };
        assert_eq!(
            map.get_str("a"),
            Some(&Value::List(vec![Value::Int32(1), Value::Null, Value::from("x")]))
        );
        assert_eq!(map.get_str("b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn values_serialize_to_json() {
        let map: ValueMap = [
            ("bytes", Value::ByteArray(vec![1, 2])),
            ("big", Value::BigInt(BigInt::from(-7))),
            ("list", Value::List(vec![Value::Float64(0.5), Value::Null])),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            to_json(&Value::Map(map)).unwrap(),
            json!({"bytes": [1, 2], "big": "-7", "list": [0.5, null]})
        );
    }

    #[test]
    fn integer_map_keys_serialize_as_strings() {
        let map: ValueMap = [(1, "one")].into_iter().collect();
        assert_eq!(to_json(&Value::Map(map)).unwrap(), json!({"1": "one"}));
    }
}
