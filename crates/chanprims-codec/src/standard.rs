use bytes::{BufMut, Bytes, BytesMut};
use num_bigint::BigInt;
use tracing::trace;

use crate::basic::MessageCodec;
use crate::error::{CodecError, Result};
use crate::value::{Value, ValueMap};
use crate::wire::{tag, write_alignment, write_size, WireReader};

/// The standard self-describing binary codec for [`Value`]s.
///
/// Every value is a one-byte type tag followed by its payload. Lengths and
/// counts use the variable-length size of [`write_size`], and numeric blocks
/// are aligned relative to the start of the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMessageCodec;

impl StandardMessageCodec {
    /// Append the encoding of `value` to `dst`.
    ///
    /// On failure `dst` is restored to its original length.
    pub fn write_value(&self, dst: &mut BytesMut, value: &Value) -> Result<()> {
        let start = dst.len();
        write_value(dst, value).inspect_err(|_| dst.truncate(start))
    }

    /// Read one value at the reader's position.
    pub fn read_value(&self, reader: &mut WireReader<'_>) -> Result<Value> {
        read_value(reader)
    }

    /// Encode a single value to a fresh buffer.
    pub fn encode_value(&self, value: &Value) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        write_value(&mut dst, value)?;
        Ok(dst.freeze())
    }

    /// Decode a buffer holding exactly one value.
    pub fn decode_value(&self, bytes: &[u8]) -> Result<Value> {
        let mut reader = WireReader::new(bytes);
        let value = read_value(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

impl MessageCodec for StandardMessageCodec {
    type Message = Value;

    fn encode_message(&self, message: Option<&Value>) -> Result<Option<Bytes>> {
        message.map(|value| self.encode_value(value)).transpose()
    }

    fn decode_message(&self, message: Option<&[u8]>) -> Result<Option<Value>> {
        message.map(|bytes| self.decode_value(bytes)).transpose()
    }
}

fn write_value(dst: &mut BytesMut, value: &Value) -> Result<()> {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::Null => dst.put_u8(tag::NULL),
            Value::Bool(true) => dst.put_u8(tag::TRUE),
            Value::Bool(false) => dst.put_u8(tag::FALSE),
            Value::Int32(v) => {
                dst.put_u8(tag::INT32);
                dst.put_i32_le(*v);
            }
            Value::Int64(v) => {
                dst.put_u8(tag::INT64);
                dst.put_i64_le(*v);
            }
            Value::BigInt(v) => {
                dst.put_u8(tag::BIGINT);
                write_utf8(dst, &bigint_to_hex(v))?;
            }
            Value::Float64(v) => {
                dst.put_u8(tag::FLOAT64);
                write_alignment(dst, 8);
                dst.put_f64_le(*v);
            }
            Value::String(v) => {
                dst.put_u8(tag::STRING);
                write_utf8(dst, v)?;
            }
            Value::ByteArray(v) => {
                dst.put_u8(tag::BYTE_ARRAY);
                write_size(dst, v.len())?;
                dst.put_slice(v);
            }
            Value::Int32Array(v) => {
                dst.put_u8(tag::INT32_ARRAY);
                write_size(dst, v.len())?;
                write_alignment(dst, 4);
                v.iter().for_each(|x| dst.put_i32_le(*x));
            }
            Value::Int64Array(v) => {
                dst.put_u8(tag::INT64_ARRAY);
                write_size(dst, v.len())?;
                write_alignment(dst, 8);
                v.iter().for_each(|x| dst.put_i64_le(*x));
            }
            Value::Float32Array(v) => {
                dst.put_u8(tag::FLOAT32_ARRAY);
                write_size(dst, v.len())?;
                write_alignment(dst, 4);
                v.iter().for_each(|x| dst.put_f32_le(*x));
            }
            Value::Float64Array(v) => {
                dst.put_u8(tag::FLOAT64_ARRAY);
                write_size(dst, v.len())?;
                write_alignment(dst, 8);
                v.iter().for_each(|x| dst.put_f64_le(*x));
            }
            Value::List(items) => {
                dst.put_u8(tag::LIST);
                write_size(dst, items.len())?;
                stack.extend(items.iter().rev());
            }
            Value::Map(map) => {
                dst.put_u8(tag::MAP);
                write_size(dst, map.len())?;
                for (key, value) in map.iter().rev() {
                    stack.push(value);
                    stack.push(key);
                }
            }
        }
    }
    Ok(())
}

fn write_utf8(dst: &mut BytesMut, text: &str) -> Result<()> {
    write_size(dst, text.len())?;
    dst.put_slice(text.as_bytes());
    Ok(())
}

/// Two's-complement hex with the fewest nibbles that keep the sign.
fn bigint_to_hex(value: &BigInt) -> String {
    let hex = hex::encode(value.to_signed_bytes_be());
    match hex.as_bytes() {
        [b'0', next, ..] if *next < b'8' => hex[1..].to_string(),
        [b'f', next, ..] if *next >= b'8' => hex[1..].to_string(),
        _ => hex,
    }
}

fn bigint_from_hex(text: &str) -> Option<BigInt> {
    let top = text.chars().next()?.to_digit(16)?;
    let bytes = if text.len() % 2 == 1 {
        let pad = if top >= 8 { 'f' } else { '0' };
        hex::decode(format!("{pad}{text}")).ok()?
    } else {
        hex::decode(text).ok()?
    };
    Some(BigInt::from_signed_bytes_be(&bytes))
}

/// Result of reading one tag: a finished value or the header of a container.
enum Step {
    Value(Value),
    List(usize),
    Map(usize),
}

/// A container whose elements are still being read.
enum Partial {
    List {
        items: Vec<Value>,
        expected: usize,
    },
    Map {
        pairs: Vec<(Value, Value)>,
        key: Option<Value>,
        expected: usize,
    },
}

impl Partial {
    /// Add an element, returning the container once it is complete.
    fn push(&mut self, value: Value) -> Option<Value> {
        match self {
            Partial::List { items, expected } => {
                items.push(value);
                (items.len() == *expected).then(|| Value::List(std::mem::take(items)))
            }
            Partial::Map {
                pairs,
                key,
                expected,
            } => {
                match key.take() {
                    None => {
                        *key = Some(value);
                        return None;
                    }
                    Some(k) => pairs.push((k, value)),
                }
                // Repeated keys collapse here, last value wins.
                (pairs.len() == *expected)
                    .then(|| Value::Map(ValueMap::from_pairs(std::mem::take(pairs))))
            }
        }
    }
}

fn read_value(reader: &mut WireReader<'_>) -> Result<Value> {
    let mut stack: Vec<Partial> = Vec::new();
    loop {
        let mut value = match read_step(reader)? {
            Step::Value(value) => value,
            Step::List(0) => Value::List(Vec::new()),
            Step::Map(0) => Value::Map(ValueMap::new()),
            Step::List(expected) => {
                stack.push(Partial::List {
                    items: Vec::with_capacity(expected),
                    expected,
                });
                continue;
            }
            Step::Map(expected) => {
                stack.push(Partial::Map {
                    pairs: Vec::with_capacity(expected),
                    key: None,
                    expected,
                });
                continue;
            }
        };

        loop {
            let Some(top) = stack.last_mut() else {
                return Ok(value);
            };
            match top.push(value) {
                Some(done) => {
                    stack.pop();
                    value = done;
                }
                None => break,
            }
        }
    }
}

fn read_step(reader: &mut WireReader<'_>) -> Result<Step> {
    let offset = reader.position();
    let value = match reader.read_u8()? {
        tag::NULL => Value::Null,
        tag::TRUE => Value::Bool(true),
        tag::FALSE => Value::Bool(false),
        tag::INT32 => Value::Int32(reader.read_i32_le()?),
        tag::INT64 => Value::Int64(reader.read_i64_le()?),
        tag::BIGINT => {
            let start = reader.position();
            let text = read_utf8(reader)?;
            let value = bigint_from_hex(text)
                .ok_or_else(|| CodecError::corrupted(start, "invalid big integer"))?;
            Value::BigInt(value)
        }
        tag::FLOAT64 => {
            reader.read_alignment(8)?;
            Value::Float64(reader.read_f64_le()?)
        }
        tag::STRING => Value::String(read_utf8(reader)?.to_owned()),
        tag::BYTE_ARRAY => {
            let len = reader.read_count(1)?;
            Value::ByteArray(reader.read_bytes(len)?.to_vec())
        }
        tag::INT32_ARRAY => {
            let count = reader.read_count(4)?;
            reader.read_alignment(4)?;
            Value::Int32Array(
                (0..count)
                    .map(|_| reader.read_i32_le())
                    .collect::<Result<_>>()?,
            )
        }
        tag::INT64_ARRAY => {
            let count = reader.read_count(8)?;
            reader.read_alignment(8)?;
            Value::Int64Array(
                (0..count)
                    .map(|_| reader.read_i64_le())
                    .collect::<Result<_>>()?,
            )
        }
        tag::FLOAT32_ARRAY => {
            let count = reader.read_count(4)?;
            reader.read_alignment(4)?;
            Value::Float32Array(
                (0..count)
                    .map(|_| reader.read_f32_le())
                    .collect::<Result<_>>()?,
            )
        }
        tag::FLOAT64_ARRAY => {
            let count = reader.read_count(8)?;
            reader.read_alignment(8)?;
            Value::Float64Array(
                (0..count)
                    .map(|_| reader.read_f64_le())
                    .collect::<Result<_>>()?,
            )
        }
        // Each element takes at least one byte, each map entry at least two.
        tag::LIST => return Ok(Step::List(reader.read_count(1)?)),
        tag::MAP => return Ok(Step::Map(reader.read_count(2)?)),
        unknown => {
            trace!(tag = unknown, offset, "unknown type tag");
            return Err(CodecError::corrupted(offset, "unknown type tag"));
        }
    };
    Ok(Step::Value(value))
}

fn read_utf8<'a>(reader: &mut WireReader<'a>) -> Result<&'a str> {
    let len = reader.read_count(1)?;
    let start = reader.position();
    let bytes = reader.read_bytes(len)?;
    std::str::from_utf8(bytes).map_err(|_| CodecError::corrupted(start, "invalid UTF-8"))
}
