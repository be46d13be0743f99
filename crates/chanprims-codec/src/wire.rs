use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};

/// Type tags of the standard encoding.
pub mod tag {
    pub const NULL: u8 = 0;
    pub const TRUE: u8 = 1;
    pub const FALSE: u8 = 2;
    pub const INT32: u8 = 3;
    pub const INT64: u8 = 4;
    pub const BIGINT: u8 = 5;
    pub const FLOAT64: u8 = 6;
    pub const STRING: u8 = 7;
    pub const BYTE_ARRAY: u8 = 8;
    pub const INT32_ARRAY: u8 = 9;
    pub const INT64_ARRAY: u8 = 10;
    pub const FLOAT64_ARRAY: u8 = 11;
    pub const LIST: u8 = 12;
    pub const MAP: u8 = 13;
    pub const FLOAT32_ARRAY: u8 = 14;
}

/// Sizes below this value are written as a single byte.
pub const SIZE_INLINE_MAX: usize = 253;

/// Marker for a 2-byte unsigned size.
pub const SIZE_MARKER_U16: u8 = 254;

/// Marker for a 4-byte signed size.
pub const SIZE_MARKER_I32: u8 = 255;

/// Write a variable-length size.
///
/// Wire format:
/// ```text
/// size < 254        [size]
/// size <= 0xFFFF    [254][u16 LE]
/// otherwise         [255][i32 LE]
/// ```
pub fn write_size(dst: &mut BytesMut, size: usize) -> Result<()> {
    if size <= SIZE_INLINE_MAX {
        dst.put_u8(size as u8);
    } else if size <= u16::MAX as usize {
        dst.put_u8(SIZE_MARKER_U16);
        dst.put_u16_le(size as u16);
    } else {
        let size = i32::try_from(size).map_err(|_| CodecError::SizeOutOfRange(size))?;
        dst.put_u8(SIZE_MARKER_I32);
        dst.put_i32_le(size);
    }
    Ok(())
}

/// Pad `dst` with zero bytes until its length is a multiple of `alignment`.
///
/// Offsets are measured from the start of the buffer, so the same value can
/// be padded differently depending on what precedes it.
pub fn write_alignment(dst: &mut BytesMut, alignment: usize) {
    let rem = dst.len() % alignment;
    if rem != 0 {
        dst.put_bytes(0, alignment - rem);
    }
}

/// Cursor over an encoded buffer that tracks the absolute read offset.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.has_remaining() {
            return Err(CodecError::corrupted(self.pos, "trailing bytes"));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| CodecError::corrupted(self.pos, "unexpected end of buffer"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::corrupted(self.pos, "unexpected end of buffer"));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_f32_le(&mut self) -> Result<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    pub fn read_f64_le(&mut self) -> Result<f64> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Read a variable-length size (see [`write_size`]).
    pub fn read_size(&mut self) -> Result<usize> {
        let start = self.pos;
        match self.read_u8()? {
            SIZE_MARKER_U16 => Ok(self.read_u16_le()? as usize),
            SIZE_MARKER_I32 => {
                let size = self.read_i32_le()?;
                usize::try_from(size).map_err(|_| CodecError::corrupted(start, "negative size"))
            }
            inline => Ok(inline as usize),
        }
    }

    /// Read a size that counts `unit`-byte items, rejecting counts the rest of
    /// the buffer cannot hold.
    pub fn read_count(&mut self, unit: usize) -> Result<usize> {
        let start = self.pos;
        let count = self.read_size()?;
        match count.checked_mul(unit) {
            Some(needed) if needed <= self.remaining() => Ok(count),
            _ => Err(CodecError::corrupted(start, "size exceeds remaining bytes")),
        }
    }

    /// Skip padding so the position is a multiple of `alignment`.
    pub fn read_alignment(&mut self, alignment: usize) -> Result<()> {
        let rem = self.pos % alignment;
        if rem != 0 {
            self.read_bytes(alignment - rem)?;
        }
        Ok(())
    }
}
